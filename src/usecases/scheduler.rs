//! Cycle Scheduler - Single Outstanding Timer
//!
//! Owns at most one spawned loop task. The loop waits until the next
//! due instant, runs one tick to completion, then arms the next due
//! instant as `tick start + interval`. A tick that overruns the
//! interval is followed immediately by the next one; ticks never
//! overlap. Disarming signals the loop and detaches it: a tick already
//! in progress finishes, but no further tick starts.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Recurring timer with one cancelable handle.
#[derive(Default)]
pub struct Scheduler {
  stop_tx: Option<watch::Sender<bool>>,
  handle: Option<JoinHandle<()>>,
}

impl Scheduler {
  /// Create an unarmed scheduler.
  pub fn new() -> Self {
    Self::default()
  }

  /// Whether a loop task is currently armed.
  pub fn is_armed(&self) -> bool {
    self.handle.as_ref().is_some_and(|h| !h.is_finished())
  }

  /// Arm the loop. The first tick runs at `first_due`.
  ///
  /// `tick` returns `false` to end the loop from the inside. Re-arming
  /// replaces any previous loop.
  pub fn arm<F, Fut>(&mut self, interval: Duration, first_due: Instant, mut tick: F)
  where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
  {
    self.disarm();

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
      let mut next_due = first_due;
      loop {
        tokio::select! {
          biased;
          changed = stop_rx.changed() => {
            if changed.is_err() || *stop_rx.borrow() {
              break;
            }
          }
          () = sleep_until(next_due) => {}
        }
        if *stop_rx.borrow() {
          break;
        }

        let started = Instant::now();
        if !tick().await {
          break;
        }
        next_due = started + interval;
      }
      debug!("Scheduler loop exited");
    });

    self.stop_tx = Some(stop_tx);
    self.handle = Some(handle);
  }

  /// Signal the loop to stop and detach it. Idempotent.
  ///
  /// Never awaits the loop, so it is safe to call from inside a tick.
  pub fn disarm(&mut self) {
    if let Some(stop_tx) = self.stop_tx.take() {
      let _ = stop_tx.send(true);
    }
    self.handle.take();
  }
}

impl Drop for Scheduler {
  fn drop(&mut self) {
    self.disarm();
  }
}
