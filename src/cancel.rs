//! Cancellation handle and process-tree termination
//!
//! Cancellation is a single-fire signal: the first call wins, every later call
//! is a no-op. Termination covers the whole process tree rooted at the invoked
//! process, since build tools commonly fan out worker processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Notify;

/// Clonable handle used to request cancellation of one operation.
#[derive(Clone, Default)]
pub struct CancelHandle {
    fired: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; only the first call has any effect.
    pub fn cancel(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!("cancellation requested");
            // Wakes every clone parked in `canceled`, not just one.
            self.notify.notify_waiters();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested. Safe to await from a
    /// `select!` loop: the fired flag survives dropped wakeups.
    pub async fn canceled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register with the notifier before checking the flag; a cancel
        // landing in between would otherwise be missed, since
        // `notify_waiters` stores no permit.
        notified.as_mut().enable();
        if self.is_canceled() {
            return;
        }
        notified.await;
    }
}

/// Terminate the process tree rooted at `child`.
///
/// Sends SIGTERM to the process group, allows a short grace period, then
/// SIGKILLs the group if the immediate child is still alive. The direct kill
/// at the end reaps the child and covers the non-Unix path.
pub async fn terminate_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(-(pid as i32));
        let _ = signal::kill(pgid, Signal::SIGTERM);

        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Ok(None) = child.try_wait() {
            let _ = signal::kill(pgid, Signal::SIGKILL);
        }
    }

    let _ = child.kill().await;
    let _ = child.wait().await;
}
