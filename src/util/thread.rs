//! Bounded joins for background threads.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

/// How a bounded join ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The thread exited normally.
    Joined,
    /// The thread exited by panicking.
    Panicked,
    /// The thread was still running when the timeout elapsed and was detached.
    Detached,
}

/// Join `handle`, giving up after `timeout`.
///
/// The join runs on a helper thread so the caller can stop waiting; a thread
/// that overstays the timeout keeps running detached.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> JoinOutcome {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    let (tx, rx) = crossbeam_channel::bounded(1);
    let spawned = thread::Builder::new()
        .name(format!("{name}-join"))
        .spawn(move || {
            let _ = tx.send(handle.join().is_ok());
        });
    if let Err(e) = spawned {
        warn!(thread = %name, error = %e, "could not spawn join helper - detaching");
        return JoinOutcome::Detached;
    }

    match rx.recv_timeout(timeout) {
        Ok(true) => {
            debug!(thread = %name, "thread joined");
            JoinOutcome::Joined
        }
        Ok(false) => {
            warn!(thread = %name, "thread panicked");
            JoinOutcome::Panicked
        }
        Err(_) => {
            warn!(thread = %name, ?timeout, "thread did not exit within timeout - detaching");
            JoinOutcome::Detached
        }
    }
}
