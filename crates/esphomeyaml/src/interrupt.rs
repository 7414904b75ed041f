//! Process-wide Ctrl-C flag.
//!
//! Long-running commands (log tails, OTA sessions, the external build)
//! poll [`interrupted`] between short blocking calls and shut their
//! sockets and children down themselves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use tracing::debug;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

/// Route Ctrl-C to the flag instead of terminating the process.
pub fn install() {
    INSTALL.call_once(|| {
        if let Err(err) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
            debug!("Could not install Ctrl-C handler: {err}");
        }
    });
}

/// Whether Ctrl-C was pressed since the last [`reset`].
#[must_use]
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
