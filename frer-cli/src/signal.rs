//! SIGINT/SIGTERM handling
//!
//! The first signal only raises [`SHUTDOWN`] so the running command can
//! stop and still print its report. A second signal exits immediately.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Set once an interrupt has been received
pub static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn signal_handler(_sig: libc::c_int) {
    if SHUTDOWN.swap(true, Ordering::Relaxed) {
        // SAFETY: _exit is async-signal-safe.
        unsafe { libc::_exit(130) };
    }
}

/// Install the handler for SIGINT and SIGTERM.
///
/// `SA_RESTART` is left clear so that blocking `poll`/`read` calls return
/// `EINTR` and the capture loop notices the flag promptly.
///
/// A failed installation is logged; the command then runs without
/// graceful interrupt handling.
pub fn install() {
    // SAFETY: the handler only touches an atomic and calls _exit, both
    // async-signal-safe. The sigaction struct is fully initialized.
    let action = unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = signal_handler as *const () as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        action
    };

    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        // SAFETY: action is a valid sigaction; the old action is not requested.
        let rc = unsafe { libc::sigaction(signal, &action, std::ptr::null_mut()) };
        if rc < 0 {
            warn!("Failed to install {} handler: {}", name, io::Error::last_os_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_leaves_flag_clear() {
        install();
        install();
        assert!(!SHUTDOWN.load(Ordering::Relaxed));
    }
}
