use std::sync::atomic::{AtomicI32, Ordering};

/// Set from the signal handler; non-zero means "stop". Holds the signal
/// number so the process can exit `128 + signal`.
static SHUTDOWN: AtomicI32 = AtomicI32::new(0);

extern "C" fn handle_shutdown(signal: libc::c_int) {
    SHUTDOWN.store(signal, Ordering::SeqCst);
}

/// Install process-wide signal dispositions: SIGINT/SIGTERM request a
/// cooperative shutdown, SIGPIPE is ignored so a dead peer surfaces as an
/// EPIPE send error instead of killing the process.
pub fn install() {
    let handler = handle_shutdown as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[must_use]
pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst) != 0
}

/// The signal that triggered shutdown, or 0.
#[must_use]
pub fn received_signal() -> i32 {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Request a shutdown from code rather than a signal.
pub fn request_shutdown() {
    SHUTDOWN.store(libc::SIGTERM, Ordering::SeqCst);
}

/// Re-arm the flag. Only meaningful for tests that run several servers in
/// one process.
pub fn reset() {
    SHUTDOWN.store(0, Ordering::SeqCst);
}
