use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

static CAUGHT: OnceLock<AtomicBool> = OnceLock::new();

fn caught_flag() -> &'static AtomicBool {
    CAUGHT.get_or_init(|| AtomicBool::new(false))
}

/// True once any of the installed signals has fired. Exposed mainly for
/// tests; the handlers themselves exit the process directly.
pub fn was_caught() -> bool {
    caught_flag().load(Ordering::SeqCst)
}

fn report_and_exit(name: &str) {
    caught_flag().store(true, Ordering::SeqCst);
    println!("Captured sig {name}");
    std::process::exit(3);
}

extern "C" fn handle_raw(signum: libc::c_int) {
    let name = match signum {
        libc::SIGHUP => "SIGHUP",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGABRT => "SIGABRT",
        libc::SIGTERM => "SIGTERM",
        _ => "UNKNOWN",
    };
    report_and_exit(name);
}

/// Installs handlers for SIGHUP, SIGINT, SIGQUIT, SIGABRT, SIGTERM.
///
/// SIGINT goes through `ctrlc` (matching the original); the rest are
/// installed with raw `libc::signal` since they have no portable
/// high-level wrapper. SIGKILL and SIGSEGV are not installed: neither is
/// trappable from userspace on the platforms this targets.
pub fn install() {
    ctrlc::set_handler(|| report_and_exit("SIGINT")).expect("failed to install SIGINT handler");

    for signum in [libc::SIGHUP, libc::SIGQUIT, libc::SIGABRT, libc::SIGTERM] {
        unsafe {
            libc::signal(signum, handle_raw as usize as libc::sighandler_t);
        }
    }
}
