//! Best-effort debugger/tracer detection.
//!
//! This is a speed bump, not a security boundary: a determined attacker
//! can hide a tracer or patch the check out. License correctness never
//! depends on it.

/// Exit code used by the validator binary when a tracer is attached.
pub const TRACER_EXIT_CODE: u8 = 105;

/// `true` when the current process appears to be traced.
///
/// Only Linux is checked (via `TracerPid` in `/proc/self/status`); other
/// platforms always report `false`.
pub fn tracer_detected() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_tracer_pid(&status))
            .is_some_and(|pid| pid != 0)
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// The `TracerPid:` value of a `/proc/<pid>/status` file.
pub fn parse_tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tracer_pid() {
        let status = "Name:\tapp\nState:\tS (sleeping)\nTracerPid:\t4242\nUid:\t1000\n";
        assert_eq!(parse_tracer_pid(status), Some(4242));
    }

    #[test]
    fn untraced_status_reports_zero() {
        assert_eq!(parse_tracer_pid("TracerPid:\t0\n"), Some(0));
        assert_eq!(parse_tracer_pid("Name:\tapp\n"), None);
    }
}
