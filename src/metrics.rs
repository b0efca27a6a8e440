//! Minimal protocol counters.
//! Kept deliberately simple; a Prometheus exposition can be layered on later.
use std::sync::atomic::{AtomicU64, Ordering};

static LINES_DECODED: AtomicU64 = AtomicU64::new(0);
static LINES_UNMATCHED: AtomicU64 = AtomicU64::new(0);
static FRAME_PARSE_ERRORS: AtomicU64 = AtomicU64::new(0);
static COMMANDS_SENT: AtomicU64 = AtomicU64::new(0);
static SEND_FAILURES: AtomicU64 = AtomicU64::new(0);

pub fn inc_lines_decoded() { LINES_DECODED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_lines_unmatched() { LINES_UNMATCHED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_frame_parse_errors() { FRAME_PARSE_ERRORS.fetch_add(1, Ordering::Relaxed); }
pub fn inc_commands_sent() { COMMANDS_SENT.fetch_add(1, Ordering::Relaxed); }
pub fn inc_send_failures() { SEND_FAILURES.fetch_add(1, Ordering::Relaxed); }

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub lines_decoded: u64,
    pub lines_unmatched: u64,
    pub frame_parse_errors: u64,
    pub commands_sent: u64,
    pub send_failures: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        lines_decoded: LINES_DECODED.load(Ordering::Relaxed),
        lines_unmatched: LINES_UNMATCHED.load(Ordering::Relaxed),
        frame_parse_errors: FRAME_PARSE_ERRORS.load(Ordering::Relaxed),
        commands_sent: COMMANDS_SENT.load(Ordering::Relaxed),
        send_failures: SEND_FAILURES.load(Ordering::Relaxed),
    }
}
