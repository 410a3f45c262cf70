//! Conversion from NTFS `FILETIME` values to Unix time.
//!
//! NTFS timestamps count 100ns ticks since 1601-01-01 00:00:00 UTC.

const TICKS_PER_SECOND: u64 = 10_000_000;
const FILETIME_TO_UNIX_EPOCH_SECS: i64 = 11_644_473_600;

/// Returns `(unix_seconds, nanoseconds)`.
pub fn filetime_to_unix(ticks: u64) -> (i64, u32) {
    let secs = (ticks / TICKS_PER_SECOND) as i64 - FILETIME_TO_UNIX_EPOCH_SECS;
    let nanos = ((ticks % TICKS_PER_SECOND) * 100) as u32;
    (secs, nanos)
}
