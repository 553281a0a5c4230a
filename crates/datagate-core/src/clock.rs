//! Write timestamps for `createdAt` / `updatedAt`
//!
//! Successive writes observe non-decreasing timestamps even if the wall
//! clock steps backwards, so `createdAt <= updatedAt` holds for any record
//! written through this process.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Current write timestamp, millisecond precision, never earlier than a
/// previously returned one
pub fn now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_millis();
    let prev = LAST_MILLIS.fetch_max(wall, Ordering::SeqCst);
    let millis = prev.max(wall);
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

/// RFC 3339 rendering used for JSON-facing backends
pub fn now_rfc3339() -> String {
    now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
