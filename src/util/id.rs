use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::types::{SessionId, TokenId};

static LAST_NANOS: AtomicU64 = AtomicU64::new(0);

/// Nanoseconds since the Unix epoch, strictly increasing across the process
/// even when the wall clock stalls or steps back.
pub fn monotonic_nanos() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);

    let mut last = LAST_NANOS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_NANOS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Identifiers of the form `{subject_id}_{nanos}`.
pub trait FromSubject {
    fn from_subject(subject_id: &str) -> Self;
}

impl FromSubject for TokenId {
    fn from_subject(subject_id: &str) -> Self {
        TokenId(format!("{}_{}", subject_id, monotonic_nanos()))
    }
}

impl FromSubject for SessionId {
    fn from_subject(subject_id: &str) -> Self {
        SessionId(format!("{}_{}", subject_id, monotonic_nanos()))
    }
}
