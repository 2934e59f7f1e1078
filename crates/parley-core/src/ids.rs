//! Keys, ids and timestamps.

use crate::error::{Error, Result};
use parley_protocol::MessageId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length of a conversation id or channel handle.
pub const MAX_KEY_LENGTH: usize = 256;

/// Message sequence, seeded from the wall clock so that a restarted process
/// does not reuse sequences minted by the previous one.
static SEQUENCE: OnceLock<AtomicU64> = OnceLock::new();

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generate a unique message id for a message created at `time`.
///
/// The sequence part never repeats within a process, so two messages in the
/// same millisecond still get distinct ids, and ids minted later compare
/// greater when their times are equal.
#[must_use]
pub fn generate_message_id(time: u64) -> MessageId {
    let sequence = SEQUENCE
        .get_or_init(|| {
            let seed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default();
            AtomicU64::new(seed)
        })
        .fetch_add(1, Ordering::Relaxed);
    format!("{time}-{sequence:016x}")
}

/// Canonical id of the two-party chat between `a` and `b`.
///
/// The pair is sorted before joining, so `(a, b)` and `(b, a)` agree.
#[must_use]
pub fn chat_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}_{second}")
}

/// Validate a conversation id, channel handle or identity reference.
///
/// # Errors
///
/// Returns `InvalidKey` if the key is empty, too long or contains control
/// characters.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key cannot be empty"));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(Error::InvalidKey("key too long"));
    }
    if key.chars().any(char::is_control) {
        return Err(Error::InvalidKey("key contains control characters"));
    }
    Ok(())
}
