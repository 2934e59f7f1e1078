//! The conversation log entry.
//!
//! A `Message` is both the persisted record inside the `messages` collection
//! and the payload of a `new_message` push, so both sides agree on one shape.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A unique message identifier.
///
/// Formatted as `<millis>-<sequence>` where the sequence is a fixed-width
/// hexadecimal counter, so ids minted in commit order also sort in that order.
pub type MessageId = String;

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Globally unique id.
    pub id: MessageId,
    /// Chat id or channel handle this message belongs to.
    pub conversation_id: String,
    /// Identity reference of the author.
    pub from: String,
    /// Opaque payload.
    pub text: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub time: u64,
}

impl Message {
    /// Compare two messages by their log position, `(time, id)`.
    #[must_use]
    pub fn log_order(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, time: u64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "alice_bob".to_string(),
            from: "alice".to_string(),
            text: "hi".to_string(),
            time,
        }
    }

    #[test]
    fn test_log_order_time_then_id() {
        let a = message("10-0000000000000002", 10);
        let b = message("10-0000000000000003", 10);
        let c = message("09-ffffffffffffffff", 11);

        assert_eq!(a.log_order(&b), Ordering::Less);
        assert_eq!(b.log_order(&c), Ordering::Less);
        assert_eq!(c.log_order(&a), Ordering::Greater);
    }

    #[test]
    fn test_camel_case_fields() {
        let json = serde_json::to_value(message("1-0", 1)).unwrap();
        assert_eq!(json["conversationId"], "alice_bob");
        assert!(json.get("conversation_id").is_none());
    }
}
