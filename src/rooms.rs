//! Canonical room naming.
//!
//! A room is a named broadcast group of live connections corresponding to one
//! chat.  Persisted conversations (groups and direct conversations that
//! already have a row) use `conversation-{id}`.  A direct pairing that has no
//! conversation row yet uses `dm-{a}-{b}` where the two user ids are sorted
//! lexicographically, so both parties derive the same key no matter who
//! computes it.

use serde::{Deserialize, Serialize};

/// The chat a client currently has open, as far as room naming is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTarget {
    /// A persisted conversation (group or direct) identified by its row id.
    Conversation { conversation_id: String },
    /// An ad hoc direct pairing with another user, no conversation row yet.
    Direct { other_user_id: String },
}

impl ChatTarget {
    /// The conversation id, when this target is a persisted conversation.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ChatTarget::Conversation { conversation_id } => Some(conversation_id),
            ChatTarget::Direct { .. } => None,
        }
    }
}

/// Compute the canonical room name for `chat` as seen by `current_user_id`.
///
/// Returns `None` when no chat is active.  Pure and total over well-formed
/// inputs; the DM form is symmetric in the two user ids.
pub fn room_name(chat: Option<&ChatTarget>, current_user_id: &str) -> Option<String> {
    match chat? {
        ChatTarget::Conversation { conversation_id } => {
            Some(format!("conversation-{conversation_id}"))
        }
        ChatTarget::Direct { other_user_id } => {
            let mut pair = [current_user_id, other_user_id.as_str()];
            pair.sort_unstable();
            Some(format!("dm-{}-{}", pair[0], pair[1]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_room_uses_row_id() {
        let chat = ChatTarget::Conversation {
            conversation_id: "abc123".to_string(),
        };
        assert_eq!(
            room_name(Some(&chat), "u1").as_deref(),
            Some("conversation-abc123")
        );
    }

    #[test]
    fn dm_room_is_symmetric() {
        let from_u1 = room_name(
            Some(&ChatTarget::Direct {
                other_user_id: "u2".to_string(),
            }),
            "u1",
        );
        let from_u2 = room_name(
            Some(&ChatTarget::Direct {
                other_user_id: "u1".to_string(),
            }),
            "u2",
        );
        assert_eq!(from_u1, from_u2);
        assert_eq!(from_u1.as_deref(), Some("dm-u1-u2"));
    }

    #[test]
    fn dm_room_sorts_lexicographically() {
        let name = room_name(
            Some(&ChatTarget::Direct {
                other_user_id: "aaa".to_string(),
            }),
            "zzz",
        );
        assert_eq!(name.as_deref(), Some("dm-aaa-zzz"));
    }

    #[test]
    fn no_chat_means_no_room() {
        assert_eq!(room_name(None, "u1"), None);
    }
}
