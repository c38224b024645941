//! Live-session messages exchanged over a channel.
//!
//! Every participant publishes small JSON documents announcing presence
//! and merges:
//!
//! ```json
//! {"version":"3.0","from_user_name":"alice","app":"connect-samples","message_type":"MERGE_STARTED"}
//! ```

use serde::{Deserialize, Serialize};

use crate::client::Peer;
use crate::error::SampleError;

/// Protocol version written into every message.
pub const MESSAGE_VERSION: &str = "3.0";

/// Kind of a live-session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Presence announcement, also the answer to `GET_USERS`.
    Hello,
    /// A participant joined the session.
    Join,
    /// A participant left the session.
    Left,
    /// Asks every participant to answer with `HELLO`.
    GetUsers,
    /// A participant started merging the session.
    MergeStarted,
    /// A participant finished merging the session.
    MergeFinished,
}

impl MessageType {
    /// Returns `true` for the two merge notifications.
    #[must_use]
    pub const fn is_merge(self) -> bool {
        matches!(self, Self::MergeStarted | Self::MergeFinished)
    }

    /// Wire name, e.g. `GET_USERS`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Join => "JOIN",
            Self::Left => "LEFT",
            Self::GetUsers => "GET_USERS",
            Self::MergeStarted => "MERGE_STARTED",
            Self::MergeFinished => "MERGE_FINISHED",
        }
    }
}

/// One live-session message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Protocol version.
    pub version: String,
    /// Sender's user name.
    pub from_user_name: String,
    /// Sender's application.
    pub app: String,
    /// Message kind.
    pub message_type: MessageType,
}

impl SessionMessage {
    /// Creates a message from `peer`.
    #[must_use]
    pub fn new(message_type: MessageType, peer: &Peer) -> Self {
        Self {
            version: MESSAGE_VERSION.to_string(),
            from_user_name: peer.user_name.clone(),
            app: peer.app.clone(),
            message_type,
        }
    }

    /// Encodes the message as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SampleError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a text payload. Anything that is not a live-session message
    /// yields `None`.
    #[must_use]
    pub fn from_text(text: &str) -> Option<Self> {
        serde_json::from_str(text.trim()).ok()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_serde() {
        for kind in [
            MessageType::Hello,
            MessageType::Join,
            MessageType::Left,
            MessageType::GetUsers,
            MessageType::MergeStarted,
            MessageType::MergeFinished,
        ] {
            let Ok(json) = serde_json::to_string(&kind) else {
                panic!("serializable");
            };
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn decodes_messages_from_other_clients() {
        let text = r#"{"version":"3.0","from_user_name":"bob","app":"Kit","message_type":"MERGE_FINISHED"}"#;
        let Some(message) = SessionMessage::from_text(text) else {
            panic!("valid message");
        };
        assert_eq!(message.from_user_name, "bob");
        assert!(message.message_type.is_merge());
    }

    #[test]
    fn plain_chat_is_not_a_session_message() {
        assert!(SessionMessage::from_text("hello there").is_none());
        assert!(SessionMessage::from_text(r#"{"message_type":"HELLO"}"#).is_none());
        assert!(SessionMessage::from_text(r#"{"version":"3.0","from_user_name":"a","app":"b","message_type":"WAVE"}"#).is_none());
    }

    #[test]
    fn encoded_message_carries_version_and_identity() {
        let peer = Peer::new("alice", "connect-samples");
        let Ok(bytes) = SessionMessage::new(MessageType::GetUsers, &peer).to_bytes() else {
            panic!("encodable");
        };
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            panic!("json");
        };
        assert_eq!(value.get("version").and_then(|v| v.as_str()), Some("3.0"));
        assert_eq!(value.get("from_user_name").and_then(|v| v.as_str()), Some("alice"));
        assert_eq!(value.get("message_type").and_then(|v| v.as_str()), Some("GET_USERS"));
    }
}
