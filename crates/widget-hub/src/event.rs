//! Hub Wire Messages

use serde::{Deserialize, Serialize};

pub const ACTION_DELETE_USER: &str = "deleteUser";
pub const ACTION_LOGOUT: &str = "logout";

/// Inbound payload as sent by admin pages
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub user_id: i64,
}

/// Decoded event on the shared channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HubEvent {
    UserDeleted { user_id: i64 },
    /// Any action without a handler; dropped by the worker
    Unrecognized { action: String },
}

impl From<Envelope> for HubEvent {
    fn from(envelope: Envelope) -> Self {
        match envelope.action.as_str() {
            ACTION_DELETE_USER => Self::UserDeleted {
                user_id: envelope.user_id,
            },
            _ => Self::Unrecognized {
                action: envelope.action,
            },
        }
    }
}

impl HubEvent {
    /// Decode a text frame
    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<Envelope>(text).map(Self::from)
    }

    /// Outbound notice for this event, if it has one
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::UserDeleted { user_id } => Some(Notice::logout(*user_id)),
            Self::Unrecognized { .. } => None,
        }
    }
}

/// Outbound message pushed to every connection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub action: String,
    pub message: String,
    pub user_id: i64,
}

impl Notice {
    /// First message on every new connection
    pub fn ack() -> Self {
        Self {
            action: String::new(),
            message: "Connected to server".into(),
            user_id: 0,
        }
    }

    pub fn logout(user_id: i64) -> Self {
        Self {
            action: ACTION_LOGOUT.into(),
            message: "Your account has been deleted".into(),
            user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_delete_user() {
        let event = HubEvent::decode(
            r#"{"action":"deleteUser","message":"","username":"ann","message_type":"","user_id":7}"#,
        )
        .unwrap();
        assert_eq!(event, HubEvent::UserDeleted { user_id: 7 });
        assert_eq!(event.notice(), Some(Notice::logout(7)));
    }

    #[test]
    fn test_unknown_action_has_no_notice() {
        let event = HubEvent::decode(r#"{"action":"ping"}"#).unwrap();
        assert!(matches!(event, HubEvent::Unrecognized { ref action } if action == "ping"));
        assert_eq!(event.notice(), None);
        assert!(HubEvent::decode("not json").is_err());
    }

    #[test]
    fn test_notice_shape() {
        let json = serde_json::to_value(Notice::logout(7)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"action": "logout", "message": "Your account has been deleted", "user_id": 7})
        );
        assert_eq!(Notice::ack().message, "Connected to server");
    }
}
