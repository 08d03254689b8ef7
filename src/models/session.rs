use chrono::Utc;
use serde::{ Serialize, Deserialize };
use uuid::Uuid;

/// Lifecycle status of an observed conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
    Flagged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One transcript entry. While the backend is streaming tokens the entry is
/// provisional: it carries a synthetic `temp-` id and `streaming` is set until
/// a `message_complete` frame reconciles it with the server-issued identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub facts_cited: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violated_constraint_id: Option<String>,
    /// Client-local sentinel marking the single in-flight assistant message of
    /// a session. Never sent over the wire.
    #[serde(skip)]
    pub streaming: bool,
}

impl Message {
    pub fn new(id: String, role: Role, content: String, facts_cited: Vec<String>) -> Self {
        Self {
            id,
            role,
            content,
            timestamp: display_time(),
            facts_cited,
            violated_constraint_id: None,
            streaming: false,
        }
    }

    /// A provisional assistant message seeded from the first token fragment.
    pub fn provisional(fragment: String) -> Self {
        Self {
            id: format!("temp-{}", Uuid::new_v4()),
            role: Role::Assistant,
            content: fragment,
            timestamp: display_time(),
            facts_cited: Vec::new(),
            violated_constraint_id: None,
            streaming: true,
        }
    }
}

/// One end-user conversation thread with a chatbot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub client_name: String,
    pub start_time: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub messages: Vec<Message>,
}

pub const DEFAULT_CLIENT_NAME: &str = "New Visitor";

impl Session {
    pub fn new(id: String, client_name: Option<String>, status: Option<SessionStatus>) -> Self {
        Self {
            id,
            client_name: client_name.unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
            start_time: display_time(),
            status: status.unwrap_or(SessionStatus::Active),
            messages: Vec::new(),
        }
    }

    /// The in-flight assistant message, if one exists. Keyed by the `streaming`
    /// sentinel rather than by position so reconciliation is robust against
    /// interleaved user messages.
    pub fn streaming_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.streaming)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

pub fn display_time() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisional_message_is_assistant_and_streaming() {
        let msg = Message::provisional("Hel".to_string());
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.streaming);
        assert!(msg.id.starts_with("temp-"));
        assert_eq!(msg.content, "Hel");
    }

    #[test]
    fn session_defaults() {
        let session = Session::new("s1".to_string(), None, None);
        assert_eq!(session.client_name, DEFAULT_CLIENT_NAME);
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.messages.is_empty());
    }

    #[test]
    fn status_uses_wire_casing() {
        let json = serde_json::to_string(&SessionStatus::Flagged).unwrap();
        assert_eq!(json, "\"Flagged\"");
        let role: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, Role::Assistant);
    }
}
