use serde::{ Serialize, Deserialize };

use super::session::{ Role, SessionStatus };

/// Inbound observer-feed frame. The backend discriminates on a `type` field;
/// frame kinds we do not recognize deserialize into `Unknown` and are dropped
/// by the reducer instead of failing the whole connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    #[serde(rename = "session_update")] SessionUpdate {
        session_id: String,
        #[serde(default)]
        client_name: Option<String>,
        #[serde(default)]
        status: Option<SessionStatus>,
    },
    #[serde(rename = "new_message")] NewMessage {
        session_id: String,
        message_id: String,
        role: Role,
        content: String,
        #[serde(default)]
        facts_cited: Option<Vec<String>>,
    },
    #[serde(rename = "token")] Token {
        session_id: String,
        content: String,
    },
    #[serde(rename = "processing_start")] ProcessingStart {
        session_id: String,
    },
    #[serde(rename = "message_complete")] MessageComplete {
        session_id: String,
        message_id: String,
        full_content: String,
        #[serde(default)]
        citations: Option<Vec<String>>,
    },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_update_without_optional_fields() {
        let event: FeedEvent = serde_json
            ::from_str(r#"{"type":"session_update","session_id":"s1"}"#)
            .unwrap();
        match event {
            FeedEvent::SessionUpdate { session_id, client_name, status } => {
                assert_eq!(session_id, "s1");
                assert!(client_name.is_none());
                assert!(status.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn parses_new_message() {
        let event: FeedEvent = serde_json
            ::from_str(
                r#"{"type":"new_message","session_id":"s1","message_id":"m1","role":"user","content":"hi","facts_cited":["f1"]}"#
            )
            .unwrap();
        match event {
            FeedEvent::NewMessage { message_id, role, facts_cited, .. } => {
                assert_eq!(message_id, "m1");
                assert_eq!(role, Role::User);
                assert_eq!(facts_cited.unwrap(), vec!["f1".to_string()]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unrecognized_type_maps_to_unknown() {
        let event: FeedEvent = serde_json
            ::from_str(r#"{"type":"heartbeat","session_id":"s1"}"#)
            .unwrap();
        assert!(matches!(event, FeedEvent::Unknown));
    }
}
