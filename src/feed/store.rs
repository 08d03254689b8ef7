use log::{ debug, warn };

use crate::models::feed::FeedEvent;
use crate::models::session::{ Message, Session };

/// In-memory view of every observed conversation for one chatbot, built by
/// folding feed events in arrival order. Newest sessions sit at the front of
/// the list; message sequences are append-only except for the provisional
/// streaming entry, which `message_complete` replaces with its finalized form.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Vec<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the store contents with sessions fetched over REST. Used once
    /// after connecting, before live events start folding in.
    pub fn seed(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    /// Fold one event into the store. Returns the id of the session the event
    /// touched, or `None` if it changed nothing.
    pub fn apply(&mut self, event: FeedEvent) -> Option<String> {
        match event {
            FeedEvent::SessionUpdate { session_id, client_name, status } => {
                match self.position(&session_id) {
                    Some(idx) => {
                        // Status and name only. The message list is never
                        // touched by a session_update.
                        let session = &mut self.sessions[idx];
                        if let Some(status) = status {
                            session.status = status;
                        }
                        if let Some(name) = client_name {
                            session.client_name = name;
                        }
                    }
                    None => {
                        self.sessions.insert(0, Session::new(session_id.clone(), client_name, status));
                    }
                }
                Some(session_id)
            }
            FeedEvent::NewMessage { session_id, message_id, role, content, facts_cited } => {
                let message = Message::new(
                    message_id,
                    role,
                    content,
                    facts_cited.unwrap_or_default()
                );
                match self.position(&session_id) {
                    Some(idx) => self.sessions[idx].messages.push(message),
                    None => {
                        let mut session = Session::new(session_id.clone(), None, None);
                        session.messages.push(message);
                        self.sessions.insert(0, session);
                    }
                }
                Some(session_id)
            }
            FeedEvent::Token { session_id, content } => {
                let session = match self.find_mut(&session_id) {
                    Some(session) => session,
                    None => {
                        debug!("Dropping token for unknown session {}", session_id);
                        return None;
                    }
                };
                match session.streaming_message_mut() {
                    Some(message) => message.content.push_str(&content),
                    None => session.messages.push(Message::provisional(content)),
                }
                Some(session_id)
            }
            FeedEvent::ProcessingStart { session_id } => {
                // Reserved for a typing indicator; no transcript change.
                debug!("Processing started for session {}", session_id);
                None
            }
            FeedEvent::MessageComplete { session_id, message_id, full_content, citations } => {
                let session = match self.find_mut(&session_id) {
                    Some(session) => session,
                    None => {
                        debug!("Dropping message_complete for unknown session {}", session_id);
                        return None;
                    }
                };
                let citations = citations.unwrap_or_default();
                match session.streaming_message_mut() {
                    Some(message) => {
                        // Reconciliation point: the server-issued identity and
                        // full content win over whatever tokens accumulated.
                        message.id = message_id;
                        message.content = full_content;
                        message.facts_cited = citations;
                        message.streaming = false;
                    }
                    None => {
                        warn!(
                            "message_complete for session {} with no in-flight message; appending",
                            session_id
                        );
                        let mut message = Message::new(
                            message_id,
                            crate::models::session::Role::Assistant,
                            full_content,
                            citations
                        );
                        message.streaming = false;
                        session.messages.push(message);
                    }
                }
                Some(session_id)
            }
            FeedEvent::Unknown => None,
        }
    }

    fn position(&self, session_id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == session_id)
    }

    fn find_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }
}
