pub mod store;

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex };

use futures::StreamExt;
use log::{ error, info, warn };
use thiserror::Error;
use tokio::sync::{ mpsc, oneshot };
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::models::feed::FeedEvent;
use crate::models::session::Session;
use self::store::SessionStore;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid feed URL: {0}")] Url(#[from] url::ParseError),
    #[error("websocket handshake failed: {0}")] Handshake(
        #[from] tokio_tungstenite::tungstenite::Error,
    ),
}

/// Notification that the shared session view changed, so a consumer knows when
/// to re-render without polling the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedUpdate {
    SessionChanged {
        session_id: String,
    },
    Disconnected,
}

/// Owns at most one live feed connection. Selecting a different chatbot closes
/// the previous socket before the new one is established, so two sockets are
/// never live at once.
pub struct ObserverFeed {
    ws_base: String,
    active: Option<FeedHandle>,
}

impl ObserverFeed {
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self { ws_base: ws_base.into(), active: None }
    }

    /// Close any prior connection and subscribe to the given chatbot's feed.
    pub async fn switch(&mut self, chatbot_id: &str) -> Result<(), FeedError> {
        if let Some(prior) = self.active.take() {
            prior.close().await;
        }
        let handle = FeedHandle::connect(&self.ws_base, chatbot_id).await?;
        self.active = Some(handle);
        Ok(())
    }

    pub fn handle(&self) -> Option<&FeedHandle> {
        self.active.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut FeedHandle> {
        self.active.as_mut()
    }

    pub async fn disconnect(&mut self) {
        if let Some(prior) = self.active.take() {
            prior.close().await;
        }
    }
}

/// One live, receive-only subscription to `/ws/feed` for a single chatbot.
///
/// All store mutation happens on the internal read task; once the task exits
/// (remote close, transport error, or `close()`) no further mutation is
/// possible, which is the guard against late events from a stale connection.
pub struct FeedHandle {
    chatbot_id: String,
    store: Arc<Mutex<SessionStore>>,
    connected: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    updates: Option<mpsc::UnboundedReceiver<FeedUpdate>>,
}

impl FeedHandle {
    pub async fn connect(ws_base: &str, chatbot_id: &str) -> Result<Self, FeedError> {
        let mut url = Url::parse(&format!("{}/ws/feed", ws_base.trim_end_matches('/')))?;
        url.query_pairs_mut().append_pair("chatbot_id", chatbot_id);

        let (ws, _response) = connect_async(url.as_str()).await?;
        info!("Connected to observer feed for bot: {}", chatbot_id);

        let store = Arc::new(Mutex::new(SessionStore::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let task_store = Arc::clone(&store);
        let task_connected = Arc::clone(&connected);
        let task_bot = chatbot_id.to_string();
        let task = tokio::spawn(async move {
            let mut ws = ws;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        break;
                    }
                    msg = ws.next() => {
                        match msg {
                            Some(Ok(WsMessage::Text(text))) => {
                                match serde_json::from_str::<FeedEvent>(&text) {
                                    Ok(event) => {
                                        let changed = task_store
                                            .lock()
                                            .expect("session store lock poisoned")
                                            .apply(event);
                                        if let Some(session_id) = changed {
                                            let _ = update_tx.send(FeedUpdate::SessionChanged {
                                                session_id,
                                            });
                                        }
                                    }
                                    Err(e) => {
                                        // Malformed frames are skipped, never fatal.
                                        warn!("Failed to parse feed frame: {}", e);
                                    }
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!("Observer feed closed for bot {}", task_bot);
                                let _ = update_tx.send(FeedUpdate::Disconnected);
                                break;
                            }
                            Some(Ok(_)) => {
                                // Ping/pong handled by the protocol layer;
                                // binary frames are not part of the feed.
                            }
                            Some(Err(e)) => {
                                error!("Observer feed error for bot {}: {}", task_bot, e);
                                let _ = update_tx.send(FeedUpdate::Disconnected);
                                break;
                            }
                        }
                    }
                }
            }
            // Best effort; the remote may already be gone.
            let _ = ws.close(None).await;
            task_connected.store(false, Ordering::SeqCst);
        });

        Ok(Self {
            chatbot_id: chatbot_id.to_string(),
            store,
            connected,
            shutdown: Some(shutdown_tx),
            task,
            updates: Some(update_rx),
        })
    }

    pub fn chatbot_id(&self) -> &str {
        &self.chatbot_id
    }

    /// Presentational flag only; connection loss clears no session state.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Preload the store from a REST sessions fetch. Live events fold on top.
    pub fn seed(&self, sessions: Vec<Session>) {
        self.store.lock().expect("session store lock poisoned").seed(sessions);
    }

    /// Run a closure against the current session view.
    pub fn with_sessions<R>(&self, f: impl FnOnce(&SessionStore) -> R) -> R {
        f(&self.store.lock().expect("session store lock poisoned"))
    }

    pub fn snapshot(&self) -> Vec<Session> {
        self.with_sessions(|store| store.sessions().to_vec())
    }

    /// Take the update notification channel. Yields `None` after the first
    /// call; there is a single consumer per connection.
    pub fn updates(&mut self) -> Option<mpsc::UnboundedReceiver<FeedUpdate>> {
        self.updates.take()
    }

    /// Close the subscription and wait for the read task to stop. After this
    /// returns, no further store mutation can occur.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                error!("Feed read task for bot {} panicked: {}", self.chatbot_id, e);
            }
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        // Fallback for handles dropped without close(): stop the read task so
        // a stale socket cannot keep mutating the store.
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.abort();
    }
}
