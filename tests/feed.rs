//! End-to-end feed lifecycle tests against an in-process websocket server.

use std::net::SocketAddr;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Arc;
use std::time::Duration;

use futures::{ SinkExt, StreamExt };
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use veritas_console::feed::{ FeedHandle, FeedUpdate, ObserverFeed };

struct TestServer {
    addr: SocketAddr,
    live: Arc<AtomicUsize>,
}

/// Accepts any number of connections; on each, sends the given frames and
/// then either closes immediately or stays open until the client goes away.
async fn start_server(frames: Vec<String>, close_after_send: bool) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let live = Arc::new(AtomicUsize::new(0));

    let frames = Arc::new(frames);
    let live_accept = Arc::clone(&live);
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let frames = Arc::clone(&frames);
            let live = Arc::clone(&live_accept);
            tokio::spawn(async move {
                let mut ws = match accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => {
                        return;
                    }
                };
                live.fetch_add(1, Ordering::SeqCst);
                for frame in frames.iter() {
                    if ws.send(Message::Text(frame.clone())).await.is_err() {
                        break;
                    }
                }
                if close_after_send {
                    let _ = ws.close(None).await;
                } else {
                    while let Some(msg) = ws.next().await {
                        match msg {
                            Ok(Message::Close(_)) | Err(_) => {
                                break;
                            }
                            _ => {}
                        }
                    }
                }
                live.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    TestServer { addr, live }
}

async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn events_fold_into_the_shared_session_view() {
    let server = start_server(
        vec![
            r#"{"type":"session_update","session_id":"s1","client_name":"Ada","status":"Active"}"#.to_string(),
            r#"{"type":"new_message","session_id":"s1","message_id":"m1","role":"user","content":"hello"}"#.to_string()
        ],
        false
    ).await;

    let mut handle = FeedHandle::connect(&format!("ws://{}", server.addr), "bot-1").await.expect(
        "feed connect"
    );
    let mut updates = handle.updates().expect("update channel");

    for _ in 0..2 {
        timeout(Duration::from_secs(5), updates.recv()).await
            .expect("update timed out")
            .expect("feed ended early");
    }

    assert!(handle.is_connected());
    let sessions = handle.snapshot();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "s1");
    assert_eq!(sessions[0].client_name, "Ada");
    assert_eq!(sessions[0].messages.len(), 1);
    assert_eq!(sessions[0].messages[0].content, "hello");

    handle.close().await;
    wait_for(|| server.live.load(Ordering::SeqCst) == 0).await;
}

#[tokio::test]
async fn malformed_frames_are_skipped_without_killing_the_feed() {
    let server = start_server(
        vec![
            "this is not json".to_string(),
            r#"{"type":"new_message","session_id":"s1","message_id":"m1","role":"user","content":"still alive"}"#.to_string()
        ],
        false
    ).await;

    let mut handle = FeedHandle::connect(&format!("ws://{}", server.addr), "bot-1").await.expect(
        "feed connect"
    );
    let mut updates = handle.updates().expect("update channel");

    let update = timeout(Duration::from_secs(5), updates.recv()).await
        .expect("update timed out")
        .expect("feed ended early");
    assert_eq!(update, FeedUpdate::SessionChanged { session_id: "s1".to_string() });
    assert!(handle.is_connected());

    handle.close().await;
}

#[tokio::test]
async fn switching_chatbots_leaves_exactly_one_live_connection() {
    let server = start_server(vec![], false).await;
    let mut feed = ObserverFeed::new(format!("ws://{}", server.addr));

    feed.switch("bot-a").await.expect("first subscribe");
    feed.switch("bot-b").await.expect("second subscribe");

    assert_eq!(feed.handle().expect("active handle").chatbot_id(), "bot-b");
    wait_for(|| server.live.load(Ordering::SeqCst) == 1).await;

    feed.disconnect().await;
    assert!(feed.handle().is_none());
    wait_for(|| server.live.load(Ordering::SeqCst) == 0).await;
}

#[tokio::test]
async fn remote_close_flags_disconnect_but_retains_sessions() {
    let server = start_server(
        vec![
            r#"{"type":"new_message","session_id":"s1","message_id":"m1","role":"assistant","content":"bye"}"#.to_string()
        ],
        true
    ).await;

    let mut handle = FeedHandle::connect(&format!("ws://{}", server.addr), "bot-1").await.expect(
        "feed connect"
    );
    let mut updates = handle.updates().expect("update channel");

    let first = timeout(Duration::from_secs(5), updates.recv()).await
        .expect("update timed out")
        .expect("feed ended early");
    assert!(matches!(first, FeedUpdate::SessionChanged { .. }));

    let second = timeout(Duration::from_secs(5), updates.recv()).await.expect("update timed out");
    assert_eq!(second, Some(FeedUpdate::Disconnected));

    wait_for(|| !handle.is_connected()).await;
    // Connection loss clears no state; the last known view stays visible.
    let sessions = handle.snapshot();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].messages[0].content, "bye");

    handle.close().await;
}
