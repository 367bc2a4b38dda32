//! End-to-end tests of the controller against a running server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use campus_chat_client::{ChatController, HttpChatApi, Identity, LiveSignal, WsConnector};
use campus_chat_protocol::LiveEvent;
use campus_chat_server::auth::jwt::{issue_access_token, ACCESS_TOKEN_TTL_SECS};
use campus_chat_server::config::Config;

struct TestServer {
    addr: SocketAddr,
    jwt_secret: Vec<u8>,
}

impl TestServer {
    fn identity(&self, user_id: &str) -> Identity {
        Identity {
            user_id: user_id.to_string(),
            token: issue_access_token(&self.jwt_secret, user_id, ACCESS_TOKEN_TTL_SECS).unwrap(),
        }
    }

    fn controller(&self) -> ChatController {
        ChatController::new(
            Arc::new(HttpChatApi::new(format!("http://{}", self.addr))),
            Arc::new(WsConnector::new(format!("ws://{}", self.addr))),
        )
    }
}

async fn start_test_server(users: &[&str]) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = campus_chat_server::db::init_db(&data_dir).expect("Failed to init DB");
    for user in users {
        campus_chat_server::identity::register_user(&db, user, user).unwrap();
    }
    let jwt_secret = campus_chat_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let config = Config {
        data_dir: data_dir.clone(),
        ..Config::default()
    };
    let state = campus_chat_server::state::AppState::new(db, jwt_secret.clone(), &config)
        .expect("Failed to build state");

    let app = campus_chat_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    TestServer { addr, jwt_secret }
}

/// Pump live signals until `done` holds for the session or time runs out.
async fn pump_until(controller: &mut ChatController, done: impl Fn(&ChatController) -> bool) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !done(controller) {
            controller.next_signal().await.expect("live channel open");
        }
    })
    .await
    .expect("condition reached within timeout");
}

#[tokio::test]
async fn message_reaches_open_conversation_live() {
    let server = start_test_server(&["alice", "bob"]).await;

    let mut alice = server.controller();
    alice.set_identity(Some(server.identity("alice"))).await.unwrap();
    let mut bob = server.controller();
    bob.set_identity(Some(server.identity("bob"))).await.unwrap();

    bob.select_peer("alice").await.unwrap();
    alice.select_peer("bob").await.unwrap();

    pump_until(&mut bob, |c| c.session().unwrap().is_online("alice")).await;

    let sent = alice.send(Some("  hello bob  ")).await.unwrap();
    assert_eq!(sent.text.as_deref(), Some("hello bob"));
    assert_eq!(alice.session().unwrap().messages(), &[sent.clone()]);

    pump_until(&mut bob, |c| !c.session().unwrap().messages().is_empty()).await;
    assert_eq!(bob.session().unwrap().messages(), &[sent]);
}

#[tokio::test]
async fn second_sign_in_closes_first_channel_with_superseded_code() {
    let server = start_test_server(&["alice"]).await;

    let mut first = server.controller();
    first.set_identity(Some(server.identity("alice"))).await.unwrap();
    pump_until(&mut first, |c| c.session().unwrap().is_online("alice")).await;

    let mut second = server.controller();
    second.set_identity(Some(server.identity("alice"))).await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match first.next_signal().await {
                Some(LiveSignal::Closed { code }) => return code,
                Some(LiveSignal::Event(LiveEvent::Presence { .. })) => continue,
                other => panic!("unexpected signal {:?}", other),
            }
        }
    })
    .await
    .expect("first channel closed");

    assert_eq!(closed, Some(4000));
    assert!(!first.is_live());
}
