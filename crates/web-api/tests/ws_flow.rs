mod support;

use std::sync::Arc;

use application::memory::InMemoryMessageStore;
use application::MessageStore;
use async_trait::async_trait;
use domain::{ChatMessage, NewChatMessage, RepositoryError, UserId};
use futures_util::SinkExt;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as TungsteniteMessage},
};

use support::{expect_closed, expect_silence, next_event, send_unit, TestServer};

/// 能写消息但查不出历史的存储
struct HistoryUnavailable(InMemoryMessageStore);

#[async_trait]
impl MessageStore for HistoryUnavailable {
    async fn create(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        self.0.create(message).await
    }

    async fn last_broadcasts(&self, _limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        Err(RepositoryError::storage("connection reset"))
    }

    async fn last_involving(
        &self,
        _user_id: UserId,
        _limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        Err(RepositoryError::storage("connection reset"))
    }
}

async fn expect_rejected(server: &TestServer, token: &str) {
    match connect_async(server.ws_url(token)).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
        Err(other) => panic!("unexpected handshake error {other:?}"),
        Ok(_) => panic!("upgrade with token {token:?} should be rejected"),
    }
}

#[tokio::test]
async fn first_user_scenario() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;
    let token_b = server.sign_up("b@x.com").await;

    let mut a = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;
    // 新账户没有历史
    expect_silence(&mut a).await;

    let mut b = server.connect(&token_b).await;
    server.wait_for_sessions(2).await;

    let join = next_event(&mut a).await;
    assert_eq!(join["type"], "join");
    assert_eq!(join["data"]["user"], "b@x.com");
    expect_silence(&mut a).await;

    send_unit(&mut a, "", "hi").await;

    for ws in [&mut a, &mut b] {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "message");
        assert_eq!(event["data"]["from"], "a@x.com");
        assert_eq!(event["data"]["to"], "");
        assert_eq!(event["data"]["text"], "hi");
        assert!(event["data"]["date_time"].is_string());
    }
}

#[tokio::test]
async fn private_message_reaches_only_its_two_parties() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;
    let token_b = server.sign_up("b@x.com").await;
    let token_c = server.sign_up("c@x.com").await;

    let mut a = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;
    let mut b = server.connect(&token_b).await;
    server.wait_for_sessions(2).await;
    let mut c = server.connect(&token_c).await;
    server.wait_for_sessions(3).await;

    // 清掉加入通知
    assert_eq!(next_event(&mut a).await["data"]["user"], "b@x.com");
    assert_eq!(next_event(&mut a).await["data"]["user"], "c@x.com");
    assert_eq!(next_event(&mut b).await["data"]["user"], "c@x.com");

    send_unit(&mut a, "b@x.com", "psst").await;

    for ws in [&mut a, &mut b] {
        let event = next_event(ws).await;
        assert_eq!(event["data"]["from"], "a@x.com");
        assert_eq!(event["data"]["to"], "b@x.com");
        assert_eq!(event["data"]["text"], "psst");
    }
    expect_silence(&mut c).await;
}

#[tokio::test]
async fn late_joiner_gets_earlier_broadcast_from_history_only() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;
    let token_b = server.sign_up("b@x.com").await;

    let mut a = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;
    send_unit(&mut a, "", "before b").await;
    assert_eq!(next_event(&mut a).await["data"]["text"], "before b");

    let mut b = server.connect(&token_b).await;
    let replayed = next_event(&mut b).await;
    assert_eq!(replayed["type"], "message");
    assert_eq!(replayed["data"]["text"], "before b");
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn history_is_replayed_in_order_before_live_events() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;
    let token_b = server.sign_up("b@x.com").await;
    let token_c = server.sign_up("c@x.com").await;

    let mut a = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;
    send_unit(&mut a, "", "one").await;
    send_unit(&mut a, "b@x.com", "two").await;
    send_unit(&mut a, "c@x.com", "not for b").await;
    send_unit(&mut a, "", "three").await;
    for _ in 0..4 {
        next_event(&mut a).await;
    }

    let mut b = server.connect(&token_b).await;
    let texts: Vec<String> = {
        let mut texts = Vec::new();
        for _ in 0..3 {
            let event = next_event(&mut b).await;
            texts.push(event["data"]["text"].as_str().unwrap().to_owned());
        }
        texts
    };
    assert_eq!(texts, vec!["one", "two", "three"]);

    // 历史之后才是实时事件
    server.wait_for_sessions(2).await;
    let _c = server.connect(&token_c).await;
    server.wait_for_sessions(3).await;
    let live = next_event(&mut b).await;
    assert_eq!(live["type"], "join");
    assert_eq!(live["data"]["user"], "c@x.com");
}

#[tokio::test]
async fn bad_or_missing_token_is_rejected_before_upgrade() {
    let server = TestServer::start().await;
    server.sign_up("a@x.com").await;

    expect_rejected(&server, "bogus").await;
    expect_rejected(&server, "").await;
    assert!(server.state.hub.registry().is_empty().await);
}

#[tokio::test]
async fn superseded_token_is_rejected_for_upgrade() {
    let server = TestServer::start().await;
    let t1 = server.sign_up("a@x.com").await;
    let t2 = server.login("a@x.com").await;
    assert_ne!(t1, t2);

    expect_rejected(&server, &t1).await;
    let _ws = server.connect(&t2).await;
    server.wait_for_sessions(1).await;
}

#[tokio::test]
async fn reconnect_evicts_older_connection() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;
    let token_b = server.sign_up("b@x.com").await;

    let mut first = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;
    let mut second = server.connect(&token_a).await;

    expect_closed(&mut first).await;
    server.wait_for_sessions(1).await;

    let mut b = server.connect(&token_b).await;
    server.wait_for_sessions(2).await;
    assert_eq!(next_event(&mut second).await["data"]["user"], "b@x.com");

    send_unit(&mut b, "a@x.com", "still there?").await;
    assert_eq!(next_event(&mut second).await["data"]["text"], "still there?");
}

#[tokio::test]
async fn malformed_frame_closes_connection_and_deregisters() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;

    let mut a = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;

    a.send(TungsteniteMessage::Text("not json".into()))
        .await
        .unwrap();

    expect_closed(&mut a).await;
    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn invalid_unit_keeps_connection_open() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;

    let mut a = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;

    send_unit(&mut a, "", "   ").await;
    send_unit(&mut a, "ghost@x.com", "anyone?").await;
    send_unit(&mut a, "", "ok").await;

    let event = next_event(&mut a).await;
    assert_eq!(event["data"]["text"], "ok");
}

#[tokio::test]
async fn client_disconnect_deregisters_session() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;

    let mut a = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;
    a.close(None).await.unwrap();

    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn history_failure_closes_connection_and_deregisters() {
    let server =
        TestServer::start_with_message_store(Arc::new(HistoryUnavailable(InMemoryMessageStore::new())))
            .await;
    let token_a = server.sign_up("a@x.com").await;

    let mut a = server.connect(&token_a).await;
    expect_closed(&mut a).await;
    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn last_message_echo_arrives_before_close() {
    let server = TestServer::start().await;
    let token_a = server.sign_up("a@x.com").await;

    let mut a = server.connect(&token_a).await;
    server.wait_for_sessions(1).await;

    send_unit(&mut a, "", "bye").await;
    a.send(TungsteniteMessage::Binary(vec![0u8].into()))
        .await
        .unwrap();

    assert_eq!(next_event(&mut a).await["data"]["text"], "bye");
    expect_closed(&mut a).await;
    server.wait_for_sessions(0).await;
}
