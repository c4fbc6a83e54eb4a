#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::memory::{
    InMemoryAccountDirectory, InMemoryMessageStore, InMemoryTokenCodec, PlainPasswordHasher,
};
use application::{AccountService, AccountServiceDependencies, MessageStore};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub const PASSWORD: &str = "secret1";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 使用内存存储的完整服务，绑定随机端口
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_message_store(Arc::new(InMemoryMessageStore::new())).await
    }

    pub async fn start_with_message_store(message_store: Arc<dyn MessageStore>) -> Self {
        let account_service = Arc::new(AccountService::new(AccountServiceDependencies {
            account_directory: Arc::new(InMemoryAccountDirectory::new()),
            message_store,
            password_hasher: Arc::new(PlainPasswordHasher),
            token_codec: Arc::new(InMemoryTokenCodec),
            history_limit: 100,
        }));
        let state = AppState::new(account_service, 64);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            client: Client::new(),
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    pub async fn register(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/register"))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .expect("register request")
    }

    pub async fn authorize(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth"))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .expect("auth request")
    }

    pub async fn login(&self, email: &str) -> String {
        let body: Value = self
            .authorize(email, PASSWORD)
            .await
            .json()
            .await
            .expect("auth json");
        body["token"].as_str().expect("token in auth response").to_owned()
    }

    /// 注册并登录，返回令牌
    pub async fn sign_up(&self, email: &str) -> String {
        let response = self.register(email, PASSWORD).await;
        assert!(response.status().is_success(), "register {email} failed");
        self.login(email).await
    }

    pub async fn profile(&self, token: &str) -> reqwest::Response {
        self.client
            .get(self.url("/profile"))
            .header("X-TOKEN", token)
            .send()
            .await
            .expect("profile request")
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let (ws, _) = connect_async(self.ws_url(token)).await.expect("ws connect");
        ws
    }

    /// 握手完成后会话登记是异步的，等到注册表里有 `count` 个会话
    pub async fn wait_for_sessions(&self, count: usize) {
        let registry = self.state.hub.registry().clone();
        timeout(Duration::from_secs(5), async move {
            while registry.len().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sessions registered");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub async fn send_unit(ws: &mut WsClient, to: &str, text: &str) {
    let frame = json!({"to": to, "text": text}).to_string();
    ws.send(TungsteniteMessage::Text(frame.into()))
        .await
        .expect("send unit");
}

/// 读取下一个事件，跳过控制帧
pub async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("event before timeout")
            .expect("stream open")
            .expect("frame");
        match frame {
            TungsteniteMessage::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("event json")
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// 在短时间内不应再收到任何事件
pub async fn expect_silence(ws: &mut WsClient) {
    if let Ok(Some(Ok(frame))) = timeout(Duration::from_millis(300), ws.next()).await {
        panic!("unexpected frame {frame:?}");
    }
}

/// 等待服务端关闭连接
pub async fn expect_closed(ws: &mut WsClient) {
    loop {
        match timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("close before timeout")
        {
            None | Some(Err(_)) | Some(Ok(TungsteniteMessage::Close(_))) => return,
            Some(Ok(TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got {other:?}"),
        }
    }
}
