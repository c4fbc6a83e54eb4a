use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::User;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::events::{ClientMessage, ServerEvent};
use crate::hub::{HistoryReplay, Hub};
use crate::registry::SessionHandle;

/// 写任务在收到停止信号后最多再等待这么久，之后直接中止
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type WsSink = SplitSink<WebSocket, WsMessage>;
type WsStream = SplitStream<WebSocket>;

/// 接收循环结束的原因
#[derive(Debug)]
enum LoopExit {
    ClientClosed,
    ReadFailed(axum::Error),
    Malformed(String),
    Evicted,
}

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("history unavailable: {0}")]
    History(application::ApplicationError),
    #[error("write failed: {0}")]
    Write(axum::Error),
}

/// 单个已认证 WebSocket 连接的完整生命周期
///
/// 登记会话、回放历史、通知其他在线用户，然后进入接收循环。
/// 无论从哪条路径退出，会话都会被注销，写任务都会被停止。
pub struct WebSocketConnection {
    hub: Arc<Hub>,
    user: User,
}

impl WebSocketConnection {
    pub fn new(hub: Arc<Hub>, user: User) -> Self {
        Self { hub, user }
    }

    pub async fn run(self, socket: WebSocket) {
        let (session, outbound) = self.hub.open_session(&self.user).await;
        let (mut sink, mut incoming) = socket.split();

        // 历史直接写入 socket，写任务启动前到达的实时事件先在出站队列里排队
        let replay = match self.replay_history(&mut sink).await {
            Ok(replay) => replay,
            Err(err) => {
                tracing::info!(user = %self.user.email, error = %err, "history replay failed, closing");
                self.hub.close_session(&session).await;
                let _ = sink.send(WsMessage::Close(None)).await;
                return;
            }
        };

        self.hub.announce_join(&session).await;

        let (stop_tx, stop_rx) = oneshot::channel();
        let mut writer = tokio::spawn(write_loop(sink, outbound, stop_rx, replay));

        let exit = self.receive_loop(&session, &mut incoming).await;
        match &exit {
            LoopExit::ClientClosed => tracing::info!(user = %self.user.email, "client closed connection"),
            LoopExit::ReadFailed(err) => {
                tracing::debug!(user = %self.user.email, error = %err, "websocket read failed")
            }
            LoopExit::Malformed(reason) => {
                tracing::info!(user = %self.user.email, reason = %reason, "malformed client message, closing")
            }
            LoopExit::Evicted => {
                tracing::info!(user = %self.user.email, "connection replaced by a newer one")
            }
        }

        self.hub.close_session(&session).await;

        let _ = stop_tx.send(());
        if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
            let _ = writer.await;
        }
    }

    async fn replay_history(&self, sink: &mut WsSink) -> Result<HistoryReplay, ReplayError> {
        let mut replay = self.hub.history(&self.user).await.map_err(|err| {
            tracing::error!(user = %self.user.email, error = %err, "failed to load chat history");
            ReplayError::History(err)
        })?;

        tracing::debug!(user = %self.user.email, count = replay.events.len(), "replaying chat history");
        for event in std::mem::take(&mut replay.events) {
            if let Some(frame) = encode(&event) {
                sink.send(frame).await.map_err(ReplayError::Write)?;
            }
        }
        Ok(replay)
    }

    async fn receive_loop(&self, session: &SessionHandle, incoming: &mut WsStream) -> LoopExit {
        loop {
            let frame = tokio::select! {
                _ = session.evicted() => return LoopExit::Evicted,
                frame = incoming.next() => frame,
            };

            let text = match frame {
                None | Some(Ok(WsMessage::Close(_))) => return LoopExit::ClientClosed,
                Some(Err(err)) => return LoopExit::ReadFailed(err),
                // ping 由 axum 自动回复 pong
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Binary(_))) => {
                    return LoopExit::Malformed("binary frame".to_owned())
                }
                Some(Ok(WsMessage::Text(text))) => text,
            };

            let unit = match ClientMessage::parse(text.as_str()) {
                Ok(unit) => unit,
                Err(err) => return LoopExit::Malformed(err.to_string()),
            };

            if let Err(err) = self.hub.handle_client_message(&self.user, unit).await {
                tracing::warn!(
                    user = %self.user.email,
                    error = %err,
                    kind = ?err.kind(),
                    "client message rejected"
                );
            }
        }
    }
}

/// 把出站队列写到 socket
///
/// 收到停止信号后先写完队列中已有的事件，再发送关闭帧。
/// 已在历史回放中发出的消息不再重复发送。
async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<ServerEvent>,
    mut stop: oneshot::Receiver<()>,
    replay: HistoryReplay,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut stop => break,
            event = outbound.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if forward(&mut sink, &replay, &event).await.is_err() {
            return;
        }
    }

    while let Ok(event) = outbound.try_recv() {
        if forward(&mut sink, &replay, &event).await.is_err() {
            return;
        }
    }

    let _ = sink.send(WsMessage::Close(None)).await;
    let _ = sink.close().await;
}

async fn forward<S>(sink: &mut S, replay: &HistoryReplay, event: &ServerEvent) -> Result<(), ()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    if replay.covers(event) {
        tracing::debug!(message_id = ?event.message_id(), "skipping event already sent in history");
        return Ok(());
    }
    let Some(frame) = encode(event) else {
        return Ok(());
    };
    sink.send(frame).await.map_err(|err| {
        tracing::debug!(error = %err, "websocket write failed");
    })
}

fn encode(event: &ServerEvent) -> Option<WsMessage> {
    match event.to_json() {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize websocket payload");
            None
        }
    }
}
