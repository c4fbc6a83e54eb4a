//! 消息中枢：会话登记、历史回放、加入通知和消息路由
//!
//! 这里不直接接触 socket，所有推送都经过会话句柄的出站队列，socket 的读写在 `ws_connection` 中。

use std::collections::HashSet;
use std::sync::Arc;

use application::{AccountService, ApplicationError, CreateMessageRequest};
use domain::{ChatMessage, MessageId, User};
use tokio::sync::mpsc;

use crate::events::{ClientMessage, ServerEvent};
use crate::registry::{SessionHandle, SessionRegistry};

pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// 新连接的历史回放
///
/// 会话先于历史查询登记，两者之间持久化的消息既在历史里，也在出站队列里。
/// 写任务用 [`HistoryReplay::covers`] 跳过已回放过的消息。
#[derive(Debug, Default)]
pub struct HistoryReplay {
    pub events: Vec<ServerEvent>,
    replayed: HashSet<MessageId>,
}

impl HistoryReplay {
    pub fn new(messages: &[ChatMessage]) -> Self {
        Self {
            events: messages.iter().map(ServerEvent::from).collect(),
            replayed: messages.iter().map(|message| message.id).collect(),
        }
    }

    /// 事件对应的消息是否已经在回放中发出
    pub fn covers(&self, event: &ServerEvent) -> bool {
        event
            .message_id()
            .is_some_and(|id| self.replayed.contains(&id))
    }
}

pub struct Hub {
    accounts: Arc<AccountService>,
    registry: Arc<SessionRegistry>,
    outbound_buffer: usize,
}

impl Hub {
    pub fn new(
        accounts: Arc<AccountService>,
        registry: Arc<SessionRegistry>,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            accounts,
            registry,
            outbound_buffer,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// 为用户登记新会话。同一身份已有连接时，旧连接被踢下线。
    pub async fn open_session(&self, user: &User) -> (SessionHandle, mpsc::Receiver<ServerEvent>) {
        let (handle, outbound) = SessionHandle::new(user.email.clone(), self.outbound_buffer);

        if let Some(previous) = self.registry.put(user.email.clone(), handle.clone()).await {
            tracing::info!(
                user = %user.email,
                evicted = %previous.connection_id(),
                "evicting previous connection for identity"
            );
            previous.evict();
        }

        tracing::info!(user = %user.email, connection = %handle.connection_id(), "session registered");
        (handle, outbound)
    }

    /// 按时间升序返回需要回放给该用户的历史事件
    pub async fn history(&self, user: &User) -> Result<HistoryReplay, ApplicationError> {
        let messages = self.accounts.chat_history(user).await?;
        Ok(HistoryReplay::new(&messages))
    }

    /// 通知除自己以外的所有在线连接
    pub async fn announce_join(&self, session: &SessionHandle) {
        let event = ServerEvent::join(session.identity());
        for peer in self.registry.snapshot().await {
            if peer.connection_id() == session.connection_id() {
                continue;
            }
            push(&peer, event.clone());
        }
    }

    /// 持久化客户端消息并路由给相应连接
    pub async fn handle_client_message(
        &self,
        sender: &User,
        unit: ClientMessage,
    ) -> Result<ChatMessage, ApplicationError> {
        let message = self
            .accounts
            .create_message(
                sender,
                CreateMessageRequest {
                    receiver_email: unit.to,
                    text: unit.text,
                },
            )
            .await?;

        self.route(&message).await;
        Ok(message)
    }

    /// 私聊消息发给发送方和（在线的）接收方；广播消息发给当前快照中的所有连接，包括发送方
    pub async fn route(&self, message: &ChatMessage) {
        let event = ServerEvent::from(message);

        match &message.receiver {
            Some(receiver) => {
                if let Some(session) = self.registry.get(&message.sender.email).await {
                    push(&session, event.clone());
                }
                if receiver.email == message.sender.email {
                    return;
                }
                match self.registry.get(&receiver.email).await {
                    Some(session) => push(&session, event),
                    None => {
                        tracing::debug!(to = %receiver.email, "recipient offline, message persisted only")
                    }
                }
            }
            None => {
                for session in self.registry.snapshot().await {
                    push(&session, event.clone());
                }
            }
        }
    }

    /// 注销会话。注册项已被新连接占用时不做任何事。
    pub async fn close_session(&self, session: &SessionHandle) {
        let removed = self
            .registry
            .remove_connection(session.identity(), session.connection_id())
            .await;
        tracing::info!(
            user = %session.identity(),
            connection = %session.connection_id(),
            removed,
            "session closed"
        );
    }
}

fn push(session: &SessionHandle, event: ServerEvent) {
    if let Err(err) = session.deliver(event) {
        tracing::warn!(
            user = %session.identity(),
            connection = %session.connection_id(),
            error = %err,
            "event delivery failed"
        );
    }
}
