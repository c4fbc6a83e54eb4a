//! 在线会话注册表
//!
//! 每个身份（邮箱）最多对应一个连接。注册表只保存可克隆的句柄，连接本身归各自的任务所有。

use std::collections::HashMap;
use std::sync::Arc;

use domain::UserEmail;
use thiserror::Error;
use tokio::sync::{mpsc, Notify, RwLock};
use uuid::Uuid;

use crate::events::ServerEvent;

/// 投递失败只记录日志，不向调用方传播
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection is closed")]
    Closed,
}

/// 指向某个连接出站队列的句柄
#[derive(Debug, Clone)]
pub struct SessionHandle {
    connection_id: Uuid,
    identity: UserEmail,
    outbound: mpsc::Sender<ServerEvent>,
    evicted: Arc<Notify>,
}

impl SessionHandle {
    /// 创建句柄以及对应出站队列的接收端
    pub fn new(identity: UserEmail, buffer: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (outbound, receiver) = mpsc::channel(buffer.max(1));
        let handle = Self {
            connection_id: Uuid::new_v4(),
            identity,
            outbound,
            evicted: Arc::new(Notify::new()),
        };
        (handle, receiver)
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn identity(&self) -> &UserEmail {
        &self.identity
    }

    /// 非阻塞入队，慢连接不会拖住发送方
    pub fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.outbound.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// 通知连接任务结束（同一身份有新连接时调用）
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    /// 在 `evict` 被调用后完成；先调用后等待也不会丢失通知
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserEmail, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册句柄，返回被替换掉的旧句柄
    pub async fn put(&self, identity: UserEmail, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.write().await.insert(identity, handle)
    }

    pub async fn get(&self, identity: &UserEmail) -> Option<SessionHandle> {
        self.sessions.read().await.get(identity).cloned()
    }

    pub async fn remove(&self, identity: &UserEmail) -> Option<SessionHandle> {
        self.sessions.write().await.remove(identity)
    }

    /// 仅当注册项仍属于该连接时才移除，旧连接退出时不会误删新连接
    pub async fn remove_connection(&self, identity: &UserEmail, connection_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(identity) {
            Some(handle) if handle.connection_id == connection_id => {
                sessions.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// 某一时刻的全部句柄
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
