//! 内存实现的账户目录、消息存储、密码哈希和令牌编解码（用于测试和本地开发）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use domain::{
    ChatMessage, MessageId, NewChatMessage, PasswordHash, RepositoryError, Timestamp, User,
    UserEmail, UserId,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::password::{PasswordHasher, PasswordHasherError};
use crate::repository::{AccountDirectory, MessageStore};
use crate::token::{TokenClaims, TokenCodec, TokenError};

pub struct InMemoryAccountDirectory {
    users: RwLock<HashMap<UserEmail, User>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryAccountDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn create_or_fetch(
        &self,
        email: UserEmail,
        password: PasswordHash,
    ) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let now = self.clock.now();
        let user = users
            .entry(email.clone())
            .or_insert_with(|| User::register(UserId::generate(), email, password, now));
        Ok(user.clone())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn store_token(&self, id: UserId, token: &str) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|user| user.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.issue_token(token, self.clock.now());
        Ok(user.clone())
    }
}

/// 按插入顺序保存消息，时间戳严格递增，与插入顺序一致
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<ChatMessage>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            clock,
        }
    }

    pub async fn all(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }

    fn next_timestamp(&self, last: Option<Timestamp>) -> Timestamp {
        let now = self.clock.now();
        match last {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        }
    }
}

fn last_n(messages: impl DoubleEndedIterator<Item = ChatMessage>, limit: usize) -> Vec<ChatMessage> {
    let mut recent: Vec<ChatMessage> = messages.rev().take(limit).collect();
    recent.reverse();
    recent
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        let mut messages = self.messages.write().await;
        let created_at = self.next_timestamp(messages.last().map(|m| m.created_at));
        let stored = message.into_message(MessageId::generate(), created_at);
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn last_broadcasts(&self, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(last_n(
            messages.iter().filter(|m| m.is_broadcast()).cloned(),
            limit,
        ))
    }

    async fn last_involving(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(last_n(
            messages.iter().filter(|m| m.involves(user_id)).cloned(),
            limit,
        ))
    }
}

/// 不做哈希的密码“哈希器”，只能用于测试
#[derive(Debug, Default, Clone)]
pub struct PlainPasswordHasher;

const PLAIN_PREFIX: &str = "plain$";

#[async_trait]
impl PasswordHasher for PlainPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("{PLAIN_PREFIX}{plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        let stored = hashed
            .as_str()
            .strip_prefix(PLAIN_PREFIX)
            .ok_or_else(|| PasswordHasherError::verify_error("unrecognized hash format"))?;
        Ok(stored == plaintext)
    }
}

/// 无签名的令牌编解码：`mem.<jti>.<email>`
#[derive(Debug, Default, Clone)]
pub struct InMemoryTokenCodec;

impl TokenCodec for InMemoryTokenCodec {
    fn issue(&self, email: &UserEmail) -> Result<String, TokenError> {
        Ok(format!("mem.{}.{}", Uuid::new_v4().simple(), email))
    }

    fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut parts = token.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("mem"), Some(jti), Some(email)) if !jti.is_empty() && !email.is_empty() => {
                Ok(TokenClaims {
                    email: email.to_owned(),
                    jti: jti.to_owned(),
                    iat: 0,
                })
            }
            _ => Err(TokenError::Malformed("unrecognized token".to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use domain::{MessageText, Participant};

    use super::*;

    fn participant(email: &str) -> Participant {
        Participant {
            id: UserId::generate(),
            email: UserEmail::parse(email).unwrap(),
        }
    }

    fn new_message(sender: &Participant, receiver: Option<&Participant>, text: &str) -> NewChatMessage {
        NewChatMessage {
            sender: sender.clone(),
            receiver: receiver.cloned(),
            text: MessageText::new(text).unwrap(),
        }
    }

    #[tokio::test]
    async fn create_or_fetch_is_idempotent_by_email() {
        let directory = InMemoryAccountDirectory::new();
        let email = UserEmail::parse("a@x.com").unwrap();

        let first = directory
            .create_or_fetch(email.clone(), PasswordHash::new("h1").unwrap())
            .await
            .unwrap();
        let second = directory
            .create_or_fetch(email, PasswordHash::new("h2").unwrap())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.password.as_str(), "h1");
        assert_eq!(directory.len().await, 1);
    }

    #[tokio::test]
    async fn store_token_for_unknown_id_is_not_found() {
        let directory = InMemoryAccountDirectory::new();
        let result = directory.store_token(UserId::generate(), "t").await;
        assert_eq!(result, Err(RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn message_store_keeps_insertion_order_and_limits() {
        let store = InMemoryMessageStore::new();
        let alice = participant("alice@x.com");
        let bob = participant("bob@x.com");
        let carol = participant("carol@x.com");

        for i in 0..5 {
            store
                .create(new_message(&alice, None, &format!("public {i}")))
                .await
                .unwrap();
        }
        store
            .create(new_message(&bob, Some(&carol), "private"))
            .await
            .unwrap();

        let broadcasts = store.last_broadcasts(3).await.unwrap();
        let texts: Vec<_> = broadcasts.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["public 2", "public 3", "public 4"]);
        assert!(broadcasts
            .windows(2)
            .all(|pair| pair[0].created_at < pair[1].created_at));

        assert_eq!(store.last_involving(carol.id, 10).await.unwrap().len(), 1);
        assert!(store.last_involving(alice.id, 2).await.unwrap().len() == 2);
    }

    #[tokio::test]
    async fn plain_hasher_round_trip() {
        let hasher = PlainPasswordHasher;
        let hash = hasher.hash("secret1").await.unwrap();
        assert!(hasher.verify("secret1", &hash).await.unwrap());
        assert!(!hasher.verify("secret2", &hash).await.unwrap());
    }

    #[test]
    fn memory_codec_issues_distinct_tokens() {
        let codec = InMemoryTokenCodec;
        let email = UserEmail::parse("a.b@x.com").unwrap();
        let t1 = codec.issue(&email).unwrap();
        let t2 = codec.issue(&email).unwrap();
        assert_ne!(t1, t2);
        assert_eq!(codec.decode(&t1).unwrap().email, "a.b@x.com");
        assert!(codec.decode("garbage").is_err());
    }
}
