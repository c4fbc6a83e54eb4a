use async_trait::async_trait;
use application::{AccountDirectory, MessageStore};
use domain::{
    ChatMessage, MessageId, MessageText, NewChatMessage, Participant, PasswordHash,
    RepositoryError, Timestamp, User, UserEmail, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        other => RepositoryError::storage(other.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    password_hash: String,
    token: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let email = UserEmail::parse(value.email).map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;

        Ok(User {
            id: UserId::from(value.id),
            email,
            password,
            token: value.token,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    text: String,
    created_at: Timestamp,
    sender_id: Uuid,
    sender_email: String,
    receiver_id: Option<Uuid>,
    receiver_email: Option<String>,
}

impl TryFrom<MessageRecord> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let sender = Participant {
            id: UserId::from(value.sender_id),
            email: UserEmail::parse(value.sender_email)
                .map_err(|err| invalid_data(err.to_string()))?,
        };
        let receiver = match (value.receiver_id, value.receiver_email) {
            (Some(id), Some(email)) => Some(Participant {
                id: UserId::from(id),
                email: UserEmail::parse(email).map_err(|err| invalid_data(err.to_string()))?,
            }),
            (None, _) => None,
            (Some(id), None) => {
                return Err(invalid_data(format!("receiver {id} has no account")));
            }
        };
        let text = MessageText::new(value.text).map_err(|err| invalid_data(err.to_string()))?;

        Ok(ChatMessage {
            id: MessageId::from(value.id),
            sender,
            receiver,
            text,
            created_at: value.created_at,
        })
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, token, created_at, updated_at";

// 按 seq 倒序取最近的 N 条，调用方再翻转为升序
const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.text, m.created_at,
           s.id AS sender_id, s.email AS sender_email,
           r.id AS receiver_id, r.email AS receiver_email
    FROM chat_messages m
    JOIN users s ON s.id = m.sender_id
    LEFT JOIN users r ON r.id = m.receiver_id
"#;

#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn create_or_fetch(
        &self,
        email: UserEmail,
        password: PasswordHash,
    ) -> Result<User, RepositoryError> {
        // 并发注册同一邮箱时只有一条插入成功，其余读取已存在的行
        let inserted = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(email.as_str())
        .bind(password.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match inserted {
            Some(record) => User::try_from(record),
            None => self
                .fetch_by_email(&email)
                .await?
                .ok_or(RepositoryError::NotFound),
        }
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        self.fetch_by_email(email).await
    }

    async fn store_token(&self, id: UserId, token: &str) -> Result<User, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users
            SET token = $2, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::from(id))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record
            .map(User::try_from)
            .transpose()?
            .ok_or(RepositoryError::NotFound)
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn oldest_first(records: Vec<MessageRecord>) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut messages = records
            .into_iter()
            .map(ChatMessage::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        let id = MessageId::generate();
        let created_at = sqlx::query_scalar::<_, Timestamp>(
            r#"
            INSERT INTO chat_messages (id, sender_id, receiver_id, text, created_at, updated_at)
            VALUES ($1, $2, $3, $4, clock_timestamp(), clock_timestamp())
            RETURNING created_at
            "#,
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(message.sender.id))
        .bind(message.receiver.as_ref().map(|receiver| Uuid::from(receiver.id)))
        .bind(message.text.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(message.into_message(id, created_at))
    }

    async fn last_broadcasts(&self, limit: usize) -> Result<Vec<ChatMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "{MESSAGE_SELECT} WHERE m.receiver_id IS NULL ORDER BY m.seq DESC LIMIT $1"
        ))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Self::oldest_first(records)
    }

    async fn last_involving(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "{MESSAGE_SELECT} WHERE m.sender_id = $1 OR m.receiver_id = $1 ORDER BY m.seq DESC LIMIT $2"
        ))
        .bind(Uuid::from(user_id))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Self::oldest_first(records)
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
