use std::sync::Arc;

use application::repository::{
    ConversationRepository, NotificationRepository, ReactionRepository, UserRepository,
};
use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, Discussion, DiscussionId, DomainError, LeaveOutcome, Message,
    MessageContent, MessageId, Notification, NotificationId, NotificationKind, Participant,
    ParticipantPair, Reactable, ReactionToggle, Reply, RepositoryError, SubjectKind, SubjectRef,
    Timestamp, User, UserEmail, UserId, UserRole,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

const FOREIGN_KEY_VIOLATION: &str = "23503";

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == FOREIGN_KEY_VIOLATION)
}

fn count_to_u64(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| invalid_data(format!("negative count {value}")))
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let email = UserEmail::parse(value.email).map_err(|err| invalid_data(err.to_string()))?;
        let role: UserRole = value
            .role
            .parse()
            .map_err(|err: DomainError| invalid_data(err.to_string()))?;
        Ok(User::new(
            UserId::from(value.id),
            email,
            value.name,
            role,
            value.created_at,
        ))
    }
}

#[derive(Debug, FromRow)]
struct ConversationRecord {
    id: Uuid,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ConversationRecord> for Conversation {
    fn from(value: ConversationRecord) -> Self {
        Conversation {
            id: ConversationId::from(value.id),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    conversation_id: Uuid,
    user_id: Uuid,
    unread_count: i32,
    last_read_at: Option<OffsetDateTime>,
    joined_at: OffsetDateTime,
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = RepositoryError;

    fn try_from(value: ParticipantRecord) -> Result<Self, Self::Error> {
        let unread_count = u32::try_from(value.unread_count)
            .map_err(|_| invalid_data(format!("negative unread count {}", value.unread_count)))?;
        Ok(Participant {
            conversation_id: ConversationId::from(value.conversation_id),
            user_id: UserId::from(value.user_id),
            unread_count,
            last_read_at: value.last_read_at,
            joined_at: value.joined_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    sequence: i64,
    is_read: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Message {
            id: MessageId::from(value.id),
            conversation_id: ConversationId::from(value.conversation_id),
            sender_id: UserId::from(value.sender_id),
            content,
            sequence: value.sequence,
            read: value.is_read,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReactableRecord {
    subject_id: Uuid,
    author_id: Uuid,
    discussion_id: Uuid,
    discussion_title: String,
}

impl ReactableRecord {
    fn into_reactable(self, kind: SubjectKind) -> Reactable {
        Reactable {
            subject: SubjectRef::new(kind, self.subject_id),
            author_id: UserId::from(self.author_id),
            discussion_id: DiscussionId::from(self.discussion_id),
            discussion_title: self.discussion_title,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRecord {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    title: String,
    content: String,
    link: String,
    is_read: bool,
    is_dismissed: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = RepositoryError;

    fn try_from(value: NotificationRecord) -> Result<Self, Self::Error> {
        let kind: NotificationKind = value
            .kind
            .parse()
            .map_err(|err: DomainError| invalid_data(err.to_string()))?;
        Ok(Notification {
            id: NotificationId::from(value.id),
            recipient_id: UserId::from(value.user_id),
            kind,
            title: value.title,
            content: value.content,
            link: value.link,
            read: value.is_read,
            dismissed: value.is_dismissed,
            created_at: value.created_at,
        })
    }
}

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, content, sequence, is_read, created_at";
const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, content, link, is_read, is_dismissed, created_at";

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 写入或更新用户资料，账号服务同步时使用
    pub async fn upsert(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email, name = EXCLUDED.name, role = EXCLUDED.role
            "#,
        )
        .bind(Uuid::from(user.id))
        .bind(user.email.as_str())
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, name, role, created_at FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(User::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, RepositoryError> {
        self.pool.begin().await.map_err(map_sqlx_err)
    }

    // 锁住会话行，串行化同一会话内的写操作
    async fn lock_conversation(
        tx: &mut Transaction<'static, Postgres>,
        conversation_id: ConversationId,
    ) -> Result<bool, RepositoryError> {
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM conversations WHERE id = $1 FOR UPDATE",
        )
        .bind(Uuid::from(conversation_id))
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(locked.is_some())
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn register_or_reuse(
        &self,
        pair: ParticipantPair,
        candidate: Conversation,
    ) -> Result<Conversation, RepositoryError> {
        let mut tx = self.begin().await?;

        // 并发插入同一用户对时，后到的事务等待先到的提交后走 DO NOTHING 分支
        let inserted = sqlx::query_as::<_, ConversationRecord>(
            r#"
            INSERT INTO conversations (id, pair_low, pair_high, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (pair_low, pair_high) DO NOTHING
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(Uuid::from(candidate.id))
        .bind(Uuid::from(pair.low()))
        .bind(Uuid::from(pair.high()))
        .bind(candidate.created_at)
        .bind(candidate.updated_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let conversation = match inserted {
            Some(record) => {
                for user_id in pair.members() {
                    sqlx::query(
                        r#"
                        INSERT INTO conversation_participants (conversation_id, user_id, unread_count, joined_at)
                        VALUES ($1, $2, 0, $3)
                        "#,
                    )
                    .bind(Uuid::from(candidate.id))
                    .bind(Uuid::from(user_id))
                    .bind(candidate.created_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(|err| {
                        if is_foreign_key_violation(&err) {
                            RepositoryError::Rejected(DomainError::UserNotFound)
                        } else {
                            map_sqlx_err(err)
                        }
                    })?;
                }
                Conversation::from(record)
            }
            None => sqlx::query_as::<_, ConversationRecord>(
                r#"
                SELECT id, created_at, updated_at
                FROM conversations
                WHERE pair_low = $1 AND pair_high = $2
                "#,
            )
            .bind(Uuid::from(pair.low()))
            .bind(Uuid::from(pair.high()))
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_err)?
            .into(),
        };

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(conversation)
    }

    async fn append_message(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut tx = self.begin().await?;

        if !Self::lock_conversation(&mut tx, message.conversation_id).await? {
            return Err(RepositoryError::Rejected(DomainError::NotAParticipant));
        }

        let is_participant = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM conversation_participants
                WHERE conversation_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender_id))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if !is_participant {
            return Err(RepositoryError::Rejected(DomainError::NotAParticipant));
        }

        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, is_read, created_at)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET unread_count = unread_count + 1
            WHERE conversation_id = $1 AND user_id <> $2
            "#,
        )
        .bind(Uuid::from(message.conversation_id))
        .bind(Uuid::from(message.sender_id))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query("UPDATE conversations SET updated_at = $2 WHERE id = $1")
            .bind(Uuid::from(message.conversation_id))
            .bind(message.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Message::try_from(record)
    }

    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE conversation_participants
            SET unread_count = 0, last_read_at = $3
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user_id))
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Rejected(DomainError::NotAParticipant));
        }

        sqlx::query(
            r#"
            UPDATE messages SET is_read = TRUE
            WHERE conversation_id = $1 AND sender_id <> $2 AND NOT is_read
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user_id))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn leave(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<LeaveOutcome, RepositoryError> {
        let mut tx = self.begin().await?;

        if !Self::lock_conversation(&mut tx, conversation_id).await? {
            return Err(RepositoryError::Rejected(DomainError::NotAParticipant));
        }

        let removed = sqlx::query(
            "DELETE FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user_id))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if removed.rows_affected() == 0 {
            return Err(RepositoryError::Rejected(DomainError::NotAParticipant));
        }

        let remaining = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = $1",
        )
        .bind(Uuid::from(conversation_id))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        let outcome = LeaveOutcome::new(count_to_u64(remaining)? as usize);

        if outcome.conversation_deleted {
            sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
                .bind(Uuid::from(conversation_id))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            sqlx::query("DELETE FROM conversations WHERE id = $1")
                .bind(Uuid::from(conversation_id))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        } else {
            // 释放用户对，之后重新发起会创建新会话
            sqlx::query(
                "UPDATE conversations SET pair_low = NULL, pair_high = NULL WHERE id = $1",
            )
            .bind(Uuid::from(conversation_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(outcome)
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, created_at, updated_at FROM conversations WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Conversation::from))
    }

    async fn find_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        let record = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT conversation_id, user_id, unread_count, last_read_at, joined_at
            FROM conversation_participants
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Participant::try_from).transpose()
    }

    async fn list_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT conversation_id, user_id, unread_count, last_read_at, joined_at
            FROM conversation_participants
            WHERE conversation_id = $1
            ORDER BY joined_at ASC, user_id ASC
            "#,
        )
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Participant::try_from).collect()
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = $1 ORDER BY sequence ASC"
        ))
        .bind(Uuid::from(conversation_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Message::try_from).collect()
    }

    async fn last_message(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1
            ORDER BY sequence DESC
            LIMIT 1
            "#
        ))
        .bind(Uuid::from(conversation_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Message::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT c.id, c.created_at, c.updated_at
            FROM conversations c
            JOIN conversation_participants p ON p.conversation_id = c.id
            WHERE p.user_id = $1
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(Conversation::from).collect())
    }

    async fn total_unread(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(unread_count), 0)::BIGINT
            FROM conversation_participants
            WHERE user_id = $1
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        count_to_u64(total)
    }
}

#[derive(Clone)]
pub struct PgReactionRepository {
    pool: PgPool,
}

impl PgReactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count_with<'e, E>(executor: E, subject: SubjectRef) -> Result<u64, RepositoryError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM reactions WHERE subject_kind = $1 AND subject_id = $2",
        )
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .fetch_one(executor)
        .await
        .map_err(map_sqlx_err)?;
        count_to_u64(count)
    }

    async fn delete_reaction(
        tx: &mut Transaction<'static, Postgres>,
        subject: SubjectRef,
        user_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM reactions WHERE subject_kind = $1 AND subject_id = $2 AND user_id = $3",
        )
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .bind(Uuid::from(user_id))
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ReactionRepository for PgReactionRepository {
    async fn find_subject(
        &self,
        subject: SubjectRef,
    ) -> Result<Option<Reactable>, RepositoryError> {
        let sql = match subject.kind {
            SubjectKind::Discussion => {
                r#"
                SELECT d.id AS subject_id, d.author_id, d.id AS discussion_id, d.title AS discussion_title
                FROM discussions d
                WHERE d.id = $1
                "#
            }
            SubjectKind::Reply => {
                r#"
                SELECT r.id AS subject_id, r.author_id, d.id AS discussion_id, d.title AS discussion_title
                FROM replies r
                JOIN discussions d ON d.id = r.discussion_id
                WHERE r.id = $1
                "#
            }
        };

        let record = sqlx::query_as::<_, ReactableRecord>(sql)
            .bind(subject.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(record.map(|record| record.into_reactable(subject.kind)))
    }

    async fn toggle(
        &self,
        subject: SubjectRef,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<ReactionToggle, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let exists_sql = match subject.kind {
            SubjectKind::Discussion => "SELECT EXISTS (SELECT 1 FROM discussions WHERE id = $1)",
            SubjectKind::Reply => "SELECT EXISTS (SELECT 1 FROM replies WHERE id = $1)",
        };
        let exists = sqlx::query_scalar::<_, bool>(exists_sql)
            .bind(subject.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if !exists {
            return Err(RepositoryError::Rejected(DomainError::SubjectNotFound));
        }

        let reacted = if Self::delete_reaction(&mut tx, subject, user_id).await? > 0 {
            false
        } else {
            let inserted = sqlx::query(
                r#"
                INSERT INTO reactions (subject_kind, subject_id, user_id, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(subject.kind.as_str())
            .bind(subject.id)
            .bind(Uuid::from(user_id))
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

            if inserted.rows_affected() == 1 {
                true
            } else {
                // 同一用户的并发切换先提交了插入，本次切换应当撤销它
                Self::delete_reaction(&mut tx, subject, user_id).await?;
                false
            }
        };

        let count = Self::count_with(&mut *tx, subject).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(ReactionToggle { reacted, count })
    }

    async fn count(&self, subject: SubjectRef) -> Result<u64, RepositoryError> {
        Self::count_with(&self.pool, subject).await
    }

    async fn has_reacted(
        &self,
        subject: SubjectRef,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reactions
                WHERE subject_kind = $1 AND subject_id = $2 AND user_id = $3
            )
            "#,
        )
        .bind(subject.kind.as_str())
        .bind(subject.id)
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }
}

#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_one(
        &self,
        id: NotificationId,
        assignment: &str,
    ) -> Result<Notification, RepositoryError> {
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            "UPDATE notifications SET {assignment} WHERE id = $1 RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;
        Notification::try_from(record)
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert_unless_outstanding(
        &self,
        notification: Notification,
    ) -> Result<Option<Notification>, RepositoryError> {
        // 部分唯一索引保证同一去重键最多一条未处理通知
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            r#"
            INSERT INTO notifications ({NOTIFICATION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE, $7)
            ON CONFLICT (user_id, kind, link) WHERE NOT is_read AND NOT is_dismissed
            DO NOTHING
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(Uuid::from(notification.id))
        .bind(Uuid::from(notification.recipient_id))
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(&notification.link)
        .bind(notification.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Notification::try_from).transpose()
    }

    async fn find_by_id(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        let record = sqlx::query_as::<_, NotificationRecord>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        record.map(Notification::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError> {
        let records = sqlx::query_as::<_, NotificationRecord>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        records.into_iter().map(Notification::try_from).collect()
    }

    async fn mark_read(&self, id: NotificationId) -> Result<Notification, RepositoryError> {
        self.update_one(id, "is_read = TRUE").await
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
                .bind(Uuid::from(user_id))
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn dismiss(&self, id: NotificationId) -> Result<Notification, RepositoryError> {
        self.update_one(id, "is_dismissed = TRUE").await
    }

    async fn count_unread(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
        )
        .bind(Uuid::from(user_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        count_to_u64(count)
    }
}

/// 论坛内容由外部 CRUD 层写入；这里只提供同步和测试用的写入口
#[derive(Clone)]
pub struct PgForumWriter {
    pool: PgPool,
}

impl PgForumWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_discussion(&self, discussion: &Discussion) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO discussions (id, author_id, title, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::from(discussion.id))
        .bind(Uuid::from(discussion.author_id))
        .bind(&discussion.title)
        .bind(discussion.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    pub async fn insert_reply(&self, reply: &Reply) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO replies (id, discussion_id, author_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::from(reply.id))
        .bind(Uuid::from(reply.discussion_id))
        .bind(Uuid::from(reply.author_id))
        .bind(&reply.content)
        .bind(reply.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub conversation_repository: Arc<PgConversationRepository>,
    pub reaction_repository: Arc<PgReactionRepository>,
    pub notification_repository: Arc<PgNotificationRepository>,
    pub forum_writer: Arc<PgForumWriter>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            conversation_repository: Arc::new(PgConversationRepository::new(pool.clone())),
            reaction_repository: Arc::new(PgReactionRepository::new(pool.clone())),
            notification_repository: Arc::new(PgNotificationRepository::new(pool.clone())),
            forum_writer: Arc::new(PgForumWriter::new(pool.clone())),
            pool,
        }
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
