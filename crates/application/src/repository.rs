//! 持久化网关接口
//!
//! 组合操作（`register_or_reuse`、`append_message`、`mark_read`、`toggle`、`leave`）
//! 必须在单个事务内完成；业务规则失败以 `RepositoryError::Rejected` 返回且不留下任何副作用。

use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, LeaveOutcome, Message, Notification, NotificationId,
    Participant, ParticipantPair, Reactable, ReactionToggle, RepositoryError, SubjectRef,
    Timestamp, User, UserId,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// 查找参与者恰好为该用户对的会话；不存在时以 `candidate` 创建会话和两条参与者记录。
    /// 同一用户对的并发调用必须返回同一个会话。
    async fn register_or_reuse(
        &self,
        pair: ParticipantPair,
        candidate: Conversation,
    ) -> Result<Conversation, RepositoryError>;

    /// 写入消息并为其他参与者未读数加一，返回带序号的消息。
    /// 发送者不是参与者时返回 `Rejected(NotAParticipant)`。
    async fn append_message(&self, message: Message) -> Result<Message, RepositoryError>;

    /// 清零未读数、记录阅读时间，并把他人发送的消息标记为已读。
    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<(), RepositoryError>;

    /// 删除参与者记录；没有剩余参与者时连同消息一起删除会话。
    async fn leave(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<LeaveOutcome, RepositoryError>;

    async fn find_by_id(&self, id: ConversationId)
        -> Result<Option<Conversation>, RepositoryError>;

    async fn find_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError>;

    async fn list_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError>;

    /// 按插入顺序返回全部消息
    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn last_message(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError>;

    /// 用户的全部会话，按最后活跃时间倒序
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError>;

    /// 用户所有会话未读数之和
    async fn total_unread(&self, user_id: UserId) -> Result<u64, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReactionRepository: Send + Sync {
    async fn find_subject(&self, subject: SubjectRef)
        -> Result<Option<Reactable>, RepositoryError>;

    /// 存在则删除、不存在则插入，并在同一事务内重新统计数量。
    async fn toggle(
        &self,
        subject: SubjectRef,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<ReactionToggle, RepositoryError>;

    async fn count(&self, subject: SubjectRef) -> Result<u64, RepositoryError>;

    async fn has_reacted(&self, subject: SubjectRef, user_id: UserId)
        -> Result<bool, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// 同一 (接收者, 类型, 链接) 已有未读未忽略通知时不写入并返回 `None`。
    /// 检查和写入是原子的。
    async fn insert_unless_outstanding(
        &self,
        notification: Notification,
    ) -> Result<Option<Notification>, RepositoryError>;

    async fn find_by_id(&self, id: NotificationId)
        -> Result<Option<Notification>, RepositoryError>;

    /// 最新的在前
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError>;

    async fn mark_read(&self, id: NotificationId) -> Result<Notification, RepositoryError>;

    async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError>;

    async fn dismiss(&self, id: NotificationId) -> Result<Notification, RepositoryError>;

    async fn count_unread(&self, user_id: UserId) -> Result<u64, RepositoryError>;
}
