//! BlueZone 私信与通知核心领域模型
//!
//! 包含用户、会话、消息、点赞、通知等实体以及实时事件定义。

pub mod conversation;
pub mod errors;
pub mod events;
pub mod forum;
pub mod message;
pub mod notification;
pub mod reaction;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use conversation::{
    Conversation, ConversationDetail, ConversationState, ConversationSummary, LeaveOutcome,
    Participant, ParticipantPair, ParticipantView,
};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use events::{RealtimeEvent, TypingPayload};
pub use forum::{Discussion, Reply};
pub use message::Message;
pub use notification::{Notification, NotificationDraft, NotificationKind};
pub use reaction::{Reactable, ReactionToggle, SubjectKind, SubjectRef};
pub use user::{Capability, User, UserRole, UserSummary};
pub use value_objects::{
    ConnectionId, ConversationId, DiscussionId, MessageContent, MessageId, NotificationId,
    ReplyId, Timestamp, UserEmail, UserId, MAX_MESSAGE_LENGTH,
};
