//! 领域模型错误定义
//!
//! 每一种错误都可以被调用方（API 层）区分，核心本身不负责格式化面向用户的文案。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 发送者 / 操作者不是会话参与者
    #[error("user is not a participant of the conversation")]
    NotAParticipant,

    /// 试图给自己发消息
    #[error("cannot start a conversation with yourself")]
    InvalidRecipient,

    /// 点赞或通知的目标不存在
    #[error("subject not found")]
    SubjectNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("notification not found")]
    NotificationNotFound,

    /// 参数校验失败
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 持久化网关错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突
    #[error("record conflict")]
    Conflict,

    /// 事务内的业务校验失败，事务已回滚
    #[error("rejected: {0}")]
    Rejected(DomainError),

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
