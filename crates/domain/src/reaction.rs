//! 点赞（反应）模型
//!
//! 讨论和回复共用同一套逻辑，用 `SubjectKind` 区分。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::notification::NotificationKind;
use crate::value_objects::{DiscussionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Discussion,
    Reply,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Discussion => "discussion",
            SubjectKind::Reply => "reply",
        }
    }

    /// 被点赞时生成的通知类型
    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            SubjectKind::Discussion => NotificationKind::DiscussionLike,
            SubjectKind::Reply => NotificationKind::ReplyLike,
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "discussion" => Ok(SubjectKind::Discussion),
            "reply" => Ok(SubjectKind::Reply),
            other => Err(DomainError::invalid_argument(
                "subject_kind",
                format!("unknown subject kind '{other}'"),
            )),
        }
    }
}

/// 可点赞对象的引用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: Uuid,
}

impl SubjectRef {
    pub fn new(kind: SubjectKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    pub fn discussion(id: DiscussionId) -> Self {
        Self::new(SubjectKind::Discussion, id.into())
    }

    pub fn reply(id: crate::value_objects::ReplyId) -> Self {
        Self::new(SubjectKind::Reply, id.into())
    }
}

/// 点赞目标的元信息：作者、所属讨论和标题，用于生成通知。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reactable {
    pub subject: SubjectRef,
    pub author_id: UserId,
    pub discussion_id: DiscussionId,
    pub discussion_title: String,
}

impl Reactable {
    /// 通知链接，也是通知去重键的一部分。
    ///
    /// 讨论点赞指向讨论本身；回复点赞以回复为粒度去重，同时仍能跳转到所在讨论。
    pub fn link(&self) -> String {
        match self.subject.kind {
            SubjectKind::Discussion => self.discussion_id.to_string(),
            SubjectKind::Reply => format!("{}#reply-{}", self.discussion_id, self.subject.id),
        }
    }

    pub fn is_authored_by(&self, user_id: UserId) -> bool {
        self.author_id == user_id
    }
}

/// 一次切换后的状态：当前用户是否已点赞，以及最新的点赞数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionToggle {
    pub reacted: bool,
    pub count: u64,
}
