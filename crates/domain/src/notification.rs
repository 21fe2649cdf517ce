//! 通知实体定义

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{NotificationId, Timestamp, UserId};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    DiscussionLike,
    ReplyLike,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Message => "message",
            NotificationKind::DiscussionLike => "discussion_like",
            NotificationKind::ReplyLike => "reply_like",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "message" => Ok(NotificationKind::Message),
            "discussion_like" => Ok(NotificationKind::DiscussionLike),
            "reply_like" => Ok(NotificationKind::ReplyLike),
            other => Err(DomainError::invalid_argument(
                "notification_kind",
                format!("unknown notification kind '{other}'"),
            )),
        }
    }
}

/// 待分发的通知：(接收者, 类型, 标题, 内容, 链接)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub link: String,
}

impl NotificationDraft {
    pub fn new(
        recipient_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        content: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            kind,
            title: title.into(),
            content: content.into(),
            link: link.into(),
        }
    }

    pub fn into_notification(self, id: NotificationId, now: Timestamp) -> Notification {
        Notification {
            id,
            recipient_id: self.recipient_id,
            kind: self.kind,
            title: self.title,
            content: self.content,
            link: self.link,
            read: false,
            dismissed: false,
            created_at: now,
        }
    }
}

/// 通知实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub link: String,
    pub read: bool,
    pub dismissed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl Notification {
    /// 未读且未忽略的通知会阻止同一 (接收者, 类型, 链接) 的新通知。
    pub fn is_outstanding(&self) -> bool {
        !self.read && !self.dismissed
    }

    /// 去重键是否相同
    pub fn same_key(&self, recipient_id: UserId, kind: NotificationKind, link: &str) -> bool {
        self.recipient_id == recipient_id && self.kind == kind && self.link == link
    }

    pub fn mark_read(&mut self) {
        self.read = true;
    }

    pub fn dismiss(&mut self) {
        self.dismissed = true;
    }
}
