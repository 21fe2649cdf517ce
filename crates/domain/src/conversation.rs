//! 私信会话与参与者
//!
//! 一对一会话由无序用户对唯一确定；最后一个参与者离开时会话被销毁。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::message::Message;
use crate::user::UserSummary;
use crate::value_objects::{ConversationId, Timestamp, UserId};

/// 规范化后的无序用户对，`low < high`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    /// 自己和自己不能组成会话。
    pub fn new(a: UserId, b: UserId) -> Result<Self, DomainError> {
        if a == b {
            return Err(DomainError::InvalidRecipient);
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self { low, high })
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.low == user_id || self.high == user_id
    }

    pub fn members(&self) -> [UserId; 2] {
        [self.low, self.high]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: Timestamp,
}

impl Conversation {
    pub fn new(id: ConversationId, now: Timestamp) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 会话参与者，携带该用户的未读计数和最后阅读时间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub unread_count: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_read_at: Option<Timestamp>,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: Timestamp,
}

impl Participant {
    pub fn new(conversation_id: ConversationId, user_id: UserId, joined_at: Timestamp) -> Self {
        Self {
            conversation_id,
            user_id,
            unread_count: 0,
            last_read_at: None,
            joined_at,
        }
    }

    pub fn record_incoming(&mut self) {
        self.unread_count = self.unread_count.saturating_add(1);
    }

    pub fn mark_read(&mut self, at: Timestamp) {
        self.unread_count = 0;
        self.last_read_at = Some(at);
    }
}

/// 会话生命周期：只有 Active -> Destroyed 一种迁移，且不可逆。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    Active,
    Destroyed,
}

impl ConversationState {
    pub fn from_remaining(remaining_participants: usize) -> Self {
        if remaining_participants == 0 {
            ConversationState::Destroyed
        } else {
            ConversationState::Active
        }
    }
}

/// 离开会话的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveOutcome {
    pub conversation_deleted: bool,
    pub remaining_participants: usize,
}

impl LeaveOutcome {
    pub fn new(remaining_participants: usize) -> Self {
        Self {
            conversation_deleted: ConversationState::from_remaining(remaining_participants)
                == ConversationState::Destroyed,
            remaining_participants,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    #[serde(flatten)]
    pub participant: Participant,
    pub user: Option<UserSummary>,
}

/// 会话列表项：参与者、当前用户未读数、最后一条消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<ParticipantView>,
    pub unread_count: u32,
    pub last_message: Option<Message>,
}

/// 会话详情：参与者和按顺序排列的全部消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<ParticipantView>,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn pair_is_unordered() {
        let a = UserId::from(Uuid::new_v4());
        let b = UserId::from(Uuid::new_v4());
        assert_eq!(
            ParticipantPair::new(a, b).unwrap(),
            ParticipantPair::new(b, a).unwrap()
        );
    }

    #[test]
    fn pair_rejects_self() {
        let a = UserId::from(Uuid::new_v4());
        assert_eq!(ParticipantPair::new(a, a), Err(DomainError::InvalidRecipient));
    }

    #[test]
    fn leave_outcome_reports_destruction() {
        assert!(LeaveOutcome::new(0).conversation_deleted);
        assert!(!LeaveOutcome::new(1).conversation_deleted);
    }
}
