use serde::{Deserialize, Serialize};

use crate::value_objects::{ConversationId, MessageContent, MessageId, Timestamp, UserId};

/// 私信消息，创建后不可修改（`read` 标记除外）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: MessageContent,
    /// 会话内严格递增的插入序号，由持久化网关分配
    pub sequence: i64,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl Message {
    /// 待持久化的新消息，序号在写入时确定。
    pub fn new(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            conversation_id,
            sender_id,
            content,
            sequence: 0,
            read: false,
            created_at,
        }
    }

    pub fn is_from(&self, user_id: UserId) -> bool {
        self.sender_id == user_id
    }
}
