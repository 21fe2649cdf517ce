use std::sync::Arc;

use domain::{ConversationId, UserId};

use crate::{error::ApplicationError, repository::ConversationRepository};

/// 未读计数查询。计数本身由发送和标记已读的事务维护。
pub struct UnreadTracker {
    conversation_repository: Arc<dyn ConversationRepository>,
}

impl UnreadTracker {
    pub fn new(conversation_repository: Arc<dyn ConversationRepository>) -> Self {
        Self {
            conversation_repository,
        }
    }

    /// 用户所有会话的未读数之和
    pub async fn total_unread(&self, user_id: UserId) -> Result<u64, ApplicationError> {
        Ok(self.conversation_repository.total_unread(user_id).await?)
    }

    /// 单个会话的未读数；非参与者按 0 处理
    pub async fn conversation_unread(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<u32, ApplicationError> {
        Ok(self
            .conversation_repository
            .find_participant(conversation_id, user_id)
            .await?
            .map(|participant| participant.unread_count)
            .unwrap_or(0))
    }
}
