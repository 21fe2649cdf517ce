mod conversation_service;
mod notification_service;
mod reaction_service;
mod unread_tracker;

use domain::{Capability, DomainError, User, UserId};

use crate::{error::ApplicationError, repository::UserRepository};

pub use conversation_service::{
    ConversationService, ConversationServiceDependencies, SendMessageRequest,
    StartConversationRequest,
};
pub use notification_service::{DispatchOutcome, NotificationDispatcher, NotificationService};
pub use reaction_service::{
    NotificationEffect, ReactionOutcome, ReactionService, ReactionServiceDependencies,
    ReactionState, ToggleReactionRequest,
};
pub use unread_tracker::UnreadTracker;

pub(crate) async fn load_user(
    repository: &dyn UserRepository,
    user_id: UserId,
) -> Result<User, ApplicationError> {
    repository
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| DomainError::UserNotFound.into())
}

// 角色能力检查
pub(crate) fn authorize(user: &User, capability: Capability) -> Result<(), ApplicationError> {
    if user.role.can(capability) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %user.id,
        role = %user.role,
        capability = ?capability,
        "角色缺少所需能力"
    );
    Err(ApplicationError::Authorization)
}
