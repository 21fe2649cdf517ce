use std::sync::Arc;

use domain::{
    Capability, DomainError, Notification, NotificationDraft, Reactable, SubjectKind, SubjectRef,
    User, UserId,
};
use serde::Serialize;

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{ReactionRepository, UserRepository},
    services::{
        authorize, load_user,
        notification_service::{DispatchOutcome, NotificationDispatcher},
    },
};

#[derive(Debug, Clone)]
pub struct ToggleReactionRequest {
    pub subject: SubjectRef,
    pub user_id: UserId,
}

/// 点赞后的通知处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEffect {
    /// 取消点赞或给自己点赞
    NotRequested,
    Created(Notification),
    DuplicateSuppressed,
    /// 通知失败不回滚点赞
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionOutcome {
    pub reacted: bool,
    pub count: u64,
    pub notification: NotificationEffect,
}

/// 点赞状态，供讨论详情等读取场景使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionState {
    pub count: u64,
    pub reacted_by_viewer: bool,
}

pub struct ReactionServiceDependencies {
    pub reaction_repository: Arc<dyn ReactionRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
}

pub struct ReactionService {
    deps: ReactionServiceDependencies,
}

impl ReactionService {
    pub fn new(deps: ReactionServiceDependencies) -> Self {
        Self { deps }
    }

    /// 切换点赞。新点赞且点赞者不是作者时通知作者。
    pub async fn toggle(
        &self,
        request: ToggleReactionRequest,
    ) -> Result<ReactionOutcome, ApplicationError> {
        let liker = load_user(self.deps.user_repository.as_ref(), request.user_id).await?;
        authorize(&liker, Capability::React)?;

        let reactable = self
            .deps
            .reaction_repository
            .find_subject(request.subject)
            .await?
            .ok_or(DomainError::SubjectNotFound)?;

        let toggle = self
            .deps
            .reaction_repository
            .toggle(request.subject, liker.id, self.deps.clock.now())
            .await?;

        tracing::info!(
            subject_kind = %request.subject.kind,
            subject_id = %request.subject.id,
            user_id = %liker.id,
            reacted = toggle.reacted,
            count = toggle.count,
            "点赞状态已切换"
        );

        let notification = if toggle.reacted && !reactable.is_authored_by(liker.id) {
            self.notify_author(&reactable, &liker).await
        } else {
            NotificationEffect::NotRequested
        };

        Ok(ReactionOutcome {
            reacted: toggle.reacted,
            count: toggle.count,
            notification,
        })
    }

    pub async fn state(
        &self,
        subject: SubjectRef,
        viewer: Option<UserId>,
    ) -> Result<ReactionState, ApplicationError> {
        let repository = &self.deps.reaction_repository;
        repository
            .find_subject(subject)
            .await?
            .ok_or(DomainError::SubjectNotFound)?;

        let count = repository.count(subject).await?;
        let reacted_by_viewer = match viewer {
            Some(user_id) => repository.has_reacted(subject, user_id).await?,
            None => false,
        };
        Ok(ReactionState {
            count,
            reacted_by_viewer,
        })
    }

    async fn notify_author(&self, reactable: &Reactable, liker: &User) -> NotificationEffect {
        match self.deps.dispatcher.dispatch(like_notification(reactable, liker)).await {
            Ok(DispatchOutcome::Created { notification, .. }) => {
                NotificationEffect::Created(notification)
            }
            Ok(DispatchOutcome::DuplicateSuppressed) => NotificationEffect::DuplicateSuppressed,
            Err(err) => {
                tracing::warn!(
                    subject_id = %reactable.subject.id,
                    author_id = %reactable.author_id,
                    error = %err,
                    "点赞通知创建失败"
                );
                NotificationEffect::Failed(err.to_string())
            }
        }
    }
}

fn like_notification(reactable: &Reactable, liker: &User) -> NotificationDraft {
    let name = display_name(liker);
    let (title, content) = match reactable.subject.kind {
        SubjectKind::Discussion => (
            "Your discussion was liked",
            format!(
                "{name} liked your discussion \"{}\"",
                reactable.discussion_title
            ),
        ),
        SubjectKind::Reply => ("Your reply was liked", format!("{name} liked your reply")),
    };
    NotificationDraft::new(
        reactable.author_id,
        reactable.subject.kind.notification_kind(),
        title,
        content,
        reactable.link(),
    )
}

fn display_name(user: &User) -> &str {
    let name = user.name.trim();
    if name.is_empty() {
        "Someone"
    } else {
        name
    }
}
