use std::sync::Arc;

use domain::{
    DomainError, Notification, NotificationDraft, NotificationId, RealtimeEvent, RepositoryError,
    UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    realtime::UserEventSink,
    repository::NotificationRepository,
};

/// 一次分发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 已写入；`delivered` 为实时推送到达的连接数，0 表示接收者不在线
    Created {
        notification: Notification,
        delivered: usize,
    },
    /// 接收者已有相同 (类型, 链接) 的未处理通知
    DuplicateSuppressed,
}

impl DispatchOutcome {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            DispatchOutcome::Created { notification, .. } => Some(notification),
            DispatchOutcome::DuplicateSuppressed => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, DispatchOutcome::DuplicateSuppressed)
    }
}

/// 通知分发器：去重、持久化、实时推送。
pub struct NotificationDispatcher {
    notification_repository: Arc<dyn NotificationRepository>,
    sink: Arc<dyn UserEventSink>,
    clock: Arc<dyn Clock>,
}

impl NotificationDispatcher {
    pub fn new(
        notification_repository: Arc<dyn NotificationRepository>,
        sink: Arc<dyn UserEventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notification_repository,
            sink,
            clock,
        }
    }

    pub async fn dispatch(
        &self,
        draft: NotificationDraft,
    ) -> Result<DispatchOutcome, ApplicationError> {
        let recipient_id = draft.recipient_id;
        let kind = draft.kind;
        let candidate = draft.into_notification(NotificationId::generate(), self.clock.now());

        let Some(notification) = self
            .notification_repository
            .insert_unless_outstanding(candidate)
            .await?
        else {
            tracing::debug!(
                recipient_id = %recipient_id,
                kind = %kind,
                "存在未处理的同类通知，跳过"
            );
            return Ok(DispatchOutcome::DuplicateSuppressed);
        };

        let delivered = self.sink.deliver_to_user(
            recipient_id,
            RealtimeEvent::NotificationNew {
                notification: notification.clone(),
            },
        );
        tracing::info!(
            notification_id = %notification.id,
            recipient_id = %recipient_id,
            kind = %kind,
            delivered,
            "通知已创建"
        );

        Ok(DispatchOutcome::Created {
            notification,
            delivered,
        })
    }
}

/// 收件人对自己通知的查询和处理
pub struct NotificationService {
    notification_repository: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(notification_repository: Arc<dyn NotificationRepository>) -> Self {
        Self {
            notification_repository,
        }
    }

    pub async fn list(&self, user_id: UserId) -> Result<Vec<Notification>, ApplicationError> {
        Ok(self.notification_repository.list_for_user(user_id).await?)
    }

    pub async fn unread_count(&self, user_id: UserId) -> Result<u64, ApplicationError> {
        Ok(self.notification_repository.count_unread(user_id).await?)
    }

    pub async fn mark_read(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<Notification, ApplicationError> {
        self.ensure_owned(notification_id, user_id).await?;
        self.notification_repository
            .mark_read(notification_id)
            .await
            .map_err(not_found_as_domain)
    }

    pub async fn mark_all_read(&self, user_id: UserId) -> Result<u64, ApplicationError> {
        let updated = self.notification_repository.mark_all_read(user_id).await?;
        tracing::debug!(user_id = %user_id, updated, "全部通知已读");
        Ok(updated)
    }

    pub async fn dismiss(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<Notification, ApplicationError> {
        self.ensure_owned(notification_id, user_id).await?;
        self.notification_repository
            .dismiss(notification_id)
            .await
            .map_err(not_found_as_domain)
    }

    // 他人的通知按不存在处理
    async fn ensure_owned(
        &self,
        notification_id: NotificationId,
        user_id: UserId,
    ) -> Result<(), ApplicationError> {
        let notification = self
            .notification_repository
            .find_by_id(notification_id)
            .await?
            .ok_or(DomainError::NotificationNotFound)?;
        if notification.recipient_id != user_id {
            return Err(DomainError::NotificationNotFound.into());
        }
        Ok(())
    }
}

fn not_found_as_domain(err: RepositoryError) -> ApplicationError {
    match err {
        RepositoryError::NotFound => DomainError::NotificationNotFound.into(),
        other => other.into(),
    }
}
