use std::sync::Arc;

use domain::{
    Capability, Conversation, ConversationDetail, ConversationId, ConversationSummary,
    DomainError, LeaveOutcome, Message, MessageContent, MessageId, NotificationDraft,
    NotificationKind, Participant, ParticipantPair, ParticipantView, RealtimeEvent, User, UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    realtime::UserEventSink,
    repository::{ConversationRepository, UserRepository},
    services::{authorize, load_user, notification_service::NotificationDispatcher},
};

#[derive(Debug, Clone)]
pub struct StartConversationRequest {
    pub requester_id: UserId,
    pub recipient_id: UserId,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
}

pub struct ConversationServiceDependencies {
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub sink: Arc<dyn UserEventSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 打开与某个用户的私信会话；已存在时直接复用。
    pub async fn start_conversation(
        &self,
        request: StartConversationRequest,
    ) -> Result<Conversation, ApplicationError> {
        // 自己给自己发消息在访问存储前就拒绝
        let pair = ParticipantPair::new(request.requester_id, request.recipient_id)?;

        let requester = load_user(self.deps.user_repository.as_ref(), request.requester_id).await?;
        authorize(&requester, Capability::SendMessages)?;
        load_user(self.deps.user_repository.as_ref(), request.recipient_id).await?;

        let candidate = Conversation::new(ConversationId::generate(), self.deps.clock.now());
        let candidate_id = candidate.id;
        let conversation = self
            .deps
            .conversation_repository
            .register_or_reuse(pair, candidate)
            .await?;

        if conversation.id == candidate_id {
            tracing::info!(
                conversation_id = %conversation.id,
                requester_id = %request.requester_id,
                recipient_id = %request.recipient_id,
                "创建私信会话"
            );
        } else {
            tracing::debug!(conversation_id = %conversation.id, "复用已有私信会话");
        }
        Ok(conversation)
    }

    /// 发送消息。写入成功后在后台任务里向其他参与者推送 `message:new`
    /// 并生成消息通知；推送或通知失败只记录日志，不影响发送结果。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        let content = MessageContent::new(request.content)?;

        let sender = load_user(self.deps.user_repository.as_ref(), request.sender_id).await?;
        authorize(&sender, Capability::SendMessages)?;

        let message = Message::new(
            MessageId::generate(),
            request.conversation_id,
            sender.id,
            content,
            self.deps.clock.now(),
        );
        let stored = self
            .deps
            .conversation_repository
            .append_message(message)
            .await?;

        tracing::info!(
            conversation_id = %stored.conversation_id,
            message_id = %stored.id,
            sender_id = %sender.id,
            sequence = stored.sequence,
            "消息已写入"
        );

        let fan_out = MessageFanOut {
            conversation_repository: Arc::clone(&self.deps.conversation_repository),
            dispatcher: Arc::clone(&self.deps.dispatcher),
            sink: Arc::clone(&self.deps.sink),
        };
        tokio::spawn(fan_out.run(stored.clone(), sender));
        Ok(stored)
    }

    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<(), ApplicationError> {
        self.deps
            .conversation_repository
            .mark_read(conversation_id, user_id, self.deps.clock.now())
            .await?;
        tracing::debug!(conversation_id = %conversation_id, user_id = %user_id, "会话已读");
        Ok(())
    }

    pub async fn leave_conversation(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<LeaveOutcome, ApplicationError> {
        let outcome = self
            .deps
            .conversation_repository
            .leave(conversation_id, user_id)
            .await?;

        tracing::info!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            conversation_deleted = outcome.conversation_deleted,
            "用户离开会话"
        );
        Ok(outcome)
    }

    /// 会话详情，仅参与者可见
    pub async fn get_conversation(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<ConversationDetail, ApplicationError> {
        let repository = &self.deps.conversation_repository;
        repository
            .find_participant(conversation_id, user_id)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;
        let conversation = repository
            .find_by_id(conversation_id)
            .await?
            .ok_or(DomainError::ConversationNotFound)?;

        let participants = repository.list_participants(conversation_id).await?;
        let messages = repository.list_messages(conversation_id).await?;

        Ok(ConversationDetail {
            conversation,
            participants: self.participant_views(participants).await?,
            messages,
        })
    }

    pub async fn list_conversations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationSummary>, ApplicationError> {
        let repository = &self.deps.conversation_repository;
        let conversations = repository.list_for_user(user_id).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let participants = repository.list_participants(conversation.id).await?;
            let unread_count = participants
                .iter()
                .find(|p| p.user_id == user_id)
                .map(|p| p.unread_count)
                .unwrap_or(0);
            let last_message = repository.last_message(conversation.id).await?;

            summaries.push(ConversationSummary {
                conversation,
                participants: self.participant_views(participants).await?,
                unread_count,
                last_message,
            });
        }
        Ok(summaries)
    }

    async fn participant_views(
        &self,
        participants: Vec<Participant>,
    ) -> Result<Vec<ParticipantView>, ApplicationError> {
        let mut views = Vec::with_capacity(participants.len());
        for participant in participants {
            let user = self
                .deps
                .user_repository
                .find_by_id(participant.user_id)
                .await?
                .map(|user| user.summary());
            views.push(ParticipantView { participant, user });
        }
        Ok(views)
    }
}

/// 消息提交后的推送与通知，运行在独立任务里
struct MessageFanOut {
    conversation_repository: Arc<dyn ConversationRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    sink: Arc<dyn UserEventSink>,
}

impl MessageFanOut {
    async fn run(self, message: Message, sender: User) {
        let participants = match self
            .conversation_repository
            .list_participants(message.conversation_id)
            .await
        {
            Ok(participants) => participants,
            Err(err) => {
                tracing::warn!(
                    conversation_id = %message.conversation_id,
                    error = %err,
                    "读取参与者失败，跳过推送"
                );
                return;
            }
        };

        for recipient in participants.iter().filter(|p| p.user_id != sender.id) {
            let delivered = self.sink.deliver_to_user(
                recipient.user_id,
                RealtimeEvent::MessageNew {
                    message: message.clone(),
                    sender: sender.summary(),
                },
            );
            tracing::debug!(recipient_id = %recipient.user_id, delivered, "推送新消息");

            if let Err(err) = self
                .dispatcher
                .dispatch(message_notification(&message, &sender, recipient.user_id))
                .await
            {
                tracing::warn!(
                    conversation_id = %message.conversation_id,
                    recipient_id = %recipient.user_id,
                    error = %err,
                    "消息通知创建失败"
                );
            }
        }
    }
}

/// 同一会话在接收者读完之前只保留一条消息通知
fn message_notification(message: &Message, sender: &User, recipient_id: UserId) -> NotificationDraft {
    NotificationDraft::new(
        recipient_id,
        NotificationKind::Message,
        "New Message",
        format!("New message from {}", sender.name),
        format!("/messages/{}", message.conversation_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::realtime::MockUserEventSink;
    use crate::repository::{
        MockConversationRepository, MockNotificationRepository, MockUserRepository,
    };
    use domain::{UserEmail, UserRole};

    fn user(role: UserRole) -> User {
        let id = UserId::generate();
        User::new(
            id,
            UserEmail::parse(format!("{id}@bluezone.test")).unwrap(),
            "Test",
            role,
            time::OffsetDateTime::now_utc(),
        )
    }

    fn service(
        conversations: MockConversationRepository,
        users: MockUserRepository,
    ) -> ConversationService {
        let dispatcher = NotificationDispatcher::new(
            Arc::new(MockNotificationRepository::new()),
            Arc::new(MockUserEventSink::new()),
            Arc::new(SystemClock),
        );
        ConversationService::new(ConversationServiceDependencies {
            conversation_repository: Arc::new(conversations),
            user_repository: Arc::new(users),
            dispatcher: Arc::new(dispatcher),
            sink: Arc::new(MockUserEventSink::new()),
            clock: Arc::new(SystemClock),
        })
    }

    #[tokio::test]
    async fn messaging_yourself_is_rejected_before_storage() {
        let mut conversations = MockConversationRepository::new();
        conversations.expect_register_or_reuse().never();
        let mut users = MockUserRepository::new();
        users.expect_find_by_id().never();

        let me = UserId::generate();
        let err = service(conversations, users)
            .start_conversation(StartConversationRequest {
                requester_id: me,
                recipient_id: me,
            })
            .await
            .unwrap_err();
        assert_eq!(err.domain_kind(), Some(&DomainError::InvalidRecipient));
    }

    #[tokio::test]
    async fn unknown_recipient_is_reported() {
        let requester = user(UserRole::Member);
        let requester_id = requester.id;
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(move |id| Ok((id == requester_id).then(|| requester.clone())));
        let mut conversations = MockConversationRepository::new();
        conversations.expect_register_or_reuse().never();

        let err = service(conversations, users)
            .start_conversation(StartConversationRequest {
                requester_id,
                recipient_id: UserId::generate(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.domain_kind(), Some(&DomainError::UserNotFound));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let mut conversations = MockConversationRepository::new();
        conversations.expect_append_message().never();

        let err = service(conversations, MockUserRepository::new())
            .send_message(SendMessageRequest {
                conversation_id: ConversationId::generate(),
                sender_id: UserId::generate(),
                content: "   ".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain_kind(),
            Some(DomainError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn message_notification_links_to_conversation() {
        let sender = user(UserRole::Company);
        let message = Message::new(
            MessageId::generate(),
            ConversationId::generate(),
            sender.id,
            MessageContent::new("hi").unwrap(),
            time::OffsetDateTime::now_utc(),
        );
        let draft = message_notification(&message, &sender, UserId::generate());
        assert_eq!(draft.kind, NotificationKind::Message);
        assert_eq!(draft.title, "New Message");
        assert_eq!(draft.content, "New message from Test");
        assert_eq!(draft.link, format!("/messages/{}", message.conversation_id));
    }
}
