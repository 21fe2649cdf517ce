//! 内存实现的持久化网关
//!
//! 所有表放在同一把锁后面，组合操作天然是原子的。用于测试装配。

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use domain::{
    Conversation, ConversationId, Discussion, DomainError, LeaveOutcome, Message, Notification,
    NotificationId, Participant, ParticipantPair, Reactable, ReactionToggle, Reply,
    RepositoryError, SubjectKind, SubjectRef, Timestamp, User, UserId,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::repository::{
    ConversationRepository, NotificationRepository, ReactionRepository, UserRepository,
};

struct ConversationRow {
    conversation: Conversation,
    /// 两个参与者都在时才占用该用户对
    pair: Option<ParticipantPair>,
    next_sequence: i64,
}

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    discussions: HashMap<Uuid, Discussion>,
    replies: HashMap<Uuid, Reply>,
    conversations: HashMap<ConversationId, ConversationRow>,
    pairs: HashMap<ParticipantPair, ConversationId>,
    participants: BTreeMap<(ConversationId, UserId), Participant>,
    messages: HashMap<ConversationId, Vec<Message>>,
    reactions: HashSet<(SubjectRef, UserId)>,
    notifications: Vec<Notification>,
}

impl State {
    fn participants_of(&self, conversation_id: ConversationId) -> Vec<Participant> {
        self.participants
            .range((conversation_id, UserId::new(Uuid::nil()))..)
            .take_while(|((id, _), _)| *id == conversation_id)
            .map(|(_, participant)| participant.clone())
            .collect()
    }

    fn reaction_count(&self, subject: SubjectRef) -> u64 {
        self.reactions
            .iter()
            .filter(|(reacted, _)| *reacted == subject)
            .count() as u64
    }

    fn notification_mut(&mut self, id: NotificationId) -> Option<&mut Notification> {
        self.notifications.iter_mut().find(|n| n.id == id)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_discussion(&self, discussion: Discussion) {
        self.state
            .lock()
            .await
            .discussions
            .insert(discussion.id.into(), discussion);
    }

    pub async fn insert_reply(&self, reply: Reply) {
        self.state.lock().await.replies.insert(reply.id.into(), reply);
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    /// 会话销毁后为 0
    pub async fn message_count(&self, conversation_id: ConversationId) -> usize {
        self.state
            .lock()
            .await
            .messages
            .get(&conversation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn notifications_for(&self, user_id: UserId) -> Vec<Notification> {
        self.state
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.recipient_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn register_or_reuse(
        &self,
        pair: ParticipantPair,
        candidate: Conversation,
    ) -> Result<Conversation, RepositoryError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.pairs.get(&pair).copied() {
            if let Some(row) = state.conversations.get(&existing) {
                return Ok(row.conversation.clone());
            }
        }

        for user_id in pair.members() {
            if !state.users.contains_key(&user_id) {
                return Err(RepositoryError::Rejected(DomainError::UserNotFound));
            }
        }

        let id = candidate.id;
        for user_id in pair.members() {
            state.participants.insert(
                (id, user_id),
                Participant::new(id, user_id, candidate.created_at),
            );
        }
        state.pairs.insert(pair, id);
        state.conversations.insert(
            id,
            ConversationRow {
                conversation: candidate.clone(),
                pair: Some(pair),
                next_sequence: 1,
            },
        );
        Ok(candidate)
    }

    async fn append_message(&self, mut message: Message) -> Result<Message, RepositoryError> {
        let mut state = self.state.lock().await;
        let conversation_id = message.conversation_id;

        if !state
            .participants
            .contains_key(&(conversation_id, message.sender_id))
        {
            return Err(RepositoryError::Rejected(DomainError::NotAParticipant));
        }

        let row = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or(RepositoryError::Rejected(DomainError::NotAParticipant))?;
        message.sequence = row.next_sequence;
        row.next_sequence += 1;
        row.conversation.updated_at = message.created_at;

        for ((id, user_id), participant) in state.participants.iter_mut() {
            if *id == conversation_id && *user_id != message.sender_id {
                participant.record_incoming();
            }
        }

        state
            .messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn mark_read(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let participant = state
            .participants
            .get_mut(&(conversation_id, user_id))
            .ok_or(RepositoryError::Rejected(DomainError::NotAParticipant))?;
        participant.mark_read(at);

        if let Some(messages) = state.messages.get_mut(&conversation_id) {
            for message in messages.iter_mut().filter(|m| !m.is_from(user_id)) {
                message.read = true;
            }
        }
        Ok(())
    }

    async fn leave(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<LeaveOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        if state
            .participants
            .remove(&(conversation_id, user_id))
            .is_none()
        {
            return Err(RepositoryError::Rejected(DomainError::NotAParticipant));
        }

        let remaining = state.participants_of(conversation_id).len();
        let released = state
            .conversations
            .get_mut(&conversation_id)
            .and_then(|row| row.pair.take());
        if let Some(pair) = released {
            state.pairs.remove(&pair);
        }

        let outcome = LeaveOutcome::new(remaining);
        if outcome.conversation_deleted {
            state.messages.remove(&conversation_id);
            state.conversations.remove(&conversation_id);
        }
        Ok(outcome)
    }

    async fn find_by_id(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .conversations
            .get(&id)
            .map(|row| row.conversation.clone()))
    }

    async fn find_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .participants
            .get(&(conversation_id, user_id))
            .cloned())
    }

    async fn list_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Participant>, RepositoryError> {
        Ok(self.state.lock().await.participants_of(conversation_id))
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn last_message(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .messages
            .get(&conversation_id)
            .and_then(|messages| messages.last().cloned()))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let state = self.state.lock().await;
        let mut conversations: Vec<Conversation> = state
            .participants
            .keys()
            .filter(|(_, member)| *member == user_id)
            .filter_map(|(id, _)| state.conversations.get(id))
            .map(|row| row.conversation.clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn total_unread(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .participants
            .iter()
            .filter(|((_, member), _)| *member == user_id)
            .map(|(_, participant)| u64::from(participant.unread_count))
            .sum())
    }
}

#[async_trait]
impl ReactionRepository for InMemoryStore {
    async fn find_subject(
        &self,
        subject: SubjectRef,
    ) -> Result<Option<Reactable>, RepositoryError> {
        let state = self.state.lock().await;
        let reactable = match subject.kind {
            SubjectKind::Discussion => state.discussions.get(&subject.id).map(Discussion::reactable),
            SubjectKind::Reply => state.replies.get(&subject.id).and_then(|reply| {
                state
                    .discussions
                    .get(&Uuid::from(reply.discussion_id))
                    .map(|discussion| reply.reactable(discussion))
            }),
        };
        Ok(reactable)
    }

    async fn toggle(
        &self,
        subject: SubjectRef,
        user_id: UserId,
        _at: Timestamp,
    ) -> Result<ReactionToggle, RepositoryError> {
        let mut state = self.state.lock().await;
        let exists = match subject.kind {
            SubjectKind::Discussion => state.discussions.contains_key(&subject.id),
            SubjectKind::Reply => state.replies.contains_key(&subject.id),
        };
        if !exists {
            return Err(RepositoryError::Rejected(DomainError::SubjectNotFound));
        }

        let key = (subject, user_id);
        let reacted = if state.reactions.remove(&key) {
            false
        } else {
            state.reactions.insert(key);
            true
        };
        Ok(ReactionToggle {
            reacted,
            count: state.reaction_count(subject),
        })
    }

    async fn count(&self, subject: SubjectRef) -> Result<u64, RepositoryError> {
        Ok(self.state.lock().await.reaction_count(subject))
    }

    async fn has_reacted(
        &self,
        subject: SubjectRef,
        user_id: UserId,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .reactions
            .contains(&(subject, user_id)))
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn insert_unless_outstanding(
        &self,
        notification: Notification,
    ) -> Result<Option<Notification>, RepositoryError> {
        let mut state = self.state.lock().await;
        let duplicate = state.notifications.iter().any(|existing| {
            existing.is_outstanding()
                && existing.same_key(notification.recipient_id, notification.kind, &notification.link)
        });
        if duplicate {
            return Ok(None);
        }
        state.notifications.push(notification.clone());
        Ok(Some(notification))
    }

    async fn find_by_id(
        &self,
        id: NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.state.lock().await;
        // 插入顺序即时间顺序，倒序后最新的在前
        Ok(state
            .notifications
            .iter()
            .rev()
            .filter(|n| n.recipient_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: NotificationId) -> Result<Notification, RepositoryError> {
        let mut state = self.state.lock().await;
        let notification = state.notification_mut(id).ok_or(RepositoryError::NotFound)?;
        notification.mark_read();
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.recipient_id == user_id && !n.read)
        {
            notification.mark_read();
            updated += 1;
        }
        Ok(updated)
    }

    async fn dismiss(&self, id: NotificationId) -> Result<Notification, RepositoryError> {
        let mut state = self.state.lock().await;
        let notification = state.notification_mut(id).ok_or(RepositoryError::NotFound)?;
        notification.dismiss();
        Ok(notification.clone())
    }

    async fn count_unread(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .notifications
            .iter()
            .filter(|n| n.recipient_id == user_id && !n.read)
            .count() as u64)
    }
}
