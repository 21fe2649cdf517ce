#![allow(dead_code)]

use std::sync::Arc;

use application::{
    Clock, ConnectionRegistry, ConversationService, ConversationServiceDependencies, InMemoryStore,
    NotificationDispatcher, NotificationService, ReactionService, ReactionServiceDependencies,
    SystemClock, UnreadTracker,
};
use domain::{
    Discussion, DiscussionId, Reply, ReplyId, User, UserEmail, UserId, UserRole,
};
use time::OffsetDateTime;

/// 基于内存存储装配的完整服务集合
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub conversations: ConversationService,
    pub reactions: ReactionService,
    pub notifications: NotificationService,
    pub unread: UnreadTracker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            registry.clone(),
            clock.clone(),
        ));

        let conversations = ConversationService::new(ConversationServiceDependencies {
            conversation_repository: store.clone(),
            user_repository: store.clone(),
            dispatcher: dispatcher.clone(),
            sink: registry.clone(),
            clock: clock.clone(),
        });
        let reactions = ReactionService::new(ReactionServiceDependencies {
            reaction_repository: store.clone(),
            user_repository: store.clone(),
            dispatcher,
            clock,
        });

        Self {
            notifications: NotificationService::new(store.clone()),
            unread: UnreadTracker::new(store.clone()),
            store,
            registry,
            conversations,
            reactions,
        }
    }

    pub async fn user(&self, name: &str) -> User {
        self.user_with_role(name, UserRole::Member).await
    }

    pub async fn user_with_role(&self, name: &str, role: UserRole) -> User {
        let id = UserId::generate();
        let user = User::new(
            id,
            UserEmail::parse(format!("{}@bluezone.test", name.to_lowercase())).unwrap(),
            name,
            role,
            OffsetDateTime::now_utc(),
        );
        self.store.insert_user(user.clone()).await;
        user
    }

    pub async fn discussion(&self, author: &User, title: &str) -> Discussion {
        let discussion = Discussion {
            id: DiscussionId::generate(),
            author_id: author.id,
            title: title.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.insert_discussion(discussion.clone()).await;
        discussion
    }

    pub async fn reply(&self, discussion: &Discussion, author: &User, content: &str) -> Reply {
        let reply = Reply {
            id: ReplyId::generate(),
            discussion_id: discussion.id,
            author_id: author.id,
            content: content.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.insert_reply(reply.clone()).await;
        reply
    }
}
