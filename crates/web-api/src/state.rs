use std::sync::Arc;

use application::{
    Clock, ConnectionRegistry, ConversationService, ConversationServiceDependencies,
    NotificationDispatcher, NotificationService, ReactionService, ReactionServiceDependencies,
    UnreadTracker,
};
use infrastructure::Gateways;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub conversation_service: Arc<ConversationService>,
    pub reaction_service: Arc<ReactionService>,
    pub notification_service: Arc<NotificationService>,
    pub unread_tracker: Arc<UnreadTracker>,
    pub registry: Arc<ConnectionRegistry>,
    pub jwt_service: Arc<JwtService>,
    /// 每个 WebSocket 连接的出站队列长度
    pub connection_buffer: usize,
}

impl AppState {
    /// 用持久化网关装配全部用例服务，所有服务共享同一个连接注册表
    pub fn new(
        gateways: Gateways,
        registry: Arc<ConnectionRegistry>,
        jwt_service: Arc<JwtService>,
        clock: Arc<dyn Clock>,
        connection_buffer: usize,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            gateways.notifications.clone(),
            registry.clone(),
            clock.clone(),
        ));

        let conversation_service = ConversationService::new(ConversationServiceDependencies {
            conversation_repository: gateways.conversations.clone(),
            user_repository: gateways.users.clone(),
            dispatcher: dispatcher.clone(),
            sink: registry.clone(),
            clock: clock.clone(),
        });
        let reaction_service = ReactionService::new(ReactionServiceDependencies {
            reaction_repository: gateways.reactions.clone(),
            user_repository: gateways.users.clone(),
            dispatcher,
            clock,
        });

        Self {
            conversation_service: Arc::new(conversation_service),
            reaction_service: Arc::new(reaction_service),
            notification_service: Arc::new(NotificationService::new(gateways.notifications)),
            unread_tracker: Arc::new(UnreadTracker::new(gateways.conversations)),
            registry,
            jwt_service,
            connection_buffer,
        }
    }
}
