//! 应用层实现。
//!
//! 这里提供私信会话、点赞、通知三类用例服务，负责输入校验、授权、
//! 调用持久化网关的组合操作，以及把结果推送给在线连接。

pub mod clock;
pub mod error;
pub mod memory;
pub mod realtime;
pub mod repository;
pub mod services;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ApplicationError;
pub use memory::InMemoryStore;
pub use realtime::{
    user_room, Arrival, ConnectionRegistry, Departure, EventSender, RealtimeError, UserEventSink,
};
pub use repository::{
    ConversationRepository, NotificationRepository, ReactionRepository, UserRepository,
};
pub use services::{
    ConversationService, ConversationServiceDependencies, DispatchOutcome, NotificationDispatcher,
    NotificationEffect, NotificationService, ReactionOutcome, ReactionService,
    ReactionServiceDependencies, ReactionState, SendMessageRequest, StartConversationRequest,
    ToggleReactionRequest, UnreadTracker,
};
