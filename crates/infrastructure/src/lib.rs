//! 基础设施层实现。
//!
//! 提供基于 Postgres 的持久化网关，实现应用层定义的接口。

pub mod builder;
pub mod migrations;
pub mod repository;

pub use builder::{Gateways, Infrastructure, InfrastructureConfig, InfrastructureError};
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgConversationRepository, PgForumWriter, PgNotificationRepository,
    PgReactionRepository, PgStorage, PgUserRepository,
};
