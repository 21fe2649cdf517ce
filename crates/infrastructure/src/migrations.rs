use sqlx::migrate::Migrator;

/// 嵌入二进制的数据库迁移
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
