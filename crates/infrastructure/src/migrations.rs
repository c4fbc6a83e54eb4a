use sqlx::migrate::Migrator;

/// 工作区根目录 `migrations/` 下的建表脚本，编译期嵌入
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
