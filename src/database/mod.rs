// 数据库模块
// 标记记录的持久化存储，生产实现基于 Postgres

pub mod markers;

pub use markers::{MarkerStore, PgMarkerStore};
