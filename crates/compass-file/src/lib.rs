//! Compass 文件格式处理
//!
//! 支持：
//! - JSON 文本快照（便于查看和比对）
//! - `.compass` 原生格式（MessagePack + Zstd）

pub mod document;
pub mod error;
pub mod native;

pub use document::{Snapshot, SnapshotMetadata, SNAPSHOT_VERSION};
pub use error::FileError;
