//! 存储层错误

use std::fmt;
use thiserror::Error;

/// 存储中的记录类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    ResourcePool,
    PoolNode,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::ResourcePool => f.write_str("resource pool"),
            RecordKind::PoolNode => f.write_str("pool node"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    /// 数据库文件无法打开或目录无法创建
    #[error("Cannot open apirun database at {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 编排器描述的 JSON 列无法编解码
    #[error("Invalid orchestrator descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    /// 库中的记录无法还原为领域对象
    #[error("Corrupt {kind} record {id}: {reason}")]
    CorruptRecord {
        kind: RecordKind,
        id: String,
        reason: String,
    },

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

impl StorageError {
    pub fn not_found(kind: RecordKind, id: &str) -> Self {
        StorageError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
