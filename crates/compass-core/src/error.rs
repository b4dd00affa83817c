//! 核心错误定义

use crate::primitive::{PrimitiveId, PrimitiveTag};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("expectation failed: {0}")]
    Expectation(#[from] ExpectationFailure),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("primitive not found: {0}")]
    NotFound(PrimitiveId),

    #[error("primitive {id} is a {actual:?}, expected {expected}")]
    KindMismatch {
        id: PrimitiveId,
        expected: &'static str,
        actual: PrimitiveTag,
    },
}

/// 调用方违反变更协议（调用方的 bug，不应重试）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("nested edit")]
    NestedEdit,

    #[error("operation requires no open transaction")]
    TransactionOpen,

    #[error("changing disposed primitive {0}")]
    ChangingDisposed(PrimitiveId),

    #[error("changing invalidated primitive {0}")]
    ChangingInvalidated(PrimitiveId),

    #[error("invalidating changed primitive {0}")]
    InvalidatingChanged(PrimitiveId),

    #[error("primitive {0} is already disposed")]
    AlreadyDisposed(PrimitiveId),

    #[error("primitive {id} still has {children} children")]
    HasChildren { id: PrimitiveId, children: usize },
}

/// 几何期望与实际不符（通常来自过期或损坏的外部数据）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpectationFailure {
    #[error("expected no intersection between {a} and {b}, but one exists")]
    UnexpectedIntersection { a: PrimitiveId, b: PrimitiveId },

    #[error("expected an intersection between {a} and {b}, but none exists")]
    MissingIntersection { a: PrimitiveId, b: PrimitiveId },

    #[error("missing hints for invalid intersection point")]
    MissingHints,

    #[error("conflicting invalid intersection points on {a} and {b}")]
    ConflictingInvalidPoints { a: PrimitiveId, b: PrimitiveId },
}
