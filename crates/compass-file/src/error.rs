//! 文件操作错误定义

use compass_core::primitive::PrimitiveId;
use compass_core::{CoreError, ExpectationFailure};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MessagePack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Construction error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Unknown primitive reference: {0}")]
    UnknownReference(PrimitiveId),

    #[error("Corruption detected: {0}")]
    Corruption(String),
}

impl From<ExpectationFailure> for FileError {
    fn from(failure: ExpectationFailure) -> Self {
        FileError::Core(failure.into())
    }
}
