//! 传输层错误类型

use thiserror::Error;

use super::table::ConnKey;

/// 分段解码失败：一律丢弃，不回复。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed segment: {0}")]
    MalformedSegment(Malformed),
}

/// 畸形分段的具体原因
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    #[error("buffer of {len} bytes is shorter than the segment header")]
    ShortHeader { len: usize },
    #[error("declared data length {declared} exceeds the {available} bytes after the header")]
    Truncated { declared: usize, available: usize },
    #[error("declared data length {declared} exceeds the payload capacity")]
    OverCapacity { declared: usize },
}

impl From<Malformed> for DecodeError {
    fn from(m: Malformed) -> Self {
        DecodeError::MalformedSegment(m)
    }
}

/// 面向应用的同步错误（open/send/receive/close 直接返回）。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection {0} already exists")]
    ConnectionExists(ConnKey),
    #[error("connection table is full ({capacity} slots)")]
    TableFull { capacity: usize },
    #[error("connection is not in a state that allows this operation")]
    NotConnected,
    #[error("unknown or stale connection handle")]
    InvalidHandle,
    #[error("active open needs a concrete remote endpoint")]
    WildcardRemote,
}

/// 配置校验失败
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("max_payload {max_payload} leaves no room for data after the 16-byte header")]
    PayloadTooSmall { max_payload: usize },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("max_rto_ms ({max}) is smaller than init_rto_ms ({init})")]
    RtoRange { init: u64, max: u64 },
    #[error("{field} = {value} does not fit the 16-bit advertised window")]
    WindowOverflow { field: &'static str, value: usize },
}
