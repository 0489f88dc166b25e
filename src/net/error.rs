//! 下层错误类型

use thiserror::Error;

use super::id::NodeAddr;
use crate::proto::ConfigError;

/// `NetApi::send_from` 的同步失败；其余丢包只计入统计
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("payload of {len} bytes exceeds the {max}-byte packet limit")]
    Oversize { len: usize, max: usize },
    #[error("no route from {from} to {dst}")]
    NoRoute { from: NodeAddr, dst: NodeAddr },
}

/// 拓扑构建错误
#[derive(Debug, Error)]
pub enum NetError {
    #[error("mote {0} already exists")]
    DuplicateNode(NodeAddr),
    #[error("mote {0} does not exist")]
    UnknownNode(NodeAddr),
    #[error("address {0} is reserved")]
    ReservedAddr(NodeAddr),
    #[error("invalid transport config for mote {addr}")]
    Config {
        addr: NodeAddr,
        #[source]
        source: ConfigError,
    },
}
