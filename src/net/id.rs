//! 标识符类型
//!
//! mote 用 16-bit 地址标识；链路用其在网络中的下标标识。

use std::fmt;

use serde::{Deserialize, Serialize};

/// mote 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddr(pub u16);

impl NodeAddr {
    /// 广播地址；传输层用它表示通配对端，不会分配给任何 mote
    pub const BROADCAST: NodeAddr = NodeAddr(0xFFFF);
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 链路标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);
