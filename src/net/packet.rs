//! 数据包类型
//!
//! 下层（多跳、不可靠）一次投递的单位：载荷就是编码后的传输分段。

use super::id::NodeAddr;

/// 默认跳数上限
pub const DEFAULT_TTL: u8 = 16;

/// 链路层帧头开销（字节），只用于计算串行化时延
pub const FRAME_OVERHEAD_BYTES: usize = 11;

/// 网络数据包
#[derive(Debug, Clone)]
pub struct Packet {
    pub id: u64,
    pub src: NodeAddr,
    pub dst: NodeAddr,
    /// 剩余跳数
    pub ttl: u8,
    /// 已经过的跳数
    pub hops: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    /// 帧在空口上占用的字节数
    pub fn wire_bytes(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD_BYTES
    }

    /// 经过一跳
    pub fn advance(mut self) -> Self {
        self.ttl = self.ttl.saturating_sub(1);
        self.hops = self.hops.saturating_add(1);
        self
    }
}
