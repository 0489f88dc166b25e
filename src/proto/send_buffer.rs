//! 发送缓冲与分段器
//!
//! 缓冲区从 `una`（最早未确认字节）开始，依次保存已发送未确认、尚未发送的字节：
//!
//! ```text
//!   una            nxt                 end
//!    |  in flight   |     unsent        |   free ...
//! ```

use std::collections::VecDeque;

use super::segment::MAX_DATA;
use super::seq::{seq_gt, seq_le};

/// `on_ack` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// 累计确认向前推进了 n 字节
    Advanced(u32),
    /// 没有推进（重复 ACK），对缓冲区无影响
    Duplicate,
    /// 确认了从未发送过的数据，忽略
    Invalid,
}

/// 从缓冲区切出的一段数据（定长，不做堆分配）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub seq: u32,
    len: u8,
    data: [u8; MAX_DATA],
}

impl Chunk {
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone)]
pub struct SendBuffer {
    capacity: usize,
    bytes: VecDeque<u8>,
    una: u32,
    nxt: u32,
}

impl SendBuffer {
    /// `start`：第一个数据字节的序列号（ISS + 1）
    pub fn new(capacity: usize, start: u32) -> Self {
        Self {
            capacity,
            bytes: VecDeque::with_capacity(capacity),
            una: start,
            nxt: start,
        }
    }

    /// 写入应用数据，返回接受的字节数（缓冲区满时为短计数，从不阻塞）。
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.free());
        self.bytes.extend(&data[..n]);
        n
    }

    /// 下一个待发送的新数据段：不超过 MSS，也不超过对端窗口减去在途字节。
    pub fn next_segment(&mut self, mss: usize, peer_window: u16) -> Option<Chunk> {
        let allowed = (peer_window as usize).saturating_sub(self.in_flight() as usize);
        let len = mss.min(MAX_DATA).min(self.unsent()).min(allowed);
        if len == 0 {
            return None;
        }
        let chunk = self.chunk_at(self.in_flight() as usize, len);
        self.nxt = self.nxt.wrapping_add(len as u32);
        Some(chunk)
    }

    /// 最早未确认的数据段（用于重传：同样的序列号、同样的内容）。
    pub fn oldest_unacked(&self, mss: usize) -> Option<Chunk> {
        let len = mss.min(MAX_DATA).min(self.in_flight() as usize);
        if len == 0 {
            return None;
        }
        Some(self.chunk_at(0, len))
    }

    /// 累计确认：`ack` 之前的所有字节均已到达对端。
    pub fn on_ack(&mut self, ack: u32) -> AckOutcome {
        if seq_le(ack, self.una) {
            return AckOutcome::Duplicate;
        }
        if seq_gt(ack, self.nxt) {
            return AckOutcome::Invalid;
        }
        let n = ack.wrapping_sub(self.una);
        self.bytes.drain(..n as usize);
        self.una = ack;
        AckOutcome::Advanced(n)
    }

    fn chunk_at(&self, offset: usize, len: usize) -> Chunk {
        let mut data = [0u8; MAX_DATA];
        for (dst, src) in data.iter_mut().zip(self.bytes.range(offset..offset + len)) {
            *dst = *src;
        }
        Chunk {
            seq: self.una.wrapping_add(offset as u32),
            len: len as u8,
            data,
        }
    }

    /// 最早未确认字节的序列号
    pub fn una(&self) -> u32 {
        self.una
    }

    /// 下一个新字节将使用的序列号
    pub fn nxt(&self) -> u32 {
        self.nxt
    }

    /// 已写入数据之后的序列号（FIN 将占用它）
    pub fn end(&self) -> u32 {
        self.una.wrapping_add(self.bytes.len() as u32)
    }

    pub fn in_flight(&self) -> u32 {
        self.nxt.wrapping_sub(self.una)
    }

    pub fn unsent(&self) -> usize {
        self.bytes.len() - self.in_flight() as usize
    }

    pub fn buffered(&self) -> usize {
        self.bytes.len()
    }

    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.bytes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
