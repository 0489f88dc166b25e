//! 接收缓冲与重组器
//!
//! `ready` 保存已连续、尚未交给应用的字节；`pending` 保存乱序到达的区间，
//! 键为流偏移（u64，不回绕），区间互不重叠。两者合计不超过容量。

use std::collections::{BTreeMap, VecDeque};

use super::seq::seq_delta;

/// `insert` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 按序到达，期望序列号前进了 n 字节（可能包含被补齐的乱序数据）
    InOrder(u32),
    /// 乱序但落在窗口内，已缓存
    OutOfOrder,
    /// 全部字节都在期望序列号之前：重复分段
    Duplicate,
    /// 窗口已满或数据完全落在窗口之外
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ReceiveBuffer {
    capacity: usize,
    /// 下一个期望的序列号
    next: u32,
    /// `next` 对应的流偏移
    next_off: u64,
    ready: VecDeque<u8>,
    pending: BTreeMap<u64, Vec<u8>>,
    pending_bytes: usize,
}

impl ReceiveBuffer {
    pub fn new(capacity: usize, next: u32) -> Self {
        Self {
            capacity,
            next,
            next_off: 0,
            ready: VecDeque::with_capacity(capacity),
            pending: BTreeMap::new(),
            pending_bytes: 0,
        }
    }

    /// 握手时记录对端的初始序列号后重置起点
    pub fn reset(&mut self, next: u32) {
        self.next = next;
        self.next_off = 0;
        self.ready.clear();
        self.pending.clear();
        self.pending_bytes = 0;
    }

    /// 把 `bytes` 放到 `seq` 对应的流位置。
    pub fn insert(&mut self, seq: u32, bytes: &[u8]) -> InsertOutcome {
        if bytes.is_empty() {
            return InsertOutcome::Duplicate;
        }
        let rel = seq_delta(seq, self.next);
        let end_rel = rel + bytes.len() as i64;
        if end_rel <= 0 {
            return InsertOutcome::Duplicate;
        }

        // 去掉已交付部分
        let skip = if rel < 0 { (-rel) as usize } else { 0 };
        let rel = rel.max(0) as usize;
        let limit = self.capacity.saturating_sub(self.ready.len());
        if rel >= limit {
            return InsertOutcome::Rejected;
        }
        let take = (bytes.len() - skip).min(limit - rel);
        let data = &bytes[skip..skip + take];

        if rel == 0 {
            self.ready.extend(data);
            self.advance(data.len() as u64);
            let mut advanced = data.len() as u64;
            advanced += self.promote_pending();
            InsertOutcome::InOrder(advanced as u32)
        } else {
            self.stash(self.next_off + rel as u64, data);
            InsertOutcome::OutOfOrder
        }
    }

    /// 把与已有区间不重叠的部分存入 `pending`
    fn stash(&mut self, start: u64, data: &[u8]) {
        let end = start + data.len() as u64;
        let covered: Vec<(u64, u64)> = self
            .pending
            .range(..end)
            .map(|(&s, v)| (s, s + v.len() as u64))
            .filter(|&(_, e)| e > start)
            .collect();

        let mut cursor = start;
        let mut pieces = Vec::new();
        for (s, e) in covered {
            if s > cursor {
                pieces.push((cursor, s));
            }
            cursor = cursor.max(e);
        }
        if cursor < end {
            pieces.push((cursor, end));
        }
        for (s, e) in pieces {
            let lo = (s - start) as usize;
            let hi = (e - start) as usize;
            self.pending.insert(s, data[lo..hi].to_vec());
            self.pending_bytes += hi - lo;
        }
    }

    /// 缺口被补齐后，把已连续的乱序区间移入 `ready`
    fn promote_pending(&mut self) -> u64 {
        let mut advanced = 0;
        while let Some((&off, _)) = self.pending.first_key_value() {
            if off > self.next_off {
                break;
            }
            let Some((off, data)) = self.pending.pop_first() else {
                break;
            };
            self.pending_bytes -= data.len();
            let end = off + data.len() as u64;
            if end <= self.next_off {
                continue;
            }
            let skip = (self.next_off - off) as usize;
            self.ready.extend(&data[skip..]);
            let n = (data.len() - skip) as u64;
            self.advance(n);
            advanced += n;
        }
        advanced
    }

    fn advance(&mut self, n: u64) {
        self.next = self.next.wrapping_add(n as u32);
        self.next_off += n;
    }

    /// 取走最多 `max` 个连续字节交给应用
    pub fn drain(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.ready.len());
        self.ready.drain(..n).collect()
    }

    /// 对端的 FIN 占用一个序列号；之后不会再有数据。
    pub fn consume_fin(&mut self) {
        self.advance(1);
        self.pending.clear();
        self.pending_bytes = 0;
    }

    /// 剩余容量，截断到 16 位
    pub fn advertised_window(&self) -> u16 {
        let held = self.ready.len() + self.pending_bytes;
        self.capacity.saturating_sub(held).min(u16::MAX as usize) as u16
    }

    pub fn next(&self) -> u32 {
        self.next
    }

    /// 可立即读取的字节数
    pub fn readable(&self) -> usize {
        self.ready.len()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
