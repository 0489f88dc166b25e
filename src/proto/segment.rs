//! 传输分段的线上格式
//!
//! 固定布局，多字节字段均为网络字节序（big-endian）：
//!
//! ```text
//!  0       2       4               8              12  13      15  16
//! +-------+-------+---------------+---------------+---+-------+---+-----------+
//! | sport | dport |      seq      |      ack      | F |  wnd  | L | data[L]   |
//! +-------+-------+---------------+---------------+---+-------+---+-----------+
//! ```
//!
//! 头部 16 字节，数据 0..=40 字节；编码结果是一个定长缓冲区，不做堆分配。

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use super::error::{DecodeError, Malformed};

/// 头部字节数：2+2+4+4+1+2+1
pub const HEADER_LEN: usize = 16;
/// 单个分段的最大数据字节数
pub const MAX_DATA: usize = 40;
/// 分段最大总长度（必须不超过下层的最大包载荷）
pub const MAX_SEGMENT_LEN: usize = HEADER_LEN + MAX_DATA;

const OFF_SRC_PORT: usize = 0;
const OFF_DST_PORT: usize = 2;
const OFF_SEQ: usize = 4;
const OFF_ACK: usize = 8;
const OFF_FLAGS: usize = 12;
const OFF_WINDOW: usize = 13;
const OFF_DATA_LEN: usize = 15;

/// SYN / ACK / FIN 标志位集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const SYN: Flags = Flags(1);
    pub const ACK: Flags = Flags(2);
    pub const FIN: Flags = Flags(4);
    const ALL: u8 = 0b111;

    /// 未知位被丢弃
    pub fn from_bits_truncate(bits: u8) -> Flags {
        Flags(bits & Self::ALL)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_syn(self) -> bool {
        self.contains(Flags::SYN)
    }

    pub fn is_ack(self) -> bool {
        self.contains(Flags::ACK)
    }

    pub fn is_fin(self) -> bool {
        self.contains(Flags::FIN)
    }
}

impl BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in [(Flags::SYN, "SYN"), (Flags::ACK, "ACK"), (Flags::FIN, "FIN")] {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// 一个传输分段：头部字段 + 定长数据区（只有前 `data_len` 字节有效）。
///
/// 未使用的数据字节始终为 0，因此派生的 `PartialEq` 等价于按有效字段比较。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: Flags,
    pub window: u16,
    data_len: u8,
    data: [u8; MAX_DATA],
}

impl Segment {
    /// 不带数据的分段（SYN/ACK/FIN 等控制分段）
    pub fn control(src_port: u16, dst_port: u16, seq: u32, ack: u32, flags: Flags, window: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            window,
            data_len: 0,
            data: [0; MAX_DATA],
        }
    }

    /// 设置数据区；超出容量的部分被截断。
    pub fn with_payload(mut self, bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= MAX_DATA, "payload exceeds segment capacity");
        let n = bytes.len().min(MAX_DATA);
        self.data = [0; MAX_DATA];
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.data_len = n as u8;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.data_len as usize]
    }

    pub fn data_len(&self) -> usize {
        self.data_len as usize
    }

    /// 该分段占用的序列号空间：数据字节 + SYN + FIN
    pub fn seq_len(&self) -> u32 {
        self.data_len as u32 + u32::from(self.flags.is_syn()) + u32::from(self.flags.is_fin())
    }

    /// 编码为定长缓冲区
    pub fn encode(&self) -> EncodedSegment {
        let mut buf = [0u8; MAX_SEGMENT_LEN];
        buf[OFF_SRC_PORT..OFF_SRC_PORT + 2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[OFF_DST_PORT..OFF_DST_PORT + 2].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_FLAGS] = self.flags.bits();
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.window.to_be_bytes());
        buf[OFF_DATA_LEN] = self.data_len;
        let n = self.data_len as usize;
        buf[HEADER_LEN..HEADER_LEN + n].copy_from_slice(&self.data[..n]);
        EncodedSegment {
            buf,
            len: HEADER_LEN + n,
        }
    }

    /// 从原始字节解码；声明长度之后的多余字节被忽略。
    pub fn decode(buf: &[u8]) -> Result<Segment, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(Malformed::ShortHeader { len: buf.len() }.into());
        }
        let declared = buf[OFF_DATA_LEN] as usize;
        if declared > MAX_DATA {
            return Err(Malformed::OverCapacity { declared }.into());
        }
        let available = buf.len() - HEADER_LEN;
        if declared > available {
            return Err(Malformed::Truncated {
                declared,
                available,
            }
            .into());
        }

        let seg = Segment::control(
            read_u16(buf, OFF_SRC_PORT),
            read_u16(buf, OFF_DST_PORT),
            read_u32(buf, OFF_SEQ),
            read_u32(buf, OFF_ACK),
            Flags::from_bits_truncate(buf[OFF_FLAGS]),
            read_u16(buf, OFF_WINDOW),
        );
        Ok(seg.with_payload(&buf[HEADER_LEN..HEADER_LEN + declared]))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} [{}] seq={} ack={} wnd={} len={}",
            self.src_port, self.dst_port, self.flags, self.seq, self.ack, self.window, self.data_len
        )
    }
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// 编码后的分段：定长缓冲区，`as_bytes()` 给出有效前缀。
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EncodedSegment {
    buf: [u8; MAX_SEGMENT_LEN],
    len: usize,
}

impl EncodedSegment {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for EncodedSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedSegment")
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}
