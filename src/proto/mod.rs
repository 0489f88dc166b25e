//! 传输层协议引擎
//!
//! 自底向上：分段编解码、发送/接收缓冲、重传定时器、连接状态机、连接表，
//! 以及把它们组合起来的每节点传输栈。

mod config;
mod connection;
mod error;
mod recv_buffer;
mod segment;
mod send_buffer;
mod seq;
mod stack;
mod state;
mod table;
mod timer;

pub use config::TransportConfig;
pub use connection::{Connection, Notice, Outbox};
pub use error::{ConfigError, DecodeError, Malformed, TransportError};
pub use recv_buffer::{InsertOutcome, ReceiveBuffer};
pub use segment::{EncodedSegment, Flags, HEADER_LEN, MAX_DATA, MAX_SEGMENT_LEN, Segment};
pub use send_buffer::{AckOutcome, Chunk, SendBuffer};
pub use seq::{seq_delta, seq_ge, seq_gt, seq_le, seq_lt};
pub use stack::{
    OpenMode, Transmit, TransportEvent, TransportEventKind, TransportStack, TransportStats,
};
pub use state::{Action, Input, TcpState, Transition, transition};
pub use table::{ConnHandle, ConnKey, ConnTable, Endpoint, Keyed};
pub use timer::{Backoff, Expiry, RetransmitTimer};
