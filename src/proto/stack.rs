//! 每个节点一个的传输栈（sans-IO）
//!
//! 栈本身不发包也不读时钟：
//! - 下层把收到的载荷交给 [`TransportStack::on_receive`]，
//! - 调用方用 [`TransportStack::poll_transmit`] 取出待发送的分段交给下层，
//! - 用 [`TransportStack::poll_event`] 取出应用通知，
//! - 在 [`TransportStack::poll_timeout`] 给出的时刻调用 [`TransportStack::handle_timeout`]。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::config::TransportConfig;
use super::connection::{Connection, Notice, Outbox};
use super::error::{ConfigError, TransportError};
use super::segment::{EncodedSegment, Flags, Segment};
use super::state::{Input, TcpState};
use super::table::{ConnHandle, ConnKey, ConnTable, Endpoint};
use crate::net::NodeAddr;
use crate::sim::{SimTime, mix64};

/// 打开方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// 主动打开：立即发送 SYN
    Active,
    /// 被动打开：等待 SYN
    Passive,
}

/// 一个待交给下层的分段
#[derive(Debug, Clone)]
pub struct Transmit {
    pub dst: NodeAddr,
    pub payload: EncodedSegment,
}

/// 应用通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportEvent {
    pub handle: ConnHandle,
    pub key: ConnKey,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEventKind {
    /// 握手完成；被动接受的连接带上监听者句柄
    ConnectionEstablished { listener: Option<ConnHandle> },
    /// 正常关闭完成，句柄已失效
    ConnectionClosed,
    /// 重试次数耗尽，句柄已失效
    ConnectionTimedOut,
    /// 对端关闭了它的发送方向
    PeerClosed,
}

/// 节点级计数器
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    pub segments_sent: u64,
    pub segments_received: u64,
    pub retransmissions: u64,
    pub malformed_dropped: u64,
    pub unmatched_dropped: u64,
    pub stray_fin_replies: u64,
    pub connections_opened: u64,
    pub connections_established: u64,
    pub connections_closed: u64,
    pub connections_timed_out: u64,
}

#[derive(Debug)]
pub struct TransportStack {
    addr: NodeAddr,
    config: TransportConfig,
    table: ConnTable<Connection>,
    transmits: VecDeque<Transmit>,
    events: VecDeque<TransportEvent>,
    isn_counter: u64,
    stats: TransportStats,
}

impl TransportStack {
    pub fn new(addr: NodeAddr, config: TransportConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let table = ConnTable::new(config.max_connections);
        Ok(Self {
            addr,
            config,
            table,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
            isn_counter: 0,
            stats: TransportStats::default(),
        })
    }

    pub fn addr(&self) -> NodeAddr {
        self.addr
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn mss(&self) -> usize {
        self.config.mss()
    }

    /// 确定性的初始序列号：(seed, 节点, 计数器) 经 splitmix64 混合
    fn next_iss(&mut self) -> u32 {
        let x = self.config.isn_seed ^ (u64::from(self.addr.0) << 32) ^ self.isn_counter;
        self.isn_counter = self.isn_counter.wrapping_add(1);
        mix64(x) as u32
    }

    /// 打开连接。被动打开且 `remote` 为 [`Endpoint::ANY`] 时得到一个监听者。
    #[tracing::instrument(skip(self), fields(node = %self.addr))]
    pub fn open(
        &mut self,
        local_port: u16,
        remote: Endpoint,
        mode: OpenMode,
        now: SimTime,
    ) -> Result<ConnHandle, TransportError> {
        let key = ConnKey::new(local_port, remote);
        if mode == OpenMode::Active && key.is_listener() {
            return Err(TransportError::WildcardRemote);
        }
        if self.table.find(&key).is_some() {
            return Err(TransportError::ConnectionExists(key));
        }
        let iss = self.next_iss();
        let handle = self.table.insert(Connection::new(key, iss, &self.config))?;
        self.stats.connections_opened += 1;

        let input = match mode {
            OpenMode::Active => Input::OpenActive,
            OpenMode::Passive => Input::OpenPassive,
        };
        let mut out = Outbox::default();
        let conn = self.table.get_mut(handle).ok_or(TransportError::InvalidHandle)?;
        conn.open(input, now, &mut out)?;
        info!(%key, %handle, ?mode, iss, "connection opened");
        self.finish(handle, out);
        Ok(handle)
    }

    /// 在本地端口上接受任意对端的连接
    pub fn listen(&mut self, local_port: u16, now: SimTime) -> Result<ConnHandle, TransportError> {
        self.open(local_port, Endpoint::ANY, OpenMode::Passive, now)
    }

    /// 写入数据；返回接受的字节数（可能为短计数）
    pub fn send(&mut self, handle: ConnHandle, bytes: &[u8], now: SimTime) -> Result<usize, TransportError> {
        let conn = self.table.get_mut(handle).ok_or(TransportError::InvalidHandle)?;
        let mut out = Outbox::default();
        let n = conn.write(bytes, now, &mut out)?;
        self.finish(handle, out);
        Ok(n)
    }

    /// 读取最多 `max` 个按序字节；没有数据时返回空
    pub fn receive(&mut self, handle: ConnHandle, max: usize) -> Result<Vec<u8>, TransportError> {
        let conn = self.table.get_mut(handle).ok_or(TransportError::InvalidHandle)?;
        let mut out = Outbox::default();
        let bytes = conn.read(max, &mut out);
        self.finish(handle, out);
        Ok(bytes)
    }

    pub fn close(&mut self, handle: ConnHandle, now: SimTime) -> Result<(), TransportError> {
        let conn = self.table.get_mut(handle).ok_or(TransportError::InvalidHandle)?;
        let mut out = Outbox::default();
        conn.close(now, &mut out)?;
        debug!(node = %self.addr, %handle, state = %conn.state(), "close requested");
        self.finish(handle, out);
        Ok(())
    }

    pub fn state(&self, handle: ConnHandle) -> Option<TcpState> {
        self.table.get(handle).map(Connection::state)
    }

    pub fn connection(&self, handle: ConnHandle) -> Option<&Connection> {
        self.table.get(handle)
    }

    pub fn find(&self, key: &ConnKey) -> Option<ConnHandle> {
        self.table.find(key)
    }

    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    /// 下层交付的一个载荷
    #[tracing::instrument(skip(self, payload), fields(node = %self.addr, len = payload.len()))]
    pub fn on_receive(&mut self, src: NodeAddr, payload: &[u8], now: SimTime) {
        self.stats.segments_received += 1;
        let seg = match Segment::decode(payload) {
            Ok(seg) => seg,
            Err(e) => {
                warn!(%src, error = %e, "malformed segment dropped");
                self.stats.malformed_dropped += 1;
                return;
            }
        };
        trace!(%seg, "decoded");

        let key = ConnKey::new(seg.dst_port, Endpoint::new(src, seg.src_port));
        if let Some(handle) = self.table.find(&key) {
            self.dispatch(handle, &seg, now);
            return;
        }

        if seg.flags.is_syn() && !seg.flags.is_ack() {
            if let Some(listener) = self.table.find_listener(seg.dst_port) {
                self.accept(listener, key, &seg, now);
                return;
            }
        }

        if seg.flags.is_fin() {
            // 本端连接已释放，对端仍在等待 FIN 的确认
            let ack = seg.seq.wrapping_add(seg.data_len() as u32).wrapping_add(1);
            let reply = Segment::control(seg.dst_port, seg.src_port, seg.ack, ack, Flags::ACK, 0);
            debug!(%key, ack, "stray FIN answered");
            self.stats.stray_fin_replies += 1;
            self.push_transmit(src, &reply);
            return;
        }

        debug!(%key, flags = %seg.flags, "no matching connection, dropped");
        self.stats.unmatched_dropped += 1;
    }

    fn accept(&mut self, listener: ConnHandle, key: ConnKey, seg: &Segment, now: SimTime) {
        let iss = self.next_iss();
        let conn = Connection::accepted(key, iss, listener, &self.config);
        let handle = match self.table.insert(conn) {
            Ok(h) => h,
            Err(e) => {
                warn!(%key, error = %e, "cannot accept connection");
                self.stats.unmatched_dropped += 1;
                return;
            }
        };
        self.stats.connections_opened += 1;
        let mut out = Outbox::default();
        if let Some(conn) = self.table.get_mut(handle) {
            if conn.open(Input::OpenPassive, now, &mut out).is_ok() {
                conn.on_segment(seg, now, &mut out);
            }
        }
        info!(%key, %handle, %listener, iss, "connection accepted");
        self.finish(handle, out);
    }

    fn dispatch(&mut self, handle: ConnHandle, seg: &Segment, now: SimTime) {
        let Some(conn) = self.table.get_mut(handle) else {
            return;
        };
        let mut out = Outbox::default();
        conn.on_segment(seg, now, &mut out);
        self.finish(handle, out);
    }

    /// 处理所有到期的定时器
    pub fn handle_timeout(&mut self, now: SimTime) {
        for handle in self.table.handles() {
            let Some(conn) = self.table.get_mut(handle) else {
                continue;
            };
            if !conn.is_expired(now) {
                continue;
            }
            let mut out = Outbox::default();
            conn.on_timeout(now, &mut out);
            self.finish(handle, out);
        }
    }

    /// 最早的定时器截止时间
    pub fn poll_timeout(&self) -> Option<SimTime> {
        self.table.iter().filter_map(|(_, c)| c.deadline()).min()
    }

    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    fn push_transmit(&mut self, dst: NodeAddr, seg: &Segment) {
        self.stats.segments_sent += 1;
        self.transmits.push_back(Transmit {
            dst,
            payload: seg.encode(),
        });
    }

    /// 把一次处理的输出转换成待发送分段与应用通知；必要时释放槽位
    fn finish(&mut self, handle: ConnHandle, out: Outbox) {
        let Some(conn) = self.table.get(handle) else {
            return;
        };
        let key = conn.key();
        let listener = conn.listener();
        let released = conn.is_released();

        for seg in &out.segments {
            trace!(node = %self.addr, %key, %seg, "segment out");
            self.push_transmit(key.remote.addr, seg);
        }
        self.stats.retransmissions += out.retransmits;

        for notice in out.notices {
            let kind = match notice {
                Notice::Established => {
                    self.stats.connections_established += 1;
                    info!(node = %self.addr, %key, %handle, "🤝 connection established");
                    TransportEventKind::ConnectionEstablished { listener }
                }
                Notice::PeerClosed => TransportEventKind::PeerClosed,
                Notice::Closed => {
                    self.stats.connections_closed += 1;
                    info!(node = %self.addr, %key, %handle, "connection closed");
                    TransportEventKind::ConnectionClosed
                }
                Notice::TimedOut => {
                    self.stats.connections_timed_out += 1;
                    warn!(node = %self.addr, %key, %handle, "⏱️ connection timed out");
                    TransportEventKind::ConnectionTimedOut
                }
            };
            self.events.push_back(TransportEvent { handle, key, kind });
        }

        if released {
            self.table.remove(handle);
            trace!(node = %self.addr, %key, %handle, "slot released");
        }
    }
}
