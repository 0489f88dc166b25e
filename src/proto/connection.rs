//! 单个连接
//!
//! `Connection` 不做 I/O：输入是分段、应用调用和时钟，输出写进 [`Outbox`]，
//! 由 `TransportStack` 负责编码、交给下层并转换成应用通知。
//! 状态迁移全部经过 [`transition`]，这里只执行迁移表给出的动作。

use tracing::{debug, trace};

use super::config::TransportConfig;
use super::error::TransportError;
use super::recv_buffer::{InsertOutcome, ReceiveBuffer};
use super::segment::{Flags, Segment};
use super::send_buffer::{AckOutcome, SendBuffer};
use super::seq::seq_lt;
use super::state::{Action, Input, TcpState, transition};
use super::table::{ConnHandle, ConnKey, Keyed};
use super::timer::{Expiry, RetransmitTimer};
use crate::sim::SimTime;

/// 连接产生的通知（尚未绑定句柄）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Established,
    PeerClosed,
    Closed,
    TimedOut,
}

/// 一次处理的全部输出
#[derive(Debug, Default)]
pub struct Outbox {
    pub segments: Vec<Segment>,
    pub notices: Vec<Notice>,
    pub retransmits: u64,
}

/// 本端 FIN 的进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fin {
    None,
    /// 已请求关闭，等缓冲数据发完
    Queued,
    /// 已发送，占用该序列号
    Sent(u32),
    /// 已被确认；继续接收，直到对端的 FIN 到达
    Acked(u32),
}

#[derive(Debug)]
pub struct Connection {
    key: ConnKey,
    state: TcpState,
    iss: u32,
    irs: u32,
    send: SendBuffer,
    recv: ReceiveBuffer,
    peer_window: u16,
    /// 上一次通告给对端的窗口
    last_window: u16,
    timer: RetransmitTimer,
    fin: Fin,
    peer_fin: bool,
    listener: Option<ConnHandle>,
    mss: usize,
    released: bool,
}

impl Keyed for Connection {
    fn key(&self) -> ConnKey {
        self.key
    }
}

impl Connection {
    pub fn new(key: ConnKey, iss: u32, config: &TransportConfig) -> Self {
        let recv = ReceiveBuffer::new(config.recv_buffer_bytes, 0);
        let last_window = recv.advertised_window();
        Self {
            key,
            state: TcpState::Closed,
            iss,
            irs: 0,
            send: SendBuffer::new(config.send_buffer_bytes, iss.wrapping_add(1)),
            recv,
            peer_window: 0,
            last_window,
            timer: RetransmitTimer::new(
                config.init_rto(),
                config.max_rto(),
                config.backoff,
                config.max_retries,
            ),
            fin: Fin::None,
            peer_fin: false,
            listener: None,
            mss: config.mss(),
            released: false,
        }
    }

    /// 由监听者接受的连接
    pub fn accepted(key: ConnKey, iss: u32, listener: ConnHandle, config: &TransportConfig) -> Self {
        let mut conn = Self::new(key, iss, config);
        conn.listener = Some(listener);
        conn
    }

    pub fn key(&self) -> ConnKey {
        self.key
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn iss(&self) -> u32 {
        self.iss
    }

    pub fn irs(&self) -> u32 {
        self.irs
    }

    pub fn listener(&self) -> Option<ConnHandle> {
        self.listener
    }

    pub fn peer_window(&self) -> u16 {
        self.peer_window
    }

    pub fn snd_una(&self) -> u32 {
        self.send.una()
    }

    pub fn in_flight(&self) -> u32 {
        self.send.in_flight()
    }

    pub fn unsent(&self) -> usize {
        self.send.unsent()
    }

    pub fn rcv_next(&self) -> u32 {
        self.recv.next()
    }

    pub fn readable(&self) -> usize {
        self.recv.readable()
    }

    pub fn retries(&self) -> u32 {
        self.timer.retries()
    }

    pub fn deadline(&self) -> Option<SimTime> {
        self.timer.deadline()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn open(&mut self, input: Input, now: SimTime, out: &mut Outbox) -> Result<(), TransportError> {
        debug_assert!(matches!(input, Input::OpenActive | Input::OpenPassive));
        if self.apply(input, now, out) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    /// 应用写入；返回被接受的字节数
    pub fn write(&mut self, data: &[u8], now: SimTime, out: &mut Outbox) -> Result<usize, TransportError> {
        if !self.state.can_send() || self.fin != Fin::None {
            return Err(TransportError::NotConnected);
        }
        let n = self.send.write(data);
        trace!(conn = %self.key, requested = data.len(), accepted = n, "write");
        self.pump(now, out);
        Ok(n)
    }

    /// 应用读取；窗口从不足一个 MSS 恢复到至少一个 MSS 时立即通告
    pub fn read(&mut self, max: usize, out: &mut Outbox) -> Vec<u8> {
        let bytes = self.recv.drain(max);
        if bytes.is_empty() {
            return bytes;
        }
        let window = self.recv.advertised_window() as usize;
        if self.state.is_synchronized()
            && !self.peer_fin
            && (self.last_window as usize) < self.mss
            && window >= self.mss
        {
            debug!(conn = %self.key, window, "window update");
            self.send_ack(out);
        }
        bytes
    }

    pub fn close(&mut self, now: SimTime, out: &mut Outbox) -> Result<(), TransportError> {
        if !self.apply(Input::Close, now, out) {
            return Err(TransportError::NotConnected);
        }
        self.pump(now, out);
        Ok(())
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        self.timer.is_expired(now)
    }

    /// 定时器到期：重传或放弃
    pub fn on_timeout(&mut self, now: SimTime, out: &mut Outbox) {
        if !self.timer.is_expired(now) {
            return;
        }
        match self.timer.on_expired() {
            Expiry::Retry(n) => {
                if !self.has_outstanding() {
                    self.timer.reset_backoff();
                    self.timer.cancel();
                    return;
                }
                debug!(conn = %self.key, state = %self.state, retries = n, rto = %self.timer.rto(), "retransmission timeout");
                self.apply(Input::RetryTimeout, now, out);
            }
            Expiry::Exhausted => {
                debug!(conn = %self.key, state = %self.state, "retries exhausted");
                self.apply(Input::RetriesExhausted, now, out);
            }
        }
    }

    /// 处理一个发往本连接的分段
    pub fn on_segment(&mut self, seg: &Segment, now: SimTime, out: &mut Outbox) {
        let flags = seg.flags;
        trace!(conn = %self.key, state = %self.state, %seg, "segment in");

        match self.state {
            TcpState::Closed => {}
            TcpState::Listen => {
                if flags.is_syn() && !flags.is_ack() {
                    self.peer_window = seg.window;
                    self.record_peer_syn(seg.seq);
                    self.apply(Input::RecvSyn, now, out);
                }
            }
            TcpState::SynSent => {
                if flags.is_syn() && flags.is_ack() {
                    if seg.ack != self.iss.wrapping_add(1) {
                        debug!(conn = %self.key, ack = seg.ack, iss = self.iss, "SYN+ACK with bad ack, dropped");
                        return;
                    }
                    self.peer_window = seg.window;
                    self.record_peer_syn(seg.seq);
                    self.timer.reset_backoff();
                    self.apply(Input::RecvSynAck, now, out);
                } else if flags.is_syn() {
                    self.peer_window = seg.window;
                    self.record_peer_syn(seg.seq);
                    self.apply(Input::RecvSyn, now, out);
                }
            }
            TcpState::SynReceived => {
                if flags.is_syn() && !flags.is_ack() {
                    if seg.seq == self.irs {
                        self.peer_window = seg.window;
                        self.apply(Input::RecvSyn, now, out);
                    }
                    return;
                }
                if !flags.is_ack() || seg.ack != self.iss.wrapping_add(1) {
                    return;
                }
                self.peer_window = seg.window;
                self.timer.reset_backoff();
                self.apply(Input::RecvAck, now, out);
                // 握手 ACK 可能携带数据或 FIN
                if !flags.is_syn() {
                    self.on_synchronized(seg, now, out);
                }
            }
            TcpState::Established | TcpState::FinWait | TcpState::Closing => {
                if flags.is_syn() {
                    if flags.is_ack() && seg.seq == self.irs {
                        self.peer_window = seg.window;
                        self.apply(Input::RecvSynAck, now, out);
                    } else {
                        trace!(conn = %self.key, "SYN on synchronized connection ignored");
                    }
                    return;
                }
                self.on_synchronized(seg, now, out);
            }
        }

        if !self.released {
            self.pump(now, out);
        }
    }

    fn record_peer_syn(&mut self, seq: u32) {
        self.irs = seq;
        self.recv.reset(seq.wrapping_add(1));
    }

    /// 同步状态下的 ACK / 数据 / FIN 处理。
    ///
    /// 本端 FIN 的确认只记录下来；同一分段里的数据和 FIN 先处理并回 ACK，
    /// 双方的 FIN 都完成后才关闭。
    fn on_synchronized(&mut self, seg: &Segment, now: SimTime, out: &mut Outbox) {
        if seg.flags.is_ack() {
            self.on_ack(seg.ack, seg.window, now);
        }

        let mut need_ack = false;
        if seg.data_len() > 0 {
            let outcome = self.recv.insert(seg.seq, seg.payload());
            trace!(conn = %self.key, seq = seg.seq, len = seg.data_len(), ?outcome, rcv_next = self.recv.next(), "data");
            if outcome == InsertOutcome::Duplicate {
                debug!(conn = %self.key, seq = seg.seq, "duplicate segment");
            }
            need_ack = true;
        } else if seg.seq_len() == 0 && seq_lt(seg.seq, self.recv.next()) {
            // 窗口探测或重复的空分段：回复当前窗口
            need_ack = true;
        }

        if seg.flags.is_fin() {
            let fin_seq = seg.seq.wrapping_add(seg.data_len() as u32);
            if !self.peer_fin && fin_seq == self.recv.next() {
                self.recv.consume_fin();
                self.peer_fin = true;
                debug!(conn = %self.key, fin_seq, "peer FIN");
                if self.apply(Input::RecvFin, now, out) {
                    need_ack = false;
                }
            } else {
                need_ack = true;
            }
        }

        if need_ack {
            self.send_ack(out);
        }

        if let Fin::Acked(_) = self.fin {
            if self.peer_fin {
                self.apply(Input::FinAcked, now, out);
            } else {
                // 对端仍在发送
                self.timer.reset_backoff();
                self.timer.arm(now);
            }
        }
    }

    fn on_ack(&mut self, ack: u32, window: u16, now: SimTime) {
        let mut acked_fin = None;
        let mut data_ack = ack;
        match self.fin {
            Fin::Sent(fin_seq) if ack == fin_seq.wrapping_add(1) => {
                acked_fin = Some(fin_seq);
                data_ack = fin_seq;
            }
            Fin::Acked(fin_seq) if ack == fin_seq.wrapping_add(1) => data_ack = fin_seq,
            _ => {}
        }

        let outcome = self.send.on_ack(data_ack);
        match outcome {
            AckOutcome::Invalid => {
                debug!(conn = %self.key, ack, snd_nxt = self.send.nxt(), "ack for unsent data ignored");
                return;
            }
            AckOutcome::Duplicate if seq_lt(data_ack, self.send.una()) => {
                trace!(conn = %self.key, ack, snd_una = self.send.una(), "stale ack ignored");
                return;
            }
            _ => {}
        }
        self.peer_window = window;

        if let Some(fin_seq) = acked_fin {
            debug!(conn = %self.key, fin_seq, "FIN acknowledged");
            self.fin = Fin::Acked(fin_seq);
        }
        match outcome {
            AckOutcome::Advanced(n) => {
                trace!(conn = %self.key, acked = n, snd_una = self.send.una(), "ack advanced");
                self.timer.reset_backoff();
                self.refresh_timer(now);
            }
            AckOutcome::Duplicate if acked_fin.is_some() => {
                self.timer.reset_backoff();
                self.refresh_timer(now);
            }
            AckOutcome::Duplicate => {
                if self.peer_window == 0 {
                    // 对端存活，只是窗口为 0
                    self.timer.reset_backoff();
                }
            }
            AckOutcome::Invalid => {}
        }
    }

    /// 执行一次迁移；返回 false 表示事件在当前状态下被忽略
    fn apply(&mut self, input: Input, now: SimTime, out: &mut Outbox) -> bool {
        let Some(t) = transition(self.state, input) else {
            trace!(conn = %self.key, state = %self.state, ?input, "no transition");
            return false;
        };
        if t.next != self.state {
            debug!(conn = %self.key, from = %self.state, to = %t.next, ?input, "state change");
        }
        self.state = t.next;
        for &action in t.actions {
            self.run(action, now, out);
        }
        true
    }

    fn run(&mut self, action: Action, now: SimTime, out: &mut Outbox) {
        match action {
            Action::SendSyn => {
                let seg = self.segment(self.iss, Flags::SYN);
                out.segments.push(seg);
            }
            Action::SendSynAck => {
                let seg = self.segment(self.iss, Flags::SYN | Flags::ACK);
                out.segments.push(seg);
            }
            Action::SendAck => self.send_ack(out),
            Action::QueueFin => self.fin = Fin::Queued,
            Action::ArmTimer => self.timer.arm(now),
            Action::CancelTimer => self.timer.cancel(),
            Action::Retransmit => self.retransmit(out),
            Action::NotifyEstablished => out.notices.push(Notice::Established),
            Action::NotifyPeerClosed => out.notices.push(Notice::PeerClosed),
            Action::NotifyClosed => out.notices.push(Notice::Closed),
            Action::NotifyTimedOut => out.notices.push(Notice::TimedOut),
            Action::Release => self.released = true,
        }
    }

    /// 发送新数据，数据发完后发送排队的 FIN，并据此维护定时器
    fn pump(&mut self, now: SimTime, out: &mut Outbox) {
        if !self.state.is_synchronized() {
            return;
        }
        while let Some(chunk) = self.send.next_segment(self.mss, self.peer_window) {
            let seg = self.segment(chunk.seq, Flags::ACK).with_payload(chunk.payload());
            out.segments.push(seg);
        }
        if self.fin == Fin::Queued && self.send.unsent() == 0 {
            let fin_seq = self.send.end();
            let seg = self.segment(fin_seq, Flags::ACK | Flags::FIN);
            out.segments.push(seg);
            self.fin = Fin::Sent(fin_seq);
            debug!(conn = %self.key, fin_seq, "FIN sent");
        }
        if self.has_outstanding() {
            self.timer.arm_if_idle(now);
        } else {
            self.timer.cancel();
        }
    }

    fn refresh_timer(&mut self, now: SimTime) {
        if self.has_outstanding() {
            self.timer.arm(now);
        } else {
            self.timer.cancel();
        }
    }

    /// 是否有需要定时器守护的东西
    fn has_outstanding(&self) -> bool {
        match self.state {
            TcpState::SynSent | TcpState::SynReceived => true,
            TcpState::Established | TcpState::FinWait | TcpState::Closing => {
                self.send.in_flight() > 0
                    || matches!(self.fin, Fin::Sent(_))
                    || self.window_stalled()
                    || self.awaiting_peer_fin()
            }
            TcpState::Closed | TcpState::Listen => false,
        }
    }

    /// 本端 FIN 已被确认，对端的 FIN 还没到
    fn awaiting_peer_fin(&self) -> bool {
        matches!(self.fin, Fin::Acked(_)) && !self.peer_fin
    }

    /// 有数据待发但对端窗口为 0，且没有在途数据
    fn window_stalled(&self) -> bool {
        self.peer_window == 0 && self.send.in_flight() == 0 && self.send.unsent() > 0
    }

    fn retransmit(&mut self, out: &mut Outbox) {
        let seg = match self.state {
            TcpState::SynSent => self.segment(self.iss, Flags::SYN),
            TcpState::SynReceived => self.segment(self.iss, Flags::SYN | Flags::ACK),
            _ => {
                if let Some(chunk) = self.send.oldest_unacked(self.mss) {
                    self.segment(chunk.seq, Flags::ACK).with_payload(chunk.payload())
                } else if let Fin::Sent(fin_seq) = self.fin {
                    self.segment(fin_seq, Flags::ACK | Flags::FIN)
                } else if let Fin::Acked(fin_seq) = self.fin {
                    debug!(conn = %self.key, "keepalive while waiting for peer FIN");
                    self.segment(fin_seq, Flags::ACK)
                } else if self.window_stalled() {
                    debug!(conn = %self.key, "zero window probe");
                    self.segment(self.send.nxt().wrapping_sub(1), Flags::ACK)
                } else {
                    return;
                }
            }
        };
        trace!(conn = %self.key, %seg, "retransmit");
        out.segments.push(seg);
        out.retransmits += 1;
    }

    fn send_ack(&mut self, out: &mut Outbox) {
        let seg = self.segment(self.snd_nxt(), Flags::ACK);
        out.segments.push(seg);
    }

    /// 纯 ACK 使用的序列号：FIN 已发送时位于 FIN 之后
    fn snd_nxt(&self) -> u32 {
        match self.fin {
            Fin::Sent(fin_seq) | Fin::Acked(fin_seq) => fin_seq.wrapping_add(1),
            Fin::None | Fin::Queued => self.send.nxt(),
        }
    }

    fn segment(&mut self, seq: u32, flags: Flags) -> Segment {
        let window = self.recv.advertised_window();
        self.last_window = window;
        let ack = if flags.is_ack() { self.recv.next() } else { 0 };
        Segment::control(self.key.local_port, self.key.remote.port, seq, ack, flags, window)
    }
}
