//! 测试客户端
//!
//! 主动连接服务端，按序写入 big-endian u16 计数值 0..transfer。
//! 传输层只接受部分字节时，剩余字节留在 `pending` 里下次再写。

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AppCommand, AppReport, ClientConfig, MoteApp, Outcome};
use crate::net::NodeAddr;
use crate::proto::{ConnHandle, Endpoint, OpenMode, TransportEvent, TransportEventKind, TransportStack};
use crate::sim::SimTime;

/// 每次最多准备的计数值个数
const BATCH_VALUES: u32 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientReport {
    pub server: NodeAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub transfer: u16,
    /// 已完整交给传输层的计数值个数
    pub values_written: u32,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub struct TestClient {
    cfg: ClientConfig,
    handle: Option<ConnHandle>,
    outcome: Outcome,
    /// 下一个要准备的计数值
    next_value: u32,
    pending: Vec<u8>,
    bytes_written: u64,
}

impl TestClient {
    pub fn new(cfg: ClientConfig) -> Self {
        Self {
            cfg,
            handle: None,
            outcome: Outcome::Idle,
            next_value: 0,
            pending: Vec::new(),
            bytes_written: 0,
        }
    }

    fn all_written(&self) -> bool {
        self.pending.is_empty() && self.next_value >= u32::from(self.cfg.transfer)
    }

    fn refill(&mut self) {
        let end = (self.next_value + BATCH_VALUES).min(u32::from(self.cfg.transfer));
        for v in self.next_value..end {
            self.pending.extend_from_slice(&(v as u16).to_be_bytes());
        }
        self.next_value = end;
    }

    fn close(&mut self, stack: &mut TransportStack, now: SimTime) {
        let Some(handle) = self.handle else {
            return;
        };
        match stack.close(handle, now) {
            Ok(()) => self.outcome = Outcome::Closing,
            Err(e) => warn!(node = %stack.addr(), %handle, error = %e, "client close failed"),
        }
    }
}

impl MoteApp for TestClient {
    fn on_start(&mut self, stack: &mut TransportStack, now: SimTime) {
        let remote = Endpoint::new(self.cfg.server, self.cfg.dst_port);
        match stack.open(self.cfg.src_port, remote, OpenMode::Active, now) {
            Ok(h) => {
                info!(node = %stack.addr(), src_port = self.cfg.src_port, %remote, transfer = self.cfg.transfer, "test client connecting");
                self.handle = Some(h);
                self.outcome = Outcome::Connecting;
            }
            Err(e) => {
                warn!(node = %stack.addr(), %remote, error = %e, "test client cannot open");
                self.outcome = Outcome::Failed;
            }
        }
    }

    fn on_event(&mut self, ev: &TransportEvent, stack: &mut TransportStack, now: SimTime) {
        if Some(ev.handle) != self.handle {
            return;
        }
        match ev.kind {
            TransportEventKind::ConnectionEstablished { .. } => {
                self.outcome = Outcome::Open;
            }
            TransportEventKind::PeerClosed => {
                debug!(conn = %ev.key, "server closed its side");
                if self.outcome == Outcome::Open && self.all_written() {
                    self.close(stack, now);
                }
            }
            TransportEventKind::ConnectionClosed => {
                self.outcome = Outcome::Closed;
                self.handle = None;
            }
            TransportEventKind::ConnectionTimedOut => {
                self.outcome = Outcome::TimedOut;
                self.handle = None;
            }
        }
    }

    fn poll(&mut self, stack: &mut TransportStack, now: SimTime) {
        let Some(handle) = self.handle else {
            return;
        };
        if self.outcome != Outcome::Open {
            return;
        }
        loop {
            if self.pending.is_empty() {
                self.refill();
            }
            if self.pending.is_empty() {
                break;
            }
            match stack.send(handle, &self.pending, now) {
                Ok(0) => break,
                Ok(n) => {
                    self.pending.drain(..n);
                    self.bytes_written += n as u64;
                }
                Err(e) => {
                    warn!(node = %stack.addr(), %handle, error = %e, "client write failed");
                    break;
                }
            }
        }
        if self.cfg.close_when_done && self.all_written() {
            info!(node = %stack.addr(), %handle, values = self.cfg.transfer, "all values written, closing");
            self.close(stack, now);
        }
    }

    fn on_command(&mut self, cmd: &AppCommand, stack: &mut TransportStack, now: SimTime) -> bool {
        let AppCommand::Close {
            server,
            src_port,
            dst_port,
        } = *cmd
        else {
            return false;
        };
        if server != self.cfg.server || src_port != self.cfg.src_port || dst_port != self.cfg.dst_port {
            return false;
        }
        if self.handle.is_some() && matches!(self.outcome, Outcome::Connecting | Outcome::Open) {
            // 未被接受的数据直接丢弃
            self.pending.clear();
            self.next_value = u32::from(self.cfg.transfer);
            self.close(stack, now);
        }
        true
    }

    fn report(&self) -> AppReport {
        AppReport::Client(ClientReport {
            server: self.cfg.server,
            src_port: self.cfg.src_port,
            dst_port: self.cfg.dst_port,
            transfer: self.cfg.transfer,
            values_written: (self.bytes_written / 2) as u32,
            outcome: self.outcome,
        })
    }
}
