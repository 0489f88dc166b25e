//! 测试服务端
//!
//! 在端口上通配监听；把每个连接的字节流按 big-endian u16 计数值解析，
//! 统计收到的个数与乱序次数。对端关闭后关闭本端。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AppReport, MoteApp, Outcome};
use crate::proto::{ConnHandle, ConnKey, Endpoint, TransportEvent, TransportEventKind, TransportStack};
use crate::sim::SimTime;

const READ_CHUNK: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub remote: Endpoint,
    pub values_received: u64,
    pub order_errors: u64,
    pub next_expected: u16,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerReport {
    pub port: u16,
    pub listening: bool,
    pub sessions: Vec<SessionReport>,
}

#[derive(Debug)]
struct Session {
    key: ConnKey,
    expected: u16,
    received: u64,
    order_errors: u64,
    /// 跨分段的半个计数值
    partial: Option<u8>,
    outcome: Outcome,
}

impl Session {
    fn new(key: ConnKey) -> Self {
        Self {
            key,
            expected: 0,
            received: 0,
            order_errors: 0,
            partial: None,
            outcome: Outcome::Open,
        }
    }

    fn consume(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let Some(hi) = self.partial.take() else {
                self.partial = Some(b);
                continue;
            };
            let value = u16::from_be_bytes([hi, b]);
            if value != self.expected {
                self.order_errors += 1;
                warn!(conn = %self.key, value, expected = self.expected, "counter out of order");
            }
            self.expected = value.wrapping_add(1);
            self.received += 1;
        }
    }

    fn report(&self) -> SessionReport {
        SessionReport {
            remote: self.key.remote,
            values_received: self.received,
            order_errors: self.order_errors,
            next_expected: self.expected,
            outcome: self.outcome,
        }
    }
}

#[derive(Debug)]
pub struct TestServer {
    port: u16,
    listener: Option<ConnHandle>,
    live: BTreeMap<ConnHandle, Session>,
    finished: Vec<Session>,
}

impl TestServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            listener: None,
            live: BTreeMap::new(),
            finished: Vec::new(),
        }
    }

    fn drain(stack: &mut TransportStack, handle: ConnHandle, session: &mut Session) {
        while let Ok(bytes) = stack.receive(handle, READ_CHUNK) {
            if bytes.is_empty() {
                break;
            }
            session.consume(&bytes);
        }
    }
}

impl MoteApp for TestServer {
    fn on_start(&mut self, stack: &mut TransportStack, now: SimTime) {
        match stack.listen(self.port, now) {
            Ok(h) => {
                info!(node = %stack.addr(), port = self.port, "test server listening");
                self.listener = Some(h);
            }
            Err(e) => warn!(node = %stack.addr(), port = self.port, error = %e, "test server cannot listen"),
        }
    }

    fn on_event(&mut self, ev: &TransportEvent, stack: &mut TransportStack, now: SimTime) {
        match ev.kind {
            TransportEventKind::ConnectionEstablished { listener } => {
                if listener.is_some() && listener == self.listener {
                    debug!(conn = %ev.key, "session accepted");
                    self.live.insert(ev.handle, Session::new(ev.key));
                }
            }
            TransportEventKind::PeerClosed => {
                if let Some(session) = self.live.get_mut(&ev.handle) {
                    Self::drain(stack, ev.handle, session);
                    session.outcome = Outcome::Closing;
                    if let Err(e) = stack.close(ev.handle, now) {
                        warn!(conn = %ev.key, error = %e, "close after peer close failed");
                    }
                }
            }
            TransportEventKind::ConnectionClosed | TransportEventKind::ConnectionTimedOut => {
                if Some(ev.handle) == self.listener {
                    self.listener = None;
                    return;
                }
                if let Some(mut session) = self.live.remove(&ev.handle) {
                    session.outcome = if ev.kind == TransportEventKind::ConnectionClosed {
                        Outcome::Closed
                    } else {
                        Outcome::TimedOut
                    };
                    info!(
                        conn = %session.key,
                        received = session.received,
                        order_errors = session.order_errors,
                        outcome = ?session.outcome,
                        "session finished"
                    );
                    self.finished.push(session);
                }
            }
        }
    }

    fn poll(&mut self, stack: &mut TransportStack, _now: SimTime) {
        for (&handle, session) in self.live.iter_mut() {
            Self::drain(stack, handle, session);
        }
    }

    fn report(&self) -> AppReport {
        AppReport::Server(ServerReport {
            port: self.port,
            listening: self.listener.is_some(),
            sessions: self
                .finished
                .iter()
                .chain(self.live.values())
                .map(Session::report)
                .collect(),
        })
    }
}
