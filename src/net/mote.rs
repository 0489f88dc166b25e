//! mote 节点
//!
//! 每个 mote 持有一个传输栈和若干应用。它同时是路由器：目的地不是自己的包直接转发。
//! 每次输入（包到达、定时器、命令）之后执行 `flush`：
//! 通知 → 应用 → 待发送分段，循环到没有新输出为止，再按栈的最早截止时间安排唤醒。

use tracing::{debug, trace, warn};

use super::api::NetApi;
use super::id::NodeAddr;
use super::mote_events::TransportWakeup;
use super::packet::Packet;
use crate::app::{AppCommand, AppReport, MoteApp, TestClient, TestServer};
use crate::proto::{ConfigError, TransportConfig, TransportStack};
use crate::sim::{SimTime, Simulator};

#[derive(Debug)]
pub struct Mote {
    addr: NodeAddr,
    stack: TransportStack,
    apps: Vec<Box<dyn MoteApp>>,
    /// 已安排的最早唤醒时刻
    wakeup_at: Option<SimTime>,
}

impl Mote {
    pub fn new(addr: NodeAddr, config: TransportConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            addr,
            stack: TransportStack::new(addr, config)?,
            apps: Vec::new(),
            wakeup_at: None,
        })
    }

    pub fn addr(&self) -> NodeAddr {
        self.addr
    }

    pub fn stack(&self) -> &TransportStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut TransportStack {
        &mut self.stack
    }

    pub fn reports(&self) -> Vec<AppReport> {
        self.apps.iter().map(|a| a.report()).collect()
    }

    /// 处理到达的数据包
    #[tracing::instrument(skip(self, pkt, sim, net), fields(node = %self.addr, pkt_id = pkt.id, src = %pkt.src, dst = %pkt.dst))]
    pub fn on_packet(&mut self, pkt: Packet, sim: &mut Simulator, net: &mut dyn NetApi) {
        if pkt.dst != self.addr {
            trace!(ttl = pkt.ttl, "not for us, forwarding");
            net.forward_from(self.addr, pkt, sim);
            return;
        }
        net.on_delivered(&pkt);
        self.stack.on_receive(pkt.src, &pkt.payload, sim.now());
        self.flush(sim, net);
    }

    /// 定时器唤醒
    pub fn on_wakeup(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        let now = sim.now();
        if self.wakeup_at.is_some_and(|t| t <= now) {
            self.wakeup_at = None;
        }
        self.stack.handle_timeout(now);
        self.flush(sim, net);
    }

    pub fn on_command(&mut self, cmd: AppCommand, sim: &mut Simulator, net: &mut dyn NetApi) {
        let now = sim.now();
        debug!(node = %self.addr, ?cmd, "command");
        match cmd {
            AppCommand::StartServer { port } => {
                let mut app = TestServer::new(port);
                app.on_start(&mut self.stack, now);
                self.apps.push(Box::new(app));
            }
            AppCommand::StartClient(cfg) => {
                let mut app = TestClient::new(cfg);
                app.on_start(&mut self.stack, now);
                self.apps.push(Box::new(app));
            }
            AppCommand::Close { .. } => {
                let handled = self
                    .apps
                    .iter_mut()
                    .any(|app| app.on_command(&cmd, &mut self.stack, now));
                if !handled {
                    warn!(node = %self.addr, ?cmd, "close command matched no connection");
                }
            }
        }
        self.flush(sim, net);
    }

    pub(crate) fn flush(&mut self, sim: &mut Simulator, net: &mut dyn NetApi) {
        let now = sim.now();
        loop {
            let mut progressed = false;
            while let Some(ev) = self.stack.poll_event() {
                progressed = true;
                trace!(node = %self.addr, handle = %ev.handle, kind = ?ev.kind, "transport event");
                for app in self.apps.iter_mut() {
                    app.on_event(&ev, &mut self.stack, now);
                }
            }
            for app in self.apps.iter_mut() {
                app.poll(&mut self.stack, now);
            }
            while let Some(tx) = self.stack.poll_transmit() {
                progressed = true;
                if let Err(e) = net.send_from(self.addr, tx.dst, tx.payload.as_bytes(), sim) {
                    debug!(node = %self.addr, dst = %tx.dst, error = %e, "segment not sent");
                }
            }
            if !progressed {
                break;
            }
        }
        self.schedule_wakeup(sim);
    }

    fn schedule_wakeup(&mut self, sim: &mut Simulator) {
        let Some(deadline) = self.stack.poll_timeout() else {
            return;
        };
        let now = sim.now();
        let stale = self.wakeup_at.is_none_or(|t| t < now || deadline < t);
        if stale {
            trace!(node = %self.addr, %deadline, "wakeup scheduled");
            self.wakeup_at = Some(deadline);
            sim.schedule(deadline, TransportWakeup { node: self.addr });
        }
    }
}
