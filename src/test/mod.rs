mod codec;
mod conn_table;
mod handshake;
mod network_integration;
mod state_machine;

use crate::net::NodeAddr;
use crate::proto::{
    ConnHandle, Endpoint, OpenMode, Segment, TransportConfig, TransportEvent, TransportStack,
};
use crate::sim::SimTime;

pub(crate) const A: NodeAddr = NodeAddr(1);
pub(crate) const B: NodeAddr = NodeAddr(2);
pub(crate) const CLIENT_PORT: u16 = 201;
pub(crate) const SERVER_PORT: u16 = 123;

/// 两个直接相连的传输栈，手动搬运分段与推进时钟
pub(crate) struct Pair {
    pub a: TransportStack,
    pub b: TransportStack,
    pub now: SimTime,
}

impl Pair {
    pub fn new() -> Self {
        Self::with_configs(TransportConfig::default(), TransportConfig::default())
    }

    pub fn with_configs(a: TransportConfig, b: TransportConfig) -> Self {
        Self {
            a: TransportStack::new(A, a).expect("valid config"),
            b: TransportStack::new(B, b).expect("valid config"),
            now: SimTime::ZERO,
        }
    }

    /// b 监听，a 主动打开，完整握手
    pub fn connect(&mut self) -> (ConnHandle, ConnHandle) {
        let listener = self.b.listen(SERVER_PORT, self.now).expect("listen");
        let cli = self
            .a
            .open(CLIENT_PORT, Endpoint::new(B, SERVER_PORT), OpenMode::Active, self.now)
            .expect("open");
        self.run(|_, _| true);
        let srv = events(&mut self.b)
            .into_iter()
            .find_map(|ev| match ev.kind {
                crate::proto::TransportEventKind::ConnectionEstablished {
                    listener: Some(l),
                } if l == listener => Some(ev.handle),
                _ => None,
            })
            .expect("server side established");
        let _ = events(&mut self.a);
        (cli, srv)
    }

    /// 来回搬运分段直到双方都没有输出；`keep(from, seg)` 返回 false 的分段被丢弃
    pub fn run(&mut self, mut keep: impl FnMut(NodeAddr, &Segment) -> bool) -> usize {
        let mut moved = 0;
        for _ in 0..1000 {
            let from_a = take(&mut self.a);
            let from_b = take(&mut self.b);
            if from_a.is_empty() && from_b.is_empty() {
                return moved;
            }
            for seg in from_a {
                moved += 1;
                if keep(A, &seg) {
                    self.b.on_receive(A, seg.encode().as_bytes(), self.now);
                }
            }
            for seg in from_b {
                moved += 1;
                if keep(B, &seg) {
                    self.a.on_receive(B, seg.encode().as_bytes(), self.now);
                }
            }
        }
        panic!("segments kept flowing for 1000 rounds");
    }

    /// 把时钟推进到两端最早的截止时间并处理超时；没有定时器时返回 false
    pub fn fire_next_timer(&mut self) -> bool {
        let next = [self.a.poll_timeout(), self.b.poll_timeout()]
            .into_iter()
            .flatten()
            .min();
        let Some(at) = next else {
            return false;
        };
        self.now = self.now.max(at);
        self.a.handle_timeout(self.now);
        self.b.handle_timeout(self.now);
        true
    }
}

/// 取出所有待发送分段并解码
pub(crate) fn take(stack: &mut TransportStack) -> Vec<Segment> {
    let mut out = Vec::new();
    while let Some(tx) = stack.poll_transmit() {
        out.push(Segment::decode(tx.payload.as_bytes()).expect("stack emits valid segments"));
    }
    out
}

pub(crate) fn events(stack: &mut TransportStack) -> Vec<TransportEvent> {
    let mut out = Vec::new();
    while let Some(ev) = stack.poll_event() {
        out.push(ev);
    }
    out
}

/// 0, 1, 2, ... 循环的测试数据
pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
