//! mote 网络
//!
//! 持有所有 mote、单向链路与路由表，实现多跳、不可靠的投递：
//! 每一跳按链路的串行化时延与传播时延调度到达事件，并按丢包率随机丢弃。

use std::collections::{BTreeMap, HashMap};

use super::deliver_packet::DeliverPacket;
use super::error::{NetError, SendError};
use super::id::{LinkId, NodeAddr};
use super::link::{Link, LinkParams};
use super::mote::Mote;
use super::packet::{DEFAULT_TTL, Packet};
use super::routing::RoutingTable;
use super::stats::Stats;
use crate::app::AppCommand;
use crate::proto::{MAX_SEGMENT_LEN, TransportConfig};
use crate::sim::{SimRng, SimTime, Simulator};
use tracing::{debug, trace};

/// mote 网络
#[derive(Debug)]
pub struct Network {
    motes: Vec<Option<Mote>>,
    index: BTreeMap<NodeAddr, usize>,
    links: Vec<Link>,
    edges: HashMap<(NodeAddr, NodeAddr), LinkId>,
    routing: RoutingTable,
    rng: SimRng,
    max_payload: usize,
    ttl: u8,
    next_pkt_id: u64,
    pub stats: Stats,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Network {
    /// `seed` 决定丢包序列
    pub fn new(seed: u64) -> Self {
        Self {
            motes: Vec::new(),
            index: BTreeMap::new(),
            links: Vec::new(),
            edges: HashMap::new(),
            routing: RoutingTable::default(),
            rng: SimRng::new(seed),
            max_payload: MAX_SEGMENT_LEN,
            ttl: DEFAULT_TTL,
            next_pkt_id: 0,
            stats: Stats::default(),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.ttl = ttl;
    }

    /// 添加 mote
    pub fn add_mote(&mut self, addr: NodeAddr, config: TransportConfig) -> Result<(), NetError> {
        if addr == NodeAddr::BROADCAST {
            return Err(NetError::ReservedAddr(addr));
        }
        if self.index.contains_key(&addr) {
            return Err(NetError::DuplicateNode(addr));
        }
        let mote = Mote::new(addr, config).map_err(|source| NetError::Config { addr, source })?;
        self.index.insert(addr, self.motes.len());
        self.motes.push(Some(mote));
        self.routing.mark_dirty();
        Ok(())
    }

    /// 连接两个 mote（单向链路）
    pub fn connect(&mut self, from: NodeAddr, to: NodeAddr, params: LinkParams) -> Result<LinkId, NetError> {
        for addr in [from, to] {
            if !self.index.contains_key(&addr) {
                return Err(NetError::UnknownNode(addr));
            }
        }
        let id = LinkId(self.links.len());
        self.links.push(Link::new(from, to, params));
        self.edges.insert((from, to), id);
        self.routing.mark_dirty();
        Ok(id)
    }

    /// 双向各建一条链路
    pub fn connect_bidi(&mut self, a: NodeAddr, b: NodeAddr, params: LinkParams) -> Result<(), NetError> {
        self.connect(a, b, params)?;
        self.connect(b, a, params)?;
        Ok(())
    }

    pub fn addrs(&self) -> impl Iterator<Item = NodeAddr> + '_ {
        self.index.keys().copied()
    }

    pub fn mote(&self, addr: NodeAddr) -> Option<&Mote> {
        let idx = *self.index.get(&addr)?;
        self.motes.get(idx)?.as_ref()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn ensure_routes(&mut self) {
        if !self.routing.is_dirty() {
            return;
        }
        let mut adj: BTreeMap<NodeAddr, Vec<NodeAddr>> =
            self.index.keys().map(|&a| (a, Vec::new())).collect();
        for link in &self.links {
            adj.entry(link.from).or_default().push(link.to);
        }
        self.routing.ensure_built(&adj);
        debug!(motes = self.index.len(), links = self.links.len(), "🧭 路由表已重建");
    }

    /// 最短跳数路径（含两端）
    pub fn route(&mut self, from: NodeAddr, dst: NodeAddr) -> Option<Vec<NodeAddr>> {
        self.ensure_routes();
        self.routing.path(from, dst)
    }

    /// 暂时把 mote 取出来，避免 &mut self 与 &mut mote 的重叠借用。
    fn with_mote<R>(&mut self, addr: NodeAddr, f: impl FnOnce(&mut Mote, &mut Network) -> R) -> Option<R> {
        let idx = *self.index.get(&addr)?;
        let mut mote = self.motes[idx].take()?;
        let r = f(&mut mote, self);
        self.motes[idx] = Some(mote);
        Some(r)
    }

    /// 从 `from` 发出一个新包
    #[tracing::instrument(skip(self, payload, sim), fields(len = payload.len()))]
    pub fn send_from(
        &mut self,
        from: NodeAddr,
        dst: NodeAddr,
        payload: &[u8],
        sim: &mut Simulator,
    ) -> Result<(), SendError> {
        if payload.len() > self.max_payload {
            self.stats.oversize_pkts += 1;
            return Err(SendError::Oversize {
                len: payload.len(),
                max: self.max_payload,
            });
        }
        let id = self.next_pkt_id;
        self.next_pkt_id = self.next_pkt_id.wrapping_add(1);
        let pkt = Packet {
            id,
            src: from,
            dst,
            ttl: self.ttl,
            hops: 0,
            payload: payload.to_vec(),
        };

        if dst == from {
            self.stats.sent_pkts += 1;
            trace!(pkt_id = id, "loopback");
            sim.schedule(sim.now(), DeliverPacket { to: from, pkt });
            return Ok(());
        }

        self.ensure_routes();
        if self.routing.next_hop(from, dst).is_none() {
            self.stats.no_route_pkts += 1;
            return Err(SendError::NoRoute { from, dst });
        }
        self.stats.sent_pkts += 1;
        self.forward_from(from, pkt, sim);
        Ok(())
    }

    /// 从指定 mote 把包送往下一跳
    #[tracing::instrument(skip(self, pkt, sim), fields(pkt_id = pkt.id, dst = %pkt.dst, ttl = pkt.ttl))]
    pub fn forward_from(&mut self, at: NodeAddr, pkt: Packet, sim: &mut Simulator) {
        if pkt.ttl == 0 {
            debug!("TTL 耗尽，丢弃");
            self.stats.ttl_expired_pkts += 1;
            return;
        }
        self.ensure_routes();
        let Some(to) = self.routing.next_hop(at, pkt.dst) else {
            debug!("没有路由，丢弃");
            self.stats.no_route_pkts += 1;
            return;
        };
        let Some(&link_id) = self.edges.get(&(at, to)) else {
            self.stats.no_route_pkts += 1;
            return;
        };
        if at != pkt.src {
            self.stats.forwarded_pkts += 1;
        }

        let link = &mut self.links[link_id.0];
        let now = sim.now();
        let start = now.max(link.busy_until);
        let depart = start.saturating_add(link.tx_time(pkt.wire_bytes()));
        link.busy_until = depart;
        let arrive = depart.saturating_add(link.latency);
        let loss = link.loss;

        if self.rng.chance(loss) {
            debug!(next_hop = %to, "💥 帧在链路上丢失");
            self.stats.lost_pkts += 1;
            return;
        }

        trace!(next_hop = %to, %depart, %arrive, "调度数据包到达事件");
        sim.schedule(arrive, DeliverPacket { to, pkt: pkt.advance() });
    }

    /// 将数据包交付给 mote 处理
    pub fn deliver(&mut self, to: NodeAddr, pkt: Packet, sim: &mut Simulator) {
        if self
            .with_mote(to, |mote, net| mote.on_packet(pkt, sim, net))
            .is_none()
        {
            debug!(%to, "目标 mote 不存在");
        }
    }

    /// 包到达目的地
    pub(crate) fn on_delivered(&mut self, pkt: &Packet) {
        self.stats.delivered_pkts += 1;
        self.stats.delivered_bytes += pkt.payload.len() as u64;
        trace!(pkt_id = pkt.id, hops = pkt.hops, "✅ 数据包送达目的地");
    }

    pub fn wake(&mut self, node: NodeAddr, sim: &mut Simulator) {
        self.with_mote(node, |mote, net| mote.on_wakeup(sim, net));
    }

    pub fn command(&mut self, node: NodeAddr, cmd: AppCommand, sim: &mut Simulator) {
        if self
            .with_mote(node, |mote, net| mote.on_command(cmd, sim, net))
            .is_none()
        {
            debug!(%node, "命令的目标 mote 不存在");
        }
    }

    /// 方便测试：直接在某个 mote 上调用传输栈并刷新输出
    pub fn with_stack<R>(
        &mut self,
        node: NodeAddr,
        sim: &mut Simulator,
        f: impl FnOnce(&mut crate::proto::TransportStack, SimTime) -> R,
    ) -> Option<R> {
        let now = sim.now();
        self.with_mote(node, |mote, net| {
            let r = f(mote.stack_mut(), now);
            mote.flush(sim, net);
            r
        })
    }
}
