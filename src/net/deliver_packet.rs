//! 数据包交付事件

use super::id::NodeAddr;
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World};
use tracing::{debug, trace};

/// 事件：把一个 packet 交给某个 mote 处理（到达目的地或继续转发）。
#[derive(Debug)]
pub struct DeliverPacket {
    pub to: NodeAddr,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    #[tracing::instrument(skip(self, sim, world), fields(pkt_id = self.pkt.id, to = %self.to))]
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPacket { to, pkt } = *self;

        debug!(
            src = %pkt.src,
            dst = %pkt.dst,
            hops = pkt.hops,
            ttl = pkt.ttl,
            len = pkt.payload.len(),
            now = %sim.now(),
            "📨 数据包到达节点"
        );

        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.deliver(to, pkt, sim);

        trace!("DeliverPacket::execute 完成");
    }
}
