//! mote 看到的下层接口

use crate::sim::Simulator;

use super::error::SendError;
use super::id::NodeAddr;
use super::packet::Packet;

/// 多跳、不可靠、小载荷的投递服务
pub trait NetApi {
    /// 单个包的最大载荷
    fn max_payload(&self) -> usize;

    /// 从 `from` 发往 `dst`；返回 Ok 不代表会送达
    fn send_from(
        &mut self,
        from: NodeAddr,
        dst: NodeAddr,
        payload: &[u8],
        sim: &mut Simulator,
    ) -> Result<(), SendError>;

    /// 中间节点转发
    fn forward_from(&mut self, at: NodeAddr, pkt: Packet, sim: &mut Simulator);

    /// 包到达目的 mote
    fn on_delivered(&mut self, pkt: &Packet);
}

impl NetApi for super::Network {
    fn max_payload(&self) -> usize {
        super::Network::max_payload(self)
    }

    fn send_from(
        &mut self,
        from: NodeAddr,
        dst: NodeAddr,
        payload: &[u8],
        sim: &mut Simulator,
    ) -> Result<(), SendError> {
        super::Network::send_from(self, from, dst, payload, sim)
    }

    fn forward_from(&mut self, at: NodeAddr, pkt: Packet, sim: &mut Simulator) {
        super::Network::forward_from(self, at, pkt, sim)
    }

    fn on_delivered(&mut self, pkt: &Packet) {
        super::Network::on_delivered(self, pkt)
    }
}
