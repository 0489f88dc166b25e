//! 链路类型
//!
//! 单向无线链路：传播时延、带宽（串行化时延）与丢包率。

use super::id::NodeAddr;
use crate::sim::SimTime;

/// 链路参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParams {
    pub latency: SimTime,
    pub bandwidth_bps: u64,
    /// 每个帧独立的丢失概率
    pub loss: f64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            latency: SimTime::from_millis(1),
            bandwidth_bps: 250_000,
            loss: 0.0,
        }
    }
}

/// 网络链路
#[derive(Debug)]
pub struct Link {
    pub from: NodeAddr,
    pub to: NodeAddr,
    pub latency: SimTime,
    pub bandwidth_bps: u64,
    pub loss: f64,
    /// 发送端空口忙到这个时刻
    pub busy_until: SimTime,
}

impl Link {
    pub fn new(from: NodeAddr, to: NodeAddr, params: LinkParams) -> Self {
        Self {
            from,
            to,
            latency: params.latency,
            bandwidth_bps: params.bandwidth_bps,
            loss: params.loss.clamp(0.0, 1.0),
            busy_until: SimTime::ZERO,
        }
    }

    /// 计算传输指定字节数所需的时间
    pub(crate) fn tx_time(&self, bytes: usize) -> SimTime {
        // ceil(bytes*8 / bps) 秒 -> 纳秒
        if self.bandwidth_bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bits = (bytes as u128).saturating_mul(8);
        let bps = self.bandwidth_bps as u128;
        let nanos = (bits.saturating_mul(1_000_000_000) + (bps - 1)) / bps;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }
}
