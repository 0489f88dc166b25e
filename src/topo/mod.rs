//! 拓扑构建
//!
//! 地址从 1 开始分配；所有链路默认双向。

mod grid;
mod line;

pub use grid::build_grid;
pub use line::build_line;

use crate::net::{LinkParams, NetError, Network, NodeAddr};
use crate::proto::TransportConfig;
use crate::sim::{LinkDefaults, SimTime, TopologySpec};

/// 场景里的链路默认值 -> 链路参数
pub fn link_params(defaults: Option<&LinkDefaults>) -> LinkParams {
    let mut p = LinkParams::default();
    if let Some(d) = defaults {
        if let Some(ms) = d.latency_ms {
            p.latency = SimTime::from_millis(ms);
        }
        if let Some(bps) = d.bandwidth_bps {
            p.bandwidth_bps = bps;
        }
        if let Some(loss) = d.loss {
            p.loss = loss;
        }
    }
    p
}

/// 按场景描述构建拓扑；返回所有 mote 地址
pub fn build_topology(
    net: &mut Network,
    spec: &TopologySpec,
    params: LinkParams,
    config: &TransportConfig,
) -> Result<Vec<NodeAddr>, NetError> {
    match spec {
        TopologySpec::Line { nodes } => build_line(net, *nodes, params, config),
        TopologySpec::Grid { rows, cols } => build_grid(net, *rows, *cols, params, config),
        TopologySpec::Custom { nodes, links } => {
            for &addr in nodes {
                net.add_mote(addr, config.clone())?;
            }
            for l in links {
                let mut p = params;
                if let Some(loss) = l.loss {
                    p.loss = loss;
                }
                if let Some(ms) = l.latency_ms {
                    p.latency = SimTime::from_millis(ms);
                }
                if l.bidirectional {
                    net.connect_bidi(l.from, l.to, p)?;
                } else {
                    net.connect(l.from, l.to, p)?;
                }
            }
            Ok(nodes.clone())
        }
    }
}
