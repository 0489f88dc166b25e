//! 链状拓扑：1 - 2 - ... - n

use crate::net::{LinkParams, NetError, Network, NodeAddr};
use crate::proto::TransportConfig;

/// 构建 `n` 个 mote 的链，相邻 mote 之间双向连接
pub fn build_line(
    net: &mut Network,
    n: u16,
    params: LinkParams,
    config: &TransportConfig,
) -> Result<Vec<NodeAddr>, NetError> {
    let addrs: Vec<NodeAddr> = (1..=n).map(NodeAddr).collect();
    for &a in &addrs {
        net.add_mote(a, config.clone())?;
    }
    for pair in addrs.windows(2) {
        net.connect_bidi(pair[0], pair[1], params)?;
    }
    Ok(addrs)
}
