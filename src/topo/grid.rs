//! 网格拓扑
//!
//! `rows x cols`，地址按行优先从 1 开始；每个 mote 与上下左右的邻居双向连接。
//!
//! ```text
//!  1 - 2 - 3
//!  |   |   |
//!  4 - 5 - 6
//! ```

use crate::net::{LinkParams, NetError, Network, NodeAddr};
use crate::proto::TransportConfig;

pub fn build_grid(
    net: &mut Network,
    rows: u16,
    cols: u16,
    params: LinkParams,
    config: &TransportConfig,
) -> Result<Vec<NodeAddr>, NetError> {
    let addr = |r: u16, c: u16| NodeAddr(r * cols + c + 1);
    let mut addrs = Vec::with_capacity(rows as usize * cols as usize);
    for r in 0..rows {
        for c in 0..cols {
            let a = addr(r, c);
            net.add_mote(a, config.clone())?;
            addrs.push(a);
        }
    }
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                net.connect_bidi(addr(r, c), addr(r, c + 1), params)?;
            }
            if r + 1 < rows {
                net.connect_bidi(addr(r, c), addr(r + 1, c), params)?;
            }
        }
    }
    Ok(addrs)
}
