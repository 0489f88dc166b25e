//! 统计信息
//!
//! 下层投递的计数，随运行报告一起输出。

use serde::{Deserialize, Serialize};

/// 网络统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub sent_pkts: u64,
    pub delivered_pkts: u64,
    pub delivered_bytes: u64,
    pub forwarded_pkts: u64,
    pub lost_pkts: u64,
    pub no_route_pkts: u64,
    pub ttl_expired_pkts: u64,
    pub oversize_pkts: u64,
}
