//! 网络模拟模块
//!
//! 模拟传输层之下的投递服务：mote、单向有损链路、最短跳数路由与逐跳转发。

// 子模块声明
mod api;
mod deliver_packet;
mod error;
mod id;
mod link;
mod mote;
mod mote_events;
mod net_world;
mod network;
mod packet;
mod routing;
mod stats;

// 重新导出公共接口
pub use api::NetApi;
pub use deliver_packet::DeliverPacket;
pub use error::{NetError, SendError};
pub use id::{LinkId, NodeAddr};
pub use link::{Link, LinkParams};
pub use mote::Mote;
pub use mote_events::{MoteCommand, TransportWakeup};
pub use net_world::NetWorld;
pub use network::Network;
pub use packet::{DEFAULT_TTL, FRAME_OVERHEAD_BYTES, Packet};
pub use routing::RoutingTable;
pub use stats::Stats;
