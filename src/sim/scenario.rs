use serde::{Deserialize, Serialize};

use crate::net::NodeAddr;
use crate::proto::TransportConfig;

/// 默认的测试服务端口（与测试脚本一致）
pub const DEFAULT_SERVER_PORT: u16 = 123;
/// 测试客户端默认端口基数：源端口 = 200 + 节点地址
pub const CLIENT_PORT_BASE: u16 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub schema_version: u32,
    #[serde(default)]
    pub meta: Option<ScenarioMeta>,
    pub topology: TopologySpec,
    #[serde(default)]
    pub link: Option<LinkDefaults>,
    #[serde(default)]
    pub transport: Option<TransportConfig>,
    #[serde(default)]
    pub servers: Vec<ServerSpec>,
    #[serde(default)]
    pub clients: Vec<ClientSpec>,
    #[serde(default)]
    pub closes: Vec<CloseSpec>,
    /// Run until this time (ms); defaults to running until the event queue drains
    #[serde(default)]
    pub until_ms: Option<u64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologySpec {
    /// 1 - 2 - ... - n
    Line { nodes: u16 },
    /// rows x cols 网格，地址按行优先从 1 开始
    Grid { rows: u16, cols: u16 },
    Custom {
        nodes: Vec<NodeAddr>,
        links: Vec<LinkSpec>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    pub from: NodeAddr,
    pub to: NodeAddr,
    #[serde(default)]
    pub loss: Option<f64>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    /// 是否同时建立反向链路
    #[serde(default = "default_true")]
    pub bidirectional: bool,
}

/// 链路默认参数（未在 `LinkSpec` 中覆盖时使用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDefaults {
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub bandwidth_bps: Option<u64>,
    #[serde(default)]
    pub loss: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSpec {
    pub node: NodeAddr,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub start_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSpec {
    pub node: NodeAddr,
    pub server: NodeAddr,
    /// 缺省为 200 + 节点地址
    #[serde(default)]
    pub src_port: Option<u16>,
    #[serde(default = "default_server_port")]
    pub dst_port: u16,
    /// 要发送的 16-bit 计数值个数
    #[serde(default = "default_transfer")]
    pub transfer: u16,
    #[serde(default)]
    pub start_ms: u64,
    /// 所有数据交给传输层后自动关闭；为 false 时等待 `closes` 中的命令
    #[serde(default = "default_true")]
    pub close_when_done: bool,
}

impl ClientSpec {
    pub fn effective_src_port(&self) -> u16 {
        self.src_port
            .unwrap_or_else(|| CLIENT_PORT_BASE.wrapping_add(self.node.0))
    }
}

/// 在 `at_ms` 时刻关闭 client 节点上 (src_port -> server:dst_port) 的连接
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSpec {
    pub at_ms: u64,
    pub node: NodeAddr,
    pub server: NodeAddr,
    pub src_port: u16,
    #[serde(default = "default_server_port")]
    pub dst_port: u16,
}

fn default_true() -> bool {
    true
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_transfer() -> u16 {
    1000
}
