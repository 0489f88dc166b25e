//! 场景运行器
//!
//! 读入 `ScenarioSpec`，构建拓扑，按时刻下发服务端/客户端/关闭命令，运行仿真并汇总报告。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::{AppCommand, AppReport, ClientConfig};
use crate::net::{MoteCommand, NetError, NetWorld, Network, NodeAddr, Stats};
use crate::proto::{ConfigError, TransportStats};
use crate::sim::{ScenarioSpec, SimTime, Simulator};
use crate::topo::{build_topology, link_params};

/// 支持的场景格式版本
pub const SCHEMA_VERSION: u32 = 1;
/// 未指定 seed 时使用
pub const DEFAULT_SEED: u64 = 1;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("unsupported schema_version {found} (expected {})", SCHEMA_VERSION)]
    UnsupportedSchema { found: u32 },
    #[error("invalid transport config")]
    Config(#[from] ConfigError),
    #[error("cannot build topology")]
    Net(#[from] NetError),
    #[error("{role} refers to unknown mote {addr}")]
    UnknownNode { role: &'static str, addr: NodeAddr },
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoteReport {
    pub addr: NodeAddr,
    pub transport: TransportStats,
    /// 运行结束时仍占用槽位的连接数（含监听者）
    pub open_connections: usize,
    pub apps: Vec<AppReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: Option<String>,
    pub seed: u64,
    pub end_time_ms: u64,
    pub events_executed: u64,
    pub network: Stats,
    pub motes: Vec<MoteReport>,
}

impl ScenarioReport {
    /// 所有服务端会话收到的计数值总数
    pub fn values_received(&self) -> u64 {
        self.server_sessions().map(|s| s.values_received).sum()
    }

    pub fn order_errors(&self) -> u64 {
        self.server_sessions().map(|s| s.order_errors).sum()
    }

    pub fn server_sessions(&self) -> impl Iterator<Item = &super::SessionReport> {
        self.motes.iter().flat_map(|m| {
            m.apps.iter().flat_map(|a| match a {
                AppReport::Server(s) => s.sessions.as_slice(),
                AppReport::Client(_) => &[],
            })
        })
    }

    pub fn clients(&self) -> impl Iterator<Item = (NodeAddr, &super::ClientReport)> {
        self.motes.iter().flat_map(|m| {
            m.apps.iter().filter_map(move |a| match a {
                AppReport::Client(c) => Some((m.addr, c)),
                AppReport::Server(_) => None,
            })
        })
    }

    pub fn mote(&self, addr: NodeAddr) -> Option<&MoteReport> {
        self.motes.iter().find(|m| m.addr == addr)
    }
}

/// 从 JSON 文件读取场景
pub fn load_scenario(path: &Path) -> Result<ScenarioSpec, ScenarioError> {
    let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ScenarioError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[tracing::instrument(skip(spec), fields(name = spec.meta.as_ref().and_then(|m| m.name.as_deref())))]
pub fn run_scenario(spec: &ScenarioSpec) -> Result<ScenarioReport, ScenarioError> {
    if spec.schema_version != SCHEMA_VERSION {
        return Err(ScenarioError::UnsupportedSchema {
            found: spec.schema_version,
        });
    }
    let config = spec.transport.clone().unwrap_or_default();
    config.validate()?;
    let seed = spec.seed.unwrap_or(DEFAULT_SEED);

    let mut net = Network::new(seed);
    net.set_max_payload(config.max_payload);
    let addrs = build_topology(&mut net, &spec.topology, link_params(spec.link.as_ref()), &config)?;
    info!(motes = addrs.len(), links = net.link_count(), seed, "🏗️ 拓扑已构建");

    let check = |role: &'static str, addr: NodeAddr| {
        if net.mote(addr).is_some() {
            Ok(())
        } else {
            Err(ScenarioError::UnknownNode { role, addr })
        }
    };
    for s in &spec.servers {
        check("server", s.node)?;
    }
    for c in &spec.clients {
        check("client", c.node)?;
        check("client target", c.server)?;
    }
    for c in &spec.closes {
        check("close", c.node)?;
    }

    let mut sim = Simulator::default();
    for s in &spec.servers {
        sim.schedule(
            SimTime::from_millis(s.start_ms),
            MoteCommand {
                node: s.node,
                cmd: AppCommand::StartServer { port: s.port },
            },
        );
    }
    for c in &spec.clients {
        sim.schedule(
            SimTime::from_millis(c.start_ms),
            MoteCommand {
                node: c.node,
                cmd: AppCommand::StartClient(ClientConfig {
                    server: c.server,
                    src_port: c.effective_src_port(),
                    dst_port: c.dst_port,
                    transfer: c.transfer,
                    close_when_done: c.close_when_done,
                }),
            },
        );
    }
    for c in &spec.closes {
        sim.schedule(
            SimTime::from_millis(c.at_ms),
            MoteCommand {
                node: c.node,
                cmd: AppCommand::Close {
                    server: c.server,
                    src_port: c.src_port,
                    dst_port: c.dst_port,
                },
            },
        );
    }

    let mut world = NetWorld::new(net);
    match spec.until_ms {
        Some(ms) => sim.run_until(SimTime::from_millis(ms), &mut world),
        None => sim.run(&mut world),
    }

    let net = &world.net;
    let motes = net
        .addrs()
        .filter_map(|addr| net.mote(addr))
        .map(|m| MoteReport {
            addr: m.addr(),
            transport: m.stack().stats().clone(),
            open_connections: m.stack().connection_count(),
            apps: m.reports(),
        })
        .collect();

    let report = ScenarioReport {
        name: spec.meta.as_ref().and_then(|m| m.name.clone()),
        seed,
        end_time_ms: sim.now().as_millis(),
        events_executed: sim.executed(),
        network: net.stats.clone(),
        motes,
    };
    info!(
        end = %sim.now(),
        events = report.events_executed,
        values_received = report.values_received(),
        order_errors = report.order_errors(),
        lost = report.network.lost_pkts,
        "✅ 场景运行完成"
    );
    Ok(report)
}
