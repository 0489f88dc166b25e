//! mote 上运行的应用
//!
//! 应用只通过 `TransportStack` 的公开接口使用传输层；
//! mote 在每次输入之后把通知分发给应用，再调用 `poll` 让应用读写数据。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::NodeAddr;
use crate::proto::{TransportEvent, TransportStack};
use crate::sim::SimTime;

mod client;
mod runner;
mod server;

pub use client::{ClientReport, TestClient};
pub use runner::{
    DEFAULT_SEED, MoteReport, SCHEMA_VERSION, ScenarioError, ScenarioReport, load_scenario,
    run_scenario,
};
pub use server::{ServerReport, SessionReport, TestServer};

/// 外部（场景脚本）发给 mote 的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    StartServer {
        port: u16,
    },
    StartClient(ClientConfig),
    /// 关闭 (src_port -> server:dst_port) 的连接
    Close {
        server: NodeAddr,
        src_port: u16,
        dst_port: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: NodeAddr,
    pub src_port: u16,
    pub dst_port: u16,
    /// 要发送的计数值个数（0..transfer）
    pub transfer: u16,
    pub close_when_done: bool,
}

/// 连接的最终去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "app", rename_all = "snake_case")]
pub enum AppReport {
    Server(ServerReport),
    Client(ClientReport),
}

pub trait MoteApp: Send + fmt::Debug {
    fn on_start(&mut self, stack: &mut TransportStack, now: SimTime);

    fn on_event(&mut self, ev: &TransportEvent, stack: &mut TransportStack, now: SimTime);

    /// 读写数据；每次输入处理完后调用
    fn poll(&mut self, _stack: &mut TransportStack, _now: SimTime) {}

    /// 返回 true 表示命令已被处理
    fn on_command(&mut self, _cmd: &AppCommand, _stack: &mut TransportStack, _now: SimTime) -> bool {
        false
    }

    fn report(&self) -> AppReport;
}
