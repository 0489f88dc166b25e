//! 仿真核心模块
//!
//! 此模块包含事件驱动仿真的核心组件：仿真时间、事件、世界、仿真器、
//! 确定性随机数以及场景描述。

// 子模块声明
mod event;
mod rng;
mod scenario;
mod simulator;
mod time;

// 重新导出公共接口
pub use event::{Event, World};
pub use rng::{SimRng, mix64};
pub use scenario::{
    CLIENT_PORT_BASE, ClientSpec, CloseSpec, DEFAULT_SERVER_PORT, LinkDefaults, LinkSpec,
    ScenarioMeta, ScenarioSpec, ServerSpec, TopologySpec,
};
pub use simulator::Simulator;
pub use time::SimTime;
