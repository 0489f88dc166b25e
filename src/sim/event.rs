//! 事件与世界 trait
//!
//! 定义仿真事件接口，以及由业务层实现的仿真世界接口。

use super::simulator::Simulator;
use std::any::Any;

/// 事件：可被调度执行。使用 `self: Box<Self>` 以支持 move/所有权转移。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}

/// 仿真世界：由业务层实现（例如 mote 网络）。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}
