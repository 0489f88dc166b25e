//! mote 相关事件：定时器唤醒与外部命令

use super::id::NodeAddr;
use super::net_world::NetWorld;
use crate::app::AppCommand;
use crate::sim::{Event, Simulator, World};

/// 事件：传输栈的某个定时器到期
#[derive(Debug)]
pub struct TransportWakeup {
    pub node: NodeAddr,
}

impl Event for TransportWakeup {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.wake(self.node, sim);
    }
}

/// 事件：在指定时刻把命令交给某个 mote
#[derive(Debug)]
pub struct MoteCommand {
    pub node: NodeAddr,
    pub cmd: AppCommand,
}

impl Event for MoteCommand {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let MoteCommand { node, cmd } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.net.command(node, cmd, sim);
    }
}
