//! 网络世界实现
//!
//! 仿真世界只持有 mote 网络。

use super::network::Network;
use crate::sim::World;
use std::any::Any;

#[derive(Debug, Default)]
pub struct NetWorld {
    pub net: Network,
}

impl NetWorld {
    pub fn new(net: Network) -> Self {
        Self { net }
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
