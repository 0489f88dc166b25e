//! 连接表
//!
//! 定长槽位数组 + 代数（generation）句柄：槽位被释放并复用后，旧句柄不会误指新连接。

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::TransportError;
use crate::net::NodeAddr;

/// 对端端点：(地址, 端口)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: NodeAddr,
    pub port: u16,
}

impl Endpoint {
    /// 通配端点：监听者用它表示“任意对端”
    pub const ANY: Endpoint = Endpoint {
        addr: NodeAddr::BROADCAST,
        port: 0,
    };

    pub fn new(addr: NodeAddr, port: u16) -> Self {
        Self { addr, port }
    }

    pub fn is_any(&self) -> bool {
        *self == Endpoint::ANY
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("*:*")
        } else {
            write!(f, "{}:{}", self.addr, self.port)
        }
    }
}

/// 连接的唯一键：(本地端口, 对端地址, 对端端口)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnKey {
    pub local_port: u16,
    pub remote: Endpoint,
}

impl ConnKey {
    pub fn new(local_port: u16, remote: Endpoint) -> Self {
        Self { local_port, remote }
    }

    pub fn listener(local_port: u16) -> Self {
        Self {
            local_port,
            remote: Endpoint::ANY,
        }
    }

    pub fn is_listener(&self) -> bool {
        self.remote.is_any()
    }
}

impl fmt::Display for ConnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{} <-> {}", self.local_port, self.remote)
    }
}

/// 连接句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnHandle {
    pub slot: u16,
    pub generation: u32,
}

impl fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.slot, self.generation)
    }
}

/// 表中条目需要提供自己的键
pub trait Keyed {
    fn key(&self) -> ConnKey;
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

#[derive(Debug)]
pub struct ConnTable<T> {
    slots: Vec<Slot<T>>,
    len: usize,
}

impl<T: Keyed> ConnTable<T> {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity.min(u16::MAX as usize))
            .map(|_| Slot {
                generation: 0,
                entry: None,
            })
            .collect();
        Self { slots, len: 0 }
    }

    /// 精确匹配
    pub fn find(&self, key: &ConnKey) -> Option<ConnHandle> {
        self.slots.iter().enumerate().find_map(|(i, s)| {
            s.entry
                .as_ref()
                .filter(|e| e.key() == *key)
                .map(|_| ConnHandle {
                    slot: i as u16,
                    generation: s.generation,
                })
        })
    }

    /// 本地端口上的通配监听者
    pub fn find_listener(&self, local_port: u16) -> Option<ConnHandle> {
        self.find(&ConnKey::listener(local_port))
    }

    pub fn insert(&mut self, entry: T) -> Result<ConnHandle, TransportError> {
        let key = entry.key();
        if self.find(&key).is_some() {
            return Err(TransportError::ConnectionExists(key));
        }
        let capacity = self.capacity();
        let Some((i, slot)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.entry.is_none())
        else {
            return Err(TransportError::TableFull { capacity });
        };
        slot.entry = Some(entry);
        self.len += 1;
        Ok(ConnHandle {
            slot: i as u16,
            generation: slot.generation,
        })
    }

    /// 释放槽位；代数加一使旧句柄失效
    pub fn remove(&mut self, handle: ConnHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.len -= 1;
        Some(entry)
    }

    pub fn get(&self, handle: ConnHandle) -> Option<&T> {
        let slot = self.slots.get(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub fn get_mut(&mut self, handle: ConnHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// 当前所有有效句柄
    pub fn handles(&self) -> Vec<ConnHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entry.is_some())
            .map(|(i, s)| ConnHandle {
                slot: i as u16,
                generation: s.generation,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.entry.as_ref().map(|e| {
                (
                    ConnHandle {
                        slot: i as u16,
                        generation: s.generation,
                    },
                    e,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
