//! 传输层配置
//!
//! 所有字段都有默认值；场景 JSON 里可以只写需要覆盖的字段。

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::segment::{HEADER_LEN, MAX_DATA};
use super::timer::Backoff;
use crate::sim::SimTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 下层一次能携带的最大载荷（字节）
    pub max_payload: usize,
    pub send_buffer_bytes: usize,
    pub recv_buffer_bytes: usize,
    /// 连接表槽位数（监听者也占一个槽位）
    pub max_connections: usize,
    pub init_rto_ms: u64,
    pub max_rto_ms: u64,
    pub backoff: Backoff,
    /// 连续超时达到该次数即放弃连接
    pub max_retries: u32,
    /// 初始序列号的种子
    pub isn_seed: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload: HEADER_LEN + MAX_DATA,
            send_buffer_bytes: 128,
            recv_buffer_bytes: 128,
            max_connections: 8,
            init_rto_ms: 400,
            max_rto_ms: 6400,
            backoff: Backoff::Exponential,
            max_retries: 8,
            isn_seed: 0x5EED_0F_7C9,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload <= HEADER_LEN {
            return Err(ConfigError::PayloadTooSmall {
                max_payload: self.max_payload,
            });
        }
        for (field, value) in [
            ("send_buffer_bytes", self.send_buffer_bytes),
            ("recv_buffer_bytes", self.recv_buffer_bytes),
            ("max_connections", self.max_connections),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.init_rto_ms == 0 {
            return Err(ConfigError::Zero {
                field: "init_rto_ms",
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Zero {
                field: "max_retries",
            });
        }
        if self.max_rto_ms < self.init_rto_ms {
            return Err(ConfigError::RtoRange {
                init: self.init_rto_ms,
                max: self.max_rto_ms,
            });
        }
        if self.recv_buffer_bytes > u16::MAX as usize {
            return Err(ConfigError::WindowOverflow {
                field: "recv_buffer_bytes",
                value: self.recv_buffer_bytes,
            });
        }
        Ok(())
    }

    /// MSS = 最大载荷 - 头部，且不超过分段的数据容量
    pub fn mss(&self) -> usize {
        self.max_payload.saturating_sub(HEADER_LEN).min(MAX_DATA)
    }

    pub fn init_rto(&self) -> SimTime {
        SimTime::from_millis(self.init_rto_ms)
    }

    pub fn max_rto(&self) -> SimTime {
        SimTime::from_millis(self.max_rto_ms)
    }
}
