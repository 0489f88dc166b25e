//! 重传定时器
//!
//! 每个连接一个逻辑定时器，表示为一个截止时间；协作式调度在每一轮把它和单调时钟比较，
//! 取消即清空截止时间。

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::sim::SimTime;

/// 超时后的 RTO 调整策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// 每次都使用初始 RTO
    Fixed,
    /// 每次超时翻倍，上限为 `max_rto`
    #[default]
    Exponential,
}

/// 一次到期的处理结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// 继续重传；携带到目前为止的连续超时次数
    Retry(u32),
    /// 连续超时次数达到上限，放弃连接
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    deadline: Option<SimTime>,
    rto: SimTime,
    init_rto: SimTime,
    max_rto: SimTime,
    backoff: Backoff,
    retries: u32,
    max_retries: u32,
}

impl RetransmitTimer {
    pub fn new(init_rto: SimTime, max_rto: SimTime, backoff: Backoff, max_retries: u32) -> Self {
        Self {
            deadline: None,
            rto: init_rto,
            init_rto,
            max_rto: max_rto.max(init_rto),
            backoff,
            retries: 0,
            max_retries,
        }
    }

    /// （重新）启动：截止时间 = now + 当前 RTO
    pub fn arm(&mut self, now: SimTime) {
        let at = now.saturating_add(self.rto);
        trace!(deadline = %at, rto = %self.rto, "arm retransmission timer");
        self.deadline = Some(at);
    }

    /// 仅在未启动时启动
    pub fn arm_if_idle(&mut self, now: SimTime) {
        if self.deadline.is_none() {
            self.arm(now);
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_expired(&self, now: SimTime) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }

    pub fn deadline(&self) -> Option<SimTime> {
        self.deadline
    }

    /// 处理一次到期：计数 +1，达到上限则放弃，否则按策略退避。
    pub fn on_expired(&mut self) -> Expiry {
        self.deadline = None;
        self.retries = self.retries.saturating_add(1);
        if self.retries >= self.max_retries {
            return Expiry::Exhausted;
        }
        if self.backoff == Backoff::Exponential {
            self.rto = self.rto.doubled().min(self.max_rto);
        }
        Expiry::Retry(self.retries)
    }

    /// 收到新的确认（对端仍然存活）：清零重试计数并恢复初始 RTO
    pub fn reset_backoff(&mut self) {
        self.retries = 0;
        self.rto = self.init_rto;
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn rto(&self) -> SimTime {
        self.rto
    }
}
