//! 连接状态机
//!
//! 完整的迁移表集中在 [`transition`] 这一个纯函数里：
//! 输入 (当前状态, 事件)，输出 (新状态, 副作用列表)。副作用由 `Connection` 执行。
//!
//! ```text
//!  Closed --OpenActive--> SynSent --RecvSynAck--> Established --Close--> FinWait --FinAcked--> Closed
//!  Closed --OpenPassive--> Listen --RecvSyn--> SynReceived --RecvAck--> Established
//!  Established --RecvFin--> Closing --Close--> FinWait
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TcpState {
    #[default]
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    /// 本端已关闭：等待本端 FIN 被确认、对端 FIN 到达；期间仍接收数据
    FinWait,
    /// 对端已关闭，本端发送方向仍然打开
    Closing,
}

impl TcpState {
    /// 应用是否还能写入数据
    pub fn can_send(self) -> bool {
        matches!(self, TcpState::Established | TcpState::Closing)
    }

    /// 握手已完成（序列号已同步）
    pub fn is_synchronized(self) -> bool {
        matches!(
            self,
            TcpState::Established | TcpState::FinWait | TcpState::Closing
        )
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TcpState::Closed => "CLOSED",
            TcpState::Listen => "LISTEN",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynReceived => "SYN_RECEIVED",
            TcpState::Established => "ESTABLISHED",
            TcpState::FinWait => "FIN_WAIT",
            TcpState::Closing => "CLOSING",
        };
        f.write_str(s)
    }
}

/// 驱动状态机的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    OpenActive,
    OpenPassive,
    RecvSyn,
    RecvSynAck,
    /// 确认了本端的 SYN
    RecvAck,
    /// 对端的 FIN 按序到达
    RecvFin,
    /// 本端的 FIN 已被确认，且对端的 FIN 已收到
    FinAcked,
    Close,
    RetryTimeout,
    RetriesExhausted,
}

/// 迁移的副作用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SendSyn,
    SendSynAck,
    SendAck,
    /// FIN 在所有缓冲数据发出后发送
    QueueFin,
    ArmTimer,
    CancelTimer,
    Retransmit,
    NotifyEstablished,
    NotifyPeerClosed,
    NotifyClosed,
    NotifyTimedOut,
    /// 释放连接表槽位
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: TcpState,
    pub actions: &'static [Action],
}

const fn to(next: TcpState, actions: &'static [Action]) -> Option<Transition> {
    Some(Transition { next, actions })
}

/// 迁移表。返回 `None` 表示该事件在当前状态下被忽略。
pub fn transition(state: TcpState, input: Input) -> Option<Transition> {
    use Action::*;
    use Input::*;
    use TcpState::*;

    match (state, input) {
        (Closed, OpenActive) => to(SynSent, &[SendSyn, ArmTimer]),
        (Closed, OpenPassive) => to(Listen, &[]),

        (Listen, RecvSyn) => to(SynReceived, &[SendSynAck, ArmTimer]),
        (Listen, Close) => to(Closed, &[NotifyClosed, Release]),

        (SynSent, RecvSynAck) => to(Established, &[SendAck, CancelTimer, NotifyEstablished]),
        // 同时打开
        (SynSent, RecvSyn) => to(SynReceived, &[SendSynAck, ArmTimer]),
        (SynSent | SynReceived, Close) => to(Closed, &[CancelTimer, NotifyClosed, Release]),

        (SynReceived, RecvAck) => to(Established, &[CancelTimer, NotifyEstablished]),
        // 对端重传了 SYN：我们的 SYN+ACK 丢了
        (SynReceived, RecvSyn) => to(SynReceived, &[SendSynAck]),

        // 我们对 SYN+ACK 的 ACK 丢了，对端重传 SYN+ACK
        (Established, RecvSynAck) => to(Established, &[SendAck]),
        (Established, RecvFin) => to(Closing, &[SendAck, NotifyPeerClosed]),
        (Established | Closing, Close) => to(FinWait, &[QueueFin]),

        (FinWait, RecvFin) => to(FinWait, &[SendAck, NotifyPeerClosed]),
        (FinWait, FinAcked) => to(Closed, &[CancelTimer, NotifyClosed, Release]),

        (s @ (SynSent | SynReceived | Established | FinWait | Closing), RetryTimeout) => {
            to(s, &[Retransmit, ArmTimer])
        }
        (SynSent | SynReceived | Established | FinWait | Closing, RetriesExhausted) => {
            to(Closed, &[CancelTimer, NotifyTimedOut, Release])
        }

        _ => None,
    }
}
