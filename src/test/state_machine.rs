use crate::proto::{Action, Backoff, Expiry, Input, RetransmitTimer, TcpState, transition};
use crate::sim::SimTime;

fn next(state: TcpState, input: Input) -> Option<TcpState> {
    transition(state, input).map(|t| t.next)
}

#[test]
fn active_open_path() {
    let t = transition(TcpState::Closed, Input::OpenActive).expect("open");
    assert_eq!(t.next, TcpState::SynSent);
    assert_eq!(t.actions, &[Action::SendSyn, Action::ArmTimer]);

    let t = transition(TcpState::SynSent, Input::RecvSynAck).expect("syn-ack");
    assert_eq!(t.next, TcpState::Established);
    assert!(t.actions.contains(&Action::SendAck));
    assert!(t.actions.contains(&Action::NotifyEstablished));
}

#[test]
fn passive_open_path() {
    assert_eq!(next(TcpState::Closed, Input::OpenPassive), Some(TcpState::Listen));
    let t = transition(TcpState::Listen, Input::RecvSyn).expect("syn");
    assert_eq!(t.next, TcpState::SynReceived);
    assert_eq!(t.actions, &[Action::SendSynAck, Action::ArmTimer]);
    assert_eq!(
        next(TcpState::SynReceived, Input::RecvAck),
        Some(TcpState::Established)
    );
}

#[test]
fn close_paths() {
    let t = transition(TcpState::Established, Input::Close).expect("close");
    assert_eq!(t.next, TcpState::FinWait);
    assert_eq!(t.actions, &[Action::QueueFin]);

    let t = transition(TcpState::Established, Input::RecvFin).expect("fin");
    assert_eq!(t.next, TcpState::Closing);
    assert!(t.actions.contains(&Action::NotifyPeerClosed));
    assert_eq!(next(TcpState::Closing, Input::Close), Some(TcpState::FinWait));

    let t = transition(TcpState::FinWait, Input::FinAcked).expect("fin acked");
    assert_eq!(t.next, TcpState::Closed);
    assert!(t.actions.contains(&Action::Release));

    // 握手未完成时关闭直接释放
    for s in [TcpState::Listen, TcpState::SynSent, TcpState::SynReceived] {
        let t = transition(s, Input::Close).expect("close");
        assert_eq!(t.next, TcpState::Closed, "{s}");
        assert!(t.actions.contains(&Action::NotifyClosed));
        assert!(t.actions.contains(&Action::Release));
    }
}

#[test]
fn timeouts_retransmit_or_abort() {
    for s in [
        TcpState::SynSent,
        TcpState::SynReceived,
        TcpState::Established,
        TcpState::FinWait,
        TcpState::Closing,
    ] {
        let t = transition(s, Input::RetryTimeout).expect("retry");
        assert_eq!(t.next, s);
        assert_eq!(t.actions, &[Action::Retransmit, Action::ArmTimer]);

        let t = transition(s, Input::RetriesExhausted).expect("exhausted");
        assert_eq!(t.next, TcpState::Closed);
        assert!(t.actions.contains(&Action::NotifyTimedOut));
    }
    assert!(transition(TcpState::Listen, Input::RetryTimeout).is_none());
    assert!(transition(TcpState::Closed, Input::RetriesExhausted).is_none());
}

#[test]
fn unexpected_inputs_are_ignored() {
    assert!(transition(TcpState::Established, Input::RecvSyn).is_none());
    assert!(transition(TcpState::Closed, Input::Close).is_none());
    assert!(transition(TcpState::Listen, Input::RecvFin).is_none());
    assert!(transition(TcpState::FinWait, Input::Close).is_none());
    assert!(transition(TcpState::Established, Input::OpenActive).is_none());
}

#[test]
fn state_helpers_and_display() {
    assert!(TcpState::Established.can_send());
    assert!(TcpState::Closing.can_send());
    assert!(!TcpState::FinWait.can_send());
    assert!(!TcpState::SynSent.can_send());
    assert!(TcpState::FinWait.is_synchronized());
    assert!(!TcpState::SynReceived.is_synchronized());
    assert_eq!(TcpState::SynReceived.to_string(), "SYN_RECEIVED");
    assert_eq!(TcpState::default(), TcpState::Closed);
}

#[test]
fn exponential_backoff_doubles_up_to_cap() {
    let mut t = RetransmitTimer::new(
        SimTime::from_millis(100),
        SimTime::from_millis(350),
        Backoff::Exponential,
        5,
    );
    t.arm(SimTime::ZERO);
    assert_eq!(t.deadline(), Some(SimTime::from_millis(100)));
    assert!(!t.is_expired(SimTime::from_millis(99)));
    assert!(t.is_expired(SimTime::from_millis(100)));

    assert_eq!(t.on_expired(), Expiry::Retry(1));
    assert!(!t.is_armed());
    assert_eq!(t.rto(), SimTime::from_millis(200));
    assert_eq!(t.on_expired(), Expiry::Retry(2));
    assert_eq!(t.rto(), SimTime::from_millis(350));
    assert_eq!(t.on_expired(), Expiry::Retry(3));
    assert_eq!(t.rto(), SimTime::from_millis(350));

    t.reset_backoff();
    assert_eq!(t.retries(), 0);
    assert_eq!(t.rto(), SimTime::from_millis(100));
}

#[test]
fn fixed_backoff_keeps_rto() {
    let mut t = RetransmitTimer::new(
        SimTime::from_millis(100),
        SimTime::from_millis(800),
        Backoff::Fixed,
        3,
    );
    assert_eq!(t.on_expired(), Expiry::Retry(1));
    assert_eq!(t.rto(), SimTime::from_millis(100));
    assert_eq!(t.on_expired(), Expiry::Retry(2));
    assert_eq!(t.on_expired(), Expiry::Exhausted);
}

#[test]
fn arm_if_idle_keeps_running_deadline() {
    let mut t = RetransmitTimer::new(
        SimTime::from_millis(100),
        SimTime::from_millis(100),
        Backoff::Fixed,
        3,
    );
    t.arm_if_idle(SimTime::ZERO);
    t.arm_if_idle(SimTime::from_millis(50));
    assert_eq!(t.deadline(), Some(SimTime::from_millis(100)));
    t.arm(SimTime::from_millis(50));
    assert_eq!(t.deadline(), Some(SimTime::from_millis(150)));
    t.cancel();
    assert_eq!(t.deadline(), None);
    assert!(!t.is_expired(SimTime::from_secs(10)));
}
