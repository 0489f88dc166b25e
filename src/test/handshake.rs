use super::{A, B, CLIENT_PORT, Pair, SERVER_PORT, events, take};
use crate::proto::{
    ConnKey, Endpoint, Flags, OpenMode, Segment, TcpState, TransportConfig, TransportError,
    TransportEventKind,
};

fn server_key() -> ConnKey {
    ConnKey::new(SERVER_PORT, Endpoint::new(A, CLIENT_PORT))
}

fn open_client(p: &mut Pair) -> crate::proto::ConnHandle {
    p.a.open(CLIENT_PORT, Endpoint::new(B, SERVER_PORT), OpenMode::Active, p.now)
        .expect("active open")
}

#[test]
fn three_way_handshake_sequence_numbers() {
    let mut p = Pair::new();
    let listener = p.b.listen(SERVER_PORT, p.now).expect("listen");
    let cli = open_client(&mut p);
    assert_eq!(p.a.state(cli), Some(TcpState::SynSent));

    let syn = take(&mut p.a);
    assert_eq!(syn.len(), 1);
    let syn = &syn[0];
    assert_eq!(syn.flags, Flags::SYN);
    assert_eq!((syn.src_port, syn.dst_port), (CLIENT_PORT, SERVER_PORT));
    assert_eq!(syn.seq_len(), 1);
    let iss_a = syn.seq;

    p.b.on_receive(A, syn.encode().as_bytes(), p.now);
    let synack = take(&mut p.b);
    assert_eq!(synack.len(), 1);
    let synack = &synack[0];
    assert_eq!(synack.flags, Flags::SYN | Flags::ACK);
    assert_eq!(synack.ack, iss_a.wrapping_add(1));
    assert_eq!(synack.window, 128);

    // 监听者保留，另起一个连接
    assert_eq!(p.b.connection_count(), 2);
    assert_eq!(p.b.state(listener), Some(TcpState::Listen));
    let srv = p.b.find(&server_key()).expect("accepted connection");
    assert_eq!(p.b.state(srv), Some(TcpState::SynReceived));
    let conn = p.b.connection(srv).expect("conn");
    assert_eq!(conn.listener(), Some(listener));
    assert_eq!(conn.irs(), iss_a);

    p.a.on_receive(B, synack.encode().as_bytes(), p.now);
    let ack = take(&mut p.a);
    assert_eq!(ack.len(), 1);
    let ack = &ack[0];
    assert_eq!(ack.flags, Flags::ACK);
    assert_eq!(ack.seq, iss_a.wrapping_add(1));
    assert_eq!(ack.ack, synack.seq.wrapping_add(1));
    assert_eq!(ack.data_len(), 0);
    assert_eq!(p.a.state(cli), Some(TcpState::Established));
    let ev = events(&mut p.a);
    assert_eq!(ev.len(), 1);
    assert_eq!(ev[0].handle, cli);
    assert_eq!(
        ev[0].kind,
        TransportEventKind::ConnectionEstablished { listener: None }
    );

    p.b.on_receive(A, ack.encode().as_bytes(), p.now);
    assert!(take(&mut p.b).is_empty());
    assert_eq!(p.b.state(srv), Some(TcpState::Established));
    let ev = events(&mut p.b);
    assert_eq!(ev.len(), 1);
    assert_eq!(ev[0].handle, srv);
    assert_eq!(ev[0].key, server_key());
    assert_eq!(
        ev[0].kind,
        TransportEventKind::ConnectionEstablished {
            listener: Some(listener)
        }
    );
    assert_eq!(p.a.poll_timeout(), None);
    assert_eq!(p.b.poll_timeout(), None);
}

#[test]
fn lost_final_ack_is_covered_by_the_first_data_segment() {
    let mut p = Pair::new();
    p.b.listen(SERVER_PORT, p.now).expect("listen");
    let cli = open_client(&mut p);

    let mut dropped = false;
    p.run(|from, seg| {
        if from == A && !seg.flags.is_syn() && !dropped {
            dropped = true;
            return false;
        }
        true
    });
    assert!(dropped);
    let srv = p.b.find(&server_key()).expect("accepted");
    assert_eq!(p.a.state(cli), Some(TcpState::Established));
    assert_eq!(p.b.state(srv), Some(TcpState::SynReceived));

    assert_eq!(p.a.send(cli, b"hello", p.now), Ok(5));
    p.run(|_, _| true);
    assert_eq!(p.b.state(srv), Some(TcpState::Established));
    assert_eq!(p.b.receive(srv, 16).expect("receive"), b"hello".to_vec());
    assert_eq!(p.a.connection(cli).expect("conn").in_flight(), 0);
    assert!(
        events(&mut p.b)
            .iter()
            .any(|e| matches!(e.kind, TransportEventKind::ConnectionEstablished { .. }))
    );
}

#[test]
fn lost_syn_ack_is_retransmitted() {
    let mut p = Pair::new();
    p.b.listen(SERVER_PORT, p.now).expect("listen");
    let cli = open_client(&mut p);

    let mut dropped = false;
    p.run(|from, seg| {
        if from == B && seg.flags.is_syn() && !dropped {
            dropped = true;
            return false;
        }
        true
    });
    assert_eq!(p.a.state(cli), Some(TcpState::SynSent));

    assert!(p.fire_next_timer());
    assert_eq!(p.now.as_millis(), 400);
    p.run(|_, _| true);

    let srv = p.b.find(&server_key()).expect("accepted");
    assert_eq!(p.a.state(cli), Some(TcpState::Established));
    assert_eq!(p.b.state(srv), Some(TcpState::Established));
    assert_eq!(p.a.stats().retransmissions, 1);
    assert_eq!(p.b.stats().retransmissions, 1);
    assert_eq!(p.a.poll_timeout(), None);
    assert_eq!(p.b.poll_timeout(), None);
}

#[test]
fn syn_on_established_connection_is_ignored() {
    let mut p = Pair::new();
    let (_cli, srv) = p.connect();
    let stray = Segment::control(CLIENT_PORT, SERVER_PORT, 999, 0, Flags::SYN, 128);
    p.b.on_receive(A, stray.encode().as_bytes(), p.now);
    assert!(take(&mut p.b).is_empty());
    assert!(events(&mut p.b).is_empty());
    assert_eq!(p.b.state(srv), Some(TcpState::Established));
    assert_eq!(p.b.connection_count(), 2);
}

#[test]
fn malformed_segments_are_dropped_silently() {
    let mut p = Pair::new();
    p.b.listen(SERVER_PORT, p.now).expect("listen");
    p.b.on_receive(A, &[1, 2, 3], p.now);

    let mut raw = Segment::control(CLIENT_PORT, SERVER_PORT, 1, 0, Flags::SYN, 128)
        .encode()
        .as_bytes()
        .to_vec();
    raw[15] = 10;
    p.b.on_receive(A, &raw, p.now);

    assert_eq!(p.b.stats().malformed_dropped, 2);
    assert!(take(&mut p.b).is_empty());
    assert!(events(&mut p.b).is_empty());
    assert_eq!(p.b.connection_count(), 1);
}

#[test]
fn open_argument_errors() {
    let mut p = Pair::new();
    assert_eq!(
        p.a.open(CLIENT_PORT, Endpoint::ANY, OpenMode::Active, p.now),
        Err(TransportError::WildcardRemote)
    );
    open_client(&mut p);
    let key = ConnKey::new(CLIENT_PORT, Endpoint::new(B, SERVER_PORT));
    assert_eq!(
        p.a.open(CLIENT_PORT, Endpoint::new(B, SERVER_PORT), OpenMode::Active, p.now),
        Err(TransportError::ConnectionExists(key))
    );
    p.b.listen(SERVER_PORT, p.now).expect("listen");
    assert_eq!(
        p.b.listen(SERVER_PORT, p.now),
        Err(TransportError::ConnectionExists(ConnKey::listener(SERVER_PORT)))
    );
}

#[test]
fn passive_open_for_one_peer() {
    let mut p = Pair::new();
    let srv = p
        .b
        .open(SERVER_PORT, Endpoint::new(A, CLIENT_PORT), OpenMode::Passive, p.now)
        .expect("passive open");
    assert_eq!(p.b.state(srv), Some(TcpState::Listen));
    let cli = open_client(&mut p);
    p.run(|_, _| true);

    assert_eq!(p.a.state(cli), Some(TcpState::Established));
    assert_eq!(p.b.state(srv), Some(TcpState::Established));
    assert_eq!(p.b.connection_count(), 1);
    let ev = events(&mut p.b);
    assert_eq!(
        ev[0].kind,
        TransportEventKind::ConnectionEstablished { listener: None }
    );
}

#[test]
fn syn_without_listener_is_dropped() {
    let mut p = Pair::new();
    let cli = open_client(&mut p);
    p.run(|_, _| true);
    assert_eq!(p.b.stats().unmatched_dropped, 1);
    assert_eq!(p.b.connection_count(), 0);
    assert_eq!(p.a.state(cli), Some(TcpState::SynSent));
}

#[test]
fn accept_fails_when_table_is_full() {
    let b = TransportConfig {
        max_connections: 1,
        ..Default::default()
    };
    let mut p = Pair::with_configs(TransportConfig::default(), b);
    p.b.listen(SERVER_PORT, p.now).expect("listen");
    open_client(&mut p);
    p.run(|_, _| true);
    assert_eq!(p.b.stats().unmatched_dropped, 1);
    assert_eq!(p.b.connection_count(), 1);
    assert!(p.b.find(&server_key()).is_none());
}

#[test]
fn unanswered_syn_times_out() {
    let a = TransportConfig {
        max_retries: 3,
        ..Default::default()
    };
    let mut p = Pair::with_configs(a, TransportConfig::default());
    let cli = open_client(&mut p);
    p.run(|_, _| true);
    while p.fire_next_timer() {
        p.run(|_, _| true);
    }
    assert_eq!(p.a.state(cli), None);
    assert_eq!(p.a.stats().retransmissions, 2);
    assert_eq!(p.a.stats().connections_timed_out, 1);
    let ev = events(&mut p.a);
    assert_eq!(ev.len(), 1);
    assert_eq!(ev[0].kind, TransportEventKind::ConnectionTimedOut);
    // 400 + 800 + 1600
    assert_eq!(p.now.as_millis(), 2800);
}

#[test]
fn simultaneous_open_establishes_both_sides() {
    let mut p = Pair::new();
    let a = open_client(&mut p);
    let b = p
        .b
        .open(SERVER_PORT, Endpoint::new(A, CLIENT_PORT), OpenMode::Active, p.now)
        .expect("open b");
    p.run(|_, _| true);
    assert_eq!(p.a.state(a), Some(TcpState::Established));
    assert_eq!(p.b.state(b), Some(TcpState::Established));
    assert_eq!(p.a.poll_timeout(), None);
    assert_eq!(p.b.poll_timeout(), None);

    assert_eq!(p.a.send(a, b"ping", p.now), Ok(4));
    p.run(|_, _| true);
    assert_eq!(p.b.receive(b, 8).expect("receive"), b"ping".to_vec());
}

#[test]
fn syn_ack_with_wrong_ack_leaves_connection_untouched() {
    let mut p = Pair::new();
    let cli = open_client(&mut p);
    take(&mut p.a);
    let iss = p.a.connection(cli).expect("conn").iss();

    let bogus = Segment::control(
        SERVER_PORT,
        CLIENT_PORT,
        7000,
        iss.wrapping_add(5),
        Flags::SYN | Flags::ACK,
        9,
    );
    p.a.on_receive(B, bogus.encode().as_bytes(), p.now);
    assert!(take(&mut p.a).is_empty());
    let conn = p.a.connection(cli).expect("conn");
    assert_eq!(conn.state(), TcpState::SynSent);
    assert_eq!(conn.peer_window(), 0);
    assert_eq!(conn.irs(), 0);
}
