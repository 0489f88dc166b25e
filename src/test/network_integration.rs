use crate::net::{LinkParams, NetWorld, Network, NodeAddr, SendError};
use crate::proto::{ConnKey, Endpoint, OpenMode, TcpState, TransportConfig};
use crate::sim::{SimTime, Simulator};
use crate::topo::build_line;

use super::pattern;

fn line(n: u16, params: LinkParams, config: &TransportConfig, seed: u64) -> NetWorld {
    let mut net = Network::new(seed);
    build_line(&mut net, n, params, config).expect("line topology");
    NetWorld::new(net)
}

#[test]
fn link_serializes_frames_and_adds_latency() {
    let mut world = line(2, LinkParams::default(), &TransportConfig::default(), 1);
    let mut sim = Simulator::default();
    // 两个 16 字节载荷（+11 字节帧头）同时发出
    for _ in 0..2 {
        world
            .net
            .send_from(NodeAddr(1), NodeAddr(2), &[0u8; 16], &mut sim)
            .expect("send");
    }
    sim.run(&mut world);

    // 27 字节 @ 250 kbps = 864 µs；第二帧排在第一帧之后
    assert_eq!(sim.now(), SimTime::from_micros(864 * 2 + 1000));
    assert_eq!(world.net.stats.sent_pkts, 2);
    assert_eq!(world.net.stats.delivered_pkts, 2);
    assert_eq!(world.net.stats.delivered_bytes, 32);
    let dst = world.net.mote(NodeAddr(2)).expect("mote");
    assert_eq!(dst.stack().stats().unmatched_dropped, 2);
}

#[test]
fn packets_are_forwarded_hop_by_hop() {
    let mut world = line(4, LinkParams::default(), &TransportConfig::default(), 1);
    assert_eq!(
        world.net.route(NodeAddr(1), NodeAddr(4)),
        Some(vec![NodeAddr(1), NodeAddr(2), NodeAddr(3), NodeAddr(4)])
    );
    let mut sim = Simulator::default();
    world
        .net
        .send_from(NodeAddr(1), NodeAddr(4), &[0u8; 16], &mut sim)
        .expect("send");
    sim.run(&mut world);
    let s = &world.net.stats;
    assert_eq!(s.sent_pkts, 1);
    assert_eq!(s.forwarded_pkts, 2);
    assert_eq!(s.delivered_pkts, 1);
    assert_eq!(sim.now(), SimTime::from_micros(3 * (864 + 1000)));
}

#[test]
fn send_errors_are_counted() {
    let mut net = Network::new(1);
    let cfg = TransportConfig::default();
    net.add_mote(NodeAddr(1), cfg.clone()).expect("add");
    net.add_mote(NodeAddr(2), cfg.clone()).expect("add");
    let mut sim = Simulator::default();

    assert_eq!(
        net.send_from(NodeAddr(1), NodeAddr(2), &[0u8; 57], &mut sim),
        Err(SendError::Oversize { len: 57, max: 56 })
    );
    assert_eq!(
        net.send_from(NodeAddr(1), NodeAddr(2), &[0u8; 16], &mut sim),
        Err(SendError::NoRoute {
            from: NodeAddr(1),
            dst: NodeAddr(2)
        })
    );
    assert_eq!(net.stats.oversize_pkts, 1);
    assert_eq!(net.stats.no_route_pkts, 1);
    assert_eq!(net.stats.sent_pkts, 0);
    assert_eq!(sim.pending(), 0);

    assert!(net.add_mote(NodeAddr(1), cfg.clone()).is_err());
    assert!(net.add_mote(NodeAddr::BROADCAST, cfg).is_err());
}

#[test]
fn ttl_limits_the_path_length() {
    let mut world = line(4, LinkParams::default(), &TransportConfig::default(), 1);
    world.net.set_ttl(2);
    let mut sim = Simulator::default();
    world
        .net
        .send_from(NodeAddr(1), NodeAddr(4), &[0u8; 16], &mut sim)
        .expect("send");
    sim.run(&mut world);
    assert_eq!(world.net.stats.ttl_expired_pkts, 1);
    assert_eq!(world.net.stats.delivered_pkts, 0);
}

#[test]
fn loopback_is_delivered_immediately() {
    let mut world = line(1, LinkParams::default(), &TransportConfig::default(), 1);
    let mut sim = Simulator::default();
    world
        .net
        .send_from(NodeAddr(1), NodeAddr(1), &[0u8; 16], &mut sim)
        .expect("send");
    sim.run(&mut world);
    assert_eq!(sim.now(), SimTime::ZERO);
    assert_eq!(world.net.stats.delivered_pkts, 1);
}

#[test]
fn lossy_link_drops_every_frame_at_full_loss() {
    let params = LinkParams {
        loss: 1.0,
        ..Default::default()
    };
    let mut world = line(2, params, &TransportConfig::default(), 1);
    let mut sim = Simulator::default();
    for _ in 0..5 {
        world
            .net
            .send_from(NodeAddr(1), NodeAddr(2), &[0u8; 16], &mut sim)
            .expect("send");
    }
    sim.run(&mut world);
    assert_eq!(world.net.stats.lost_pkts, 5);
    assert_eq!(world.net.stats.delivered_pkts, 0);
}

/// 在 1 - 2 - 3 上把 `data` 从 mote 1 送到 mote 3 的监听端口
fn transfer_over_line(params: LinkParams, config: TransportConfig, seed: u64, data: &[u8]) -> (NetWorld, Vec<u8>) {
    let mut world = line(3, params, &config, seed);
    let mut sim = Simulator::default();
    let (client, server) = (NodeAddr(1), NodeAddr(3));

    world
        .net
        .with_stack(server, &mut sim, |s, now| s.listen(123, now))
        .expect("server mote")
        .expect("listen");
    let cli = world
        .net
        .with_stack(client, &mut sim, |s, now| {
            s.open(201, Endpoint::new(server, 123), OpenMode::Active, now)
        })
        .expect("client mote")
        .expect("open");
    sim.run(&mut world);
    assert_eq!(
        world.net.mote(client).and_then(|m| m.stack().state(cli)),
        Some(TcpState::Established)
    );

    let written = world
        .net
        .with_stack(client, &mut sim, |s, now| s.send(cli, data, now))
        .expect("client mote")
        .expect("send");
    assert_eq!(written, data.len());
    sim.run(&mut world);

    let key = ConnKey::new(123, Endpoint::new(client, 201));
    let srv = world
        .net
        .mote(server)
        .and_then(|m| m.stack().find(&key))
        .expect("accepted connection");
    let received = world
        .net
        .with_stack(server, &mut sim, |s, _| s.receive(srv, 1024))
        .expect("server mote")
        .expect("receive");
    (world, received)
}

#[test]
fn stream_crosses_two_hops_without_loss() {
    let data = pattern(128);
    let (world, received) = transfer_over_line(LinkParams::default(), TransportConfig::default(), 1, &data);
    assert_eq!(received, data);
    assert_eq!(world.net.stats.lost_pkts, 0);
    let client = world.net.mote(NodeAddr(1)).expect("mote");
    assert_eq!(client.stack().stats().retransmissions, 0);
}

#[test]
fn stream_survives_lossy_hops() {
    let params = LinkParams {
        loss: 0.1,
        ..Default::default()
    };
    let config = TransportConfig {
        max_retries: 16,
        ..Default::default()
    };
    let data = pattern(128);
    let mut lost = 0;
    for seed in [1, 2, 3] {
        let (world, received) = transfer_over_line(params, config.clone(), seed, &data);
        assert_eq!(received, data, "seed {seed}");
        lost += world.net.stats.lost_pkts;
    }
    assert!(lost > 0);
}
