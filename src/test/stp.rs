use std::collections::{HashMap, HashSet, VecDeque};

use crate::addr::MacAddr;
use crate::net::{DeviceId, LinkParams, NetError, Network, Packet, Payload, PortId};
use crate::sim::{SimConfig, Simulator};
use crate::stp::{PortRole, PortState, path_cost_for_speed, port_id};
use crate::topo::ring::{RingOpts, build_ring};

/// 只看转发态端口时，交换机之间的连通图必须是一棵树（无环且连通）
fn assert_spanning_tree(net: &Network, switches: &[DeviceId]) {
    let forwards = |p: PortId| {
        net.device(p.device)
            .ok()
            .and_then(|d| d.stp.as_ref())
            .is_some_and(|s| s.forwards(p.index))
    };
    let mut adj: HashMap<DeviceId, Vec<DeviceId>> = HashMap::new();
    let mut edges = 0;
    for c in net.connections() {
        if c.up && forwards(c.a) && forwards(c.b) {
            adj.entry(c.a.device).or_default().push(c.b.device);
            adj.entry(c.b.device).or_default().push(c.a.device);
            edges += 1;
        }
    }
    assert_eq!(edges, switches.len() - 1, "forwarding edges must form a tree");

    let mut seen = HashSet::from([switches[0]]);
    let mut queue = VecDeque::from([switches[0]]);
    while let Some(d) = queue.pop_front() {
        for n in adj.get(&d).into_iter().flatten() {
            if seen.insert(*n) {
                queue.push_back(*n);
            }
        }
    }
    assert_eq!(seen.len(), switches.len(), "tree must span every switch");
}

#[test]
fn ring_converges_to_loop_free_tree() {
    let mut net = Network::new();
    let ring = build_ring(&mut net, &RingOpts::default()).unwrap();
    assert_spanning_tree(&net, &ring.switches);

    let blocked: usize = ring
        .switches
        .iter()
        .map(|s| {
            let stp = net.device(*s).unwrap().stp.as_ref().unwrap();
            stp.ports.iter().filter(|p| p.state == PortState::Blocking).count()
        })
        .sum();
    assert_eq!(blocked, 1);
}

#[test]
fn lowest_bridge_id_becomes_root() {
    let mut net = Network::new();
    let ring = build_ring(&mut net, &RingOpts::default()).unwrap();
    // 优先级相同，MAC 最小者（最先创建的 s0）为根
    let root = net.device(ring.switches[0]).unwrap().stp.as_ref().unwrap().bridge_id;
    for s in &ring.switches {
        let stp = net.device(*s).unwrap().stp.as_ref().unwrap();
        assert_eq!(stp.root_id, root);
    }
    let s0 = net.device(ring.switches[0]).unwrap().stp.as_ref().unwrap();
    assert!(s0.is_root());
    assert_eq!(s0.root_port, None);
    assert_eq!(s0.root_path_cost, 0);
    assert!(s0.ports[..2].iter().all(|p| p.role == PortRole::Designated));

    net.set_bridge_priority(ring.switches[2], 4096).unwrap();
    let s2 = net.device(ring.switches[2]).unwrap().stp.as_ref().unwrap().clone();
    assert!(s2.is_root());
    for s in &ring.switches {
        let stp = net.device(*s).unwrap().stp.as_ref().unwrap();
        assert_eq!(stp.root_id, s2.bridge_id);
        if *s != ring.switches[2] {
            let rp = stp.root_port.unwrap();
            assert_eq!(stp.ports[rp].role, PortRole::Root);
            assert_eq!(stp.root_path_cost % path_cost_for_speed(100), 0);
        }
    }
    assert_spanning_tree(&net, &ring.switches);
}

#[test]
fn priority_must_be_a_multiple_of_4096() {
    let mut net = Network::new();
    let s = net.add_switch("s");
    let r = net.add_router("r");
    assert!(matches!(
        net.set_bridge_priority(s, 1000),
        Err(NetError::InvalidBridgePriority(1000))
    ));
    assert!(matches!(
        net.set_bridge_priority(s, 65536),
        Err(NetError::InvalidBridgePriority(_))
    ));
    assert!(matches!(net.set_bridge_priority(r, 4096), Err(NetError::Unsupported { .. })));
    assert!(matches!(
        net.set_port_cost(PortId::new(s, 0), Some(0)),
        Err(NetError::InvalidPathCost(0))
    ));
}

#[test]
fn cutting_the_ring_unblocks_every_port() {
    let mut net = Network::new();
    let ring = build_ring(&mut net, &RingOpts::default()).unwrap();
    let before: Vec<u64> = ring
        .switches
        .iter()
        .map(|s| net.device(*s).unwrap().stp.as_ref().unwrap().topology_changes)
        .collect();

    net.remove_connection(ring.links[1]).unwrap();

    for (s, old) in ring.switches.iter().zip(before) {
        let stp = net.device(*s).unwrap().stp.as_ref().unwrap();
        assert!(stp.topology_changes > old);
        assert!(stp.ports.iter().all(|p| p.state != PortState::Blocking));
    }
    assert_spanning_tree(&net, &ring.switches);
}

#[test]
fn port_cost_override_moves_the_blocked_port() {
    let mut net = Network::new();
    let ring = build_ring(&mut net, &RingOpts::default()).unwrap();
    let blocked = |net: &Network| -> Vec<PortId> {
        ring.switches
            .iter()
            .flat_map(|s| {
                let stp = net.device(*s).unwrap().stp.as_ref().unwrap();
                stp.ports
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.state == PortState::Blocking)
                    .map(|(i, _)| PortId::new(*s, i))
                    .collect::<Vec<_>>()
            })
            .collect()
    };
    let original = blocked(&net);

    // s1 到根的直连链路变得很贵，阻塞点随之移动
    let s1 = ring.switches[1];
    let to_root = net.device(s1).unwrap().stp.as_ref().unwrap().root_port.unwrap();
    net.set_port_cost(PortId::new(s1, to_root), Some(1000)).unwrap();
    let moved = blocked(&net);
    assert_eq!(moved.len(), 1);
    assert_ne!(moved, original);
    assert_spanning_tree(&net, &ring.switches);

    net.set_port_cost(PortId::new(s1, to_root), None).unwrap();
    assert_eq!(blocked(&net), original);
}

#[test]
fn bpdus_go_out_forwarding_ports_only() {
    let mut net = Network::new();
    let ring = build_ring(&mut net, &RingOpts::default()).unwrap();
    for s in &ring.switches {
        let stp = net.device(*s).unwrap().stp.as_ref().unwrap().clone();
        let bpdus = net.generate_bpdus(*s).unwrap();
        let forwarding = stp.ports.iter().filter(|p| p.state == PortState::Forwarding).count();
        assert_eq!(bpdus.len(), forwarding);
        for pkt in &bpdus {
            assert_eq!(pkt.dst_mac, MacAddr::STP_MULTICAST);
            let Payload::Stp(bpdu) = &pkt.payload else {
                panic!("not a BPDU");
            };
            assert_eq!(bpdu.root_bridge_id, stp.root_id);
            assert_eq!(bpdu.sender_bridge_id, stp.bridge_id);
            assert_eq!(bpdu.port_id, port_id(128, pkt.egress.unwrap().index));
        }
    }
    let h = net.add_host("h");
    assert!(net.generate_bpdus(h).unwrap().is_empty());
}

#[test]
fn hello_bpdus_are_absorbed_by_neighbours() {
    let mut net = Network::new();
    let ring = build_ring(&mut net, &RingOpts::default()).unwrap();
    let cfg = SimConfig {
        stp_hello_ticks: Some(1),
        ..SimConfig::default()
    };
    let mut sim = Simulator::new(cfg).unwrap();
    sim.run_ticks(&mut net, 3);

    let received: u64 = ring
        .switches
        .iter()
        .flat_map(|s| net.device(*s).unwrap().stp.as_ref().unwrap().ports.clone())
        .map(|p| p.bpdus_received)
        .sum();
    assert!(received > 0);
    assert_eq!(net.stats.dropped_pkts, net.stats.drops.get("stp_blocked").copied().unwrap_or(0));
    // 拓扑未变，根不变
    assert!(net.device(ring.switches[0]).unwrap().stp.as_ref().unwrap().is_root());
}

/// 在环上发一个广播帧，返回 `max_ticks` 之后仍在途的包数
fn broadcast_on_ring(stp: bool, max_ticks: u64) -> (usize, u64) {
    let mut net = Network::new();
    let ring = build_ring(&mut net, &RingOpts::default()).unwrap();
    let h = net.add_host("h");
    net.connect(h, ring.switches[0], LinkParams::default()).unwrap();
    if !stp {
        for s in &ring.switches {
            net.set_stp_enabled(*s, false).unwrap();
        }
    }
    let mut pkt = Packet::originate(h, Payload::Raw);
    pkt.src_mac = net.device(h).unwrap().primary_mac();
    pkt.dst_mac = MacAddr::BROADCAST;

    let mut sim = Simulator::default();
    sim.inject(&mut net, pkt);
    let ticks = sim.run_until_idle(&mut net, max_ticks);
    (sim.in_flight(), ticks)
}

#[test]
fn broadcast_dies_out_with_stp() {
    let (in_flight, ticks) = broadcast_on_ring(true, 100);
    assert_eq!(in_flight, 0);
    assert!(ticks < 100);
}

#[test]
fn broadcast_storms_without_stp() {
    let (in_flight, ticks) = broadcast_on_ring(false, 50);
    assert_eq!(ticks, 50);
    assert!(in_flight > 0);
}

#[test]
fn disabled_bridge_forwards_on_every_port() {
    let mut net = Network::new();
    let ring = build_ring(&mut net, &RingOpts::default()).unwrap();
    let s = ring.switches[2];
    net.set_stp_enabled(s, false).unwrap();
    let stp = net.device(s).unwrap().stp.as_ref().unwrap();
    assert!(!stp.enabled);
    assert!((0..8).all(|i| stp.forwards(i)));
    assert!(stp.is_root());
    // 其余三台桥的链状拓扑仍然无环
    let others: Vec<_> = ring.switches.iter().copied().filter(|d| *d != s).collect();
    for d in &others {
        let stp = net.device(*d).unwrap().stp.as_ref().unwrap();
        assert!(stp.ports.iter().all(|p| p.state != PortState::Blocking));
    }
}
