//! 完整流程：意图 → 多 tick 调度 → 交付

use crate::net::{DeviceKind, LinkParams, Network, Payload, PortId};
use crate::sim::Simulator;
use crate::topo::lan::{Lan, LanOpts, build_lan, prime_tables};

fn lan(hosts: usize) -> (Network, Lan) {
    let mut net = Network::new();
    let lan = build_lan(
        &mut net,
        &LanOpts {
            hosts,
            ..LanOpts::default()
        },
    )
    .unwrap();
    (net, lan)
}

fn replies_at(sim: &Simulator, dev: crate::net::DeviceId) -> usize {
    sim.history()
        .filter(|p| p.icmp_type() == Some(0) && p.current_device == Some(dev))
        .count()
}

#[test]
fn primed_ping_needs_no_arp() {
    let (mut net, lan) = lan(2);
    prime_tables(&mut net, &lan).unwrap();
    let mut sim = Simulator::default();
    sim.send_ping(&mut net, lan.hosts[0], "192.168.1.20", 1).unwrap();
    let ticks = sim.run_until_idle(&mut net, 200);

    assert!(ticks < 200);
    assert_eq!(replies_at(&sim, lan.hosts[0]), 1);
    assert_eq!(net.stats.buffered_pkts, 0);
    assert_eq!(net.stats.dropped_pkts, 0);
    let reply = sim.history().last().unwrap();
    assert_eq!(reply.path, vec![lan.hosts[1], lan.switch, lan.hosts[0]]);
    assert_eq!(reply.src_ip, Some(lan.addrs[1]));
}

#[test]
fn cold_ping_resolves_arp_first() {
    let (mut net, lan) = lan(3);
    let mut sim = Simulator::default();
    sim.send_ping(&mut net, lan.hosts[0], "192.168.1.20", 1).unwrap();
    sim.run_until_idle(&mut net, 200);

    assert_eq!(replies_at(&sim, lan.hosts[0]), 1);
    assert_eq!(net.stats.buffered_pkts, 1);
    assert_eq!(net.stats.released_pkts, 1);
    // 旁观的主机也从广播请求里学到了发送方
    assert!(net.device(lan.hosts[2]).unwrap().arp.lookup(lan.addrs[0]).is_some());
    assert!(net.device(lan.hosts[0]).unwrap().arp.lookup(lan.addrs[2]).is_none());
    let sw = net.device(lan.switch).unwrap();
    assert_eq!(sw.mac_table.entries().len(), 2);
}

#[test]
fn repeated_pings_all_answered() {
    let (mut net, lan) = lan(2);
    let mut sim = Simulator::default();
    for seq in 1..=4 {
        sim.send_ping(&mut net, lan.hosts[0], "h1", seq).unwrap();
        sim.run_until_idle(&mut net, 200);
    }
    assert_eq!(replies_at(&sim, lan.hosts[0]), 4);
    // 只有第一次需要 ARP
    assert_eq!(net.stats.buffered_pkts, 1);
    let seqs: Vec<u16> = sim
        .history()
        .filter_map(|p| match &p.payload {
            Payload::Icmp(m) if m.icmp_type == 0 => Some(m.seq),
            _ => None,
        })
        .collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
}

#[test]
fn udp_datagram_is_delivered() {
    let (mut net, lan) = lan(2);
    let mut sim = Simulator::default();
    sim.send_udp(&mut net, lan.hosts[0], "192.168.1.20", 5353, 200).unwrap();
    sim.run_until_idle(&mut net, 200);

    let got = sim
        .history()
        .find(|p| matches!(p.payload, Payload::Udp { .. }))
        .unwrap();
    assert_eq!(got.current_device, Some(lan.hosts[1]));
    assert_eq!(got.dst_port, Some(5353));
    assert!(got.size_bytes >= 242);
}

#[test]
fn l3_switch_routes_between_vlans() {
    let mut net = Network::new();
    let core = net.add_device(DeviceKind::L3Switch, "core");
    let a = net.add_host("a");
    let b = net.add_host("b");
    net.configure_interface(PortId::new(a, 0), "10.10.0.10", "24", Some("10.10.0.1")).unwrap();
    net.configure_interface(PortId::new(b, 0), "10.20.0.10", "24", Some("10.20.0.1")).unwrap();
    net.connect(a, core, LinkParams::default()).unwrap();
    net.connect(b, core, LinkParams::default()).unwrap();

    net.create_vlan(core, 10, "users").unwrap();
    net.create_vlan(core, 20, "").unwrap();
    net.set_access_vlan(PortId::new(core, 0), 10).unwrap();
    net.set_access_vlan(PortId::new(core, 1), 20).unwrap();
    net.create_svi(core, 10, "10.10.0.1", "24").unwrap();
    net.create_svi(core, 20, "10.20.0.1", "24").unwrap();

    let mut sim = Simulator::default();
    sim.send_ping(&mut net, a, "10.20.0.10", 1).unwrap();
    sim.run_until_idle(&mut net, 300);

    let reply = sim
        .history()
        .find(|p| p.icmp_type() == Some(0) && p.current_device == Some(a))
        .unwrap();
    assert_eq!(reply.ttl, 63);
    assert_eq!(reply.src_ip, Some("10.20.0.10".parse().unwrap()));
    // 回复帧的源 MAC 是 VLAN 10 的 SVI
    let svi_mac = net.device(core).unwrap().svi(10).unwrap().mac;
    assert_eq!(reply.src_mac, svi_mac);
}

#[test]
fn same_vlan_hosts_cannot_reach_other_vlan_without_svi() {
    let mut net = Network::new();
    let sw = net.add_switch("access");
    let a = net.add_host("a");
    let b = net.add_host("b");
    net.configure_interface(PortId::new(a, 0), "10.0.0.10", "24", None).unwrap();
    net.configure_interface(PortId::new(b, 0), "10.0.0.20", "24", None).unwrap();
    net.connect(a, sw, LinkParams::default()).unwrap();
    net.connect(b, sw, LinkParams::default()).unwrap();
    net.create_vlan(sw, 30, "").unwrap();
    net.set_access_vlan(PortId::new(sw, 1), 30).unwrap();

    let mut sim = Simulator::default();
    sim.send_ping(&mut net, a, "10.0.0.20", 1).unwrap();
    sim.run_until_idle(&mut net, 200);

    assert_eq!(replies_at(&sim, a), 0);
    // ARP 请求在 VLAN 1 内没有其他出口
    assert_eq!(net.stats.drops.get("no_egress"), Some(&1));
    assert_eq!(sim.packets().len(), 1);
}

#[test]
fn l3_switch_answers_on_addressed_port() {
    let mut net = Network::new();
    let core = net.add_device(DeviceKind::L3Switch, "core");
    let h = net.add_host("h");
    net.configure_interface(PortId::new(h, 0), "10.0.0.10", "24", None).unwrap();
    net.connect(h, core, LinkParams::default()).unwrap();
    net.configure_interface(PortId::new(core, 0), "10.0.0.1", "24", None).unwrap();

    let mut sim = Simulator::default();
    sim.send_ping(&mut net, h, "10.0.0.1", 1).unwrap();
    sim.run_until_idle(&mut net, 500);

    assert_eq!(replies_at(&sim, h), 1);
    assert_eq!(net.stats.buffered_pkts, 1);
    assert_eq!(net.stats.released_pkts, 1);
    assert!(net.stats.drops.is_empty());
    let core_mac = net.interface(PortId::new(core, 0)).unwrap().mac;
    assert_eq!(net.device(h).unwrap().arp.lookup("10.0.0.1".parse().unwrap()), Some(core_mac));
}
