use super::arriving;
use crate::addr::MacAddr;
use crate::engine::{self, DeviceUpdate, DropReason, Verdict};
use crate::net::{DeviceId, LinkParams, Network, Packet, Payload, PortId};

struct Star {
    net: Network,
    switch: DeviceId,
    hosts: Vec<DeviceId>,
}

/// 一台交换机挂 n 台主机，主机 i 接在端口 i
fn star(n: usize) -> Star {
    let mut net = Network::new();
    let switch = net.add_switch("sw");
    let hosts = (0..n)
        .map(|i| {
            let h = net.add_host(format!("h{i}"));
            net.connect(h, switch, LinkParams::default()).unwrap();
            h
        })
        .collect();
    Star { net, switch, hosts }
}

fn mac_of(net: &Network, dev: DeviceId) -> MacAddr {
    net.interface(PortId::new(dev, 0)).unwrap().mac
}

fn frame(net: &Network, from: DeviceId, dst: MacAddr, switch: DeviceId, port: usize) -> Packet {
    let mut pkt = Packet::originate(from, Payload::Raw);
    pkt.id = 7;
    pkt.src_mac = mac_of(net, from);
    pkt.dst_mac = dst;
    arriving(pkt, from, PortId::new(switch, port))
}

#[test]
fn broadcast_floods_every_other_active_port() {
    let s = star(4);
    let pkt = frame(&s.net, s.hosts[0], MacAddr::BROADCAST, s.switch, 0);
    let dev = s.net.device(s.switch).unwrap();
    let out = engine::process(dev, pkt, &s.net);

    assert_eq!(out.verdict, Verdict::Forwarded);
    assert_eq!(out.packets.len(), 3);
    assert!(out.packets.iter().all(|p| p.target_device != Some(s.hosts[0])));
    let mut targets: Vec<_> = out.packets.iter().filter_map(|p| p.target_device).collect();
    targets.sort();
    assert_eq!(targets, s.hosts[1..].to_vec());
    // 第一个副本保留原编号，其余留给调度器编号
    assert_eq!(out.packets[0].id, 7);
    assert!(out.packets[1..].iter().all(|p| p.id == 0));
    assert!(out.updates.contains(&DeviceUpdate::LearnMac {
        mac: mac_of(&s.net, s.hosts[0]),
        port: 0,
        vlan: 1,
    }));
}

#[test]
fn flood_skips_down_ports() {
    let mut s = star(3);
    s.net.set_interface_up(PortId::new(s.hosts[2], 0), false).unwrap();
    let pkt = frame(&s.net, s.hosts[0], MacAddr::BROADCAST, s.switch, 0);
    let out = engine::process(s.net.device(s.switch).unwrap(), pkt, &s.net);
    assert_eq!(out.packets.len(), 1);
    assert_eq!(out.packets[0].target_device, Some(s.hosts[1]));
}

#[test]
fn flood_with_nowhere_to_go_is_dropped() {
    let s = star(1);
    let pkt = frame(&s.net, s.hosts[0], MacAddr::BROADCAST, s.switch, 0);
    let out = engine::process(s.net.device(s.switch).unwrap(), pkt, &s.net);
    assert_eq!(out.verdict, Verdict::Dropped(DropReason::NoEgress));
    assert!(out.packets.is_empty());
    // 学习照样发生
    assert_eq!(out.updates.len(), 1);
}

#[test]
fn known_unicast_goes_out_one_port() {
    let mut s = star(3);
    let b = mac_of(&s.net, s.hosts[1]);
    s.net.device_mut(s.switch).unwrap().mac_table.learn(b, 1, 1);

    let pkt = frame(&s.net, s.hosts[0], b, s.switch, 0);
    let out = engine::process(s.net.device(s.switch).unwrap(), pkt, &s.net);
    assert_eq!(out.verdict, Verdict::Forwarded);
    assert_eq!(out.packets.len(), 1);
    assert_eq!(out.packets[0].target_device, Some(s.hosts[1]));
    assert_eq!(out.packets[0].egress, Some(PortId::new(s.switch, 1)));
}

#[test]
fn unknown_unicast_floods() {
    let s = star(3);
    let b = mac_of(&s.net, s.hosts[1]);
    let pkt = frame(&s.net, s.hosts[0], b, s.switch, 0);
    let out = engine::process(s.net.device(s.switch).unwrap(), pkt, &s.net);
    assert_eq!(out.packets.len(), 2);
}

#[test]
fn destination_on_ingress_segment_is_filtered() {
    let mut s = star(2);
    let b = mac_of(&s.net, s.hosts[1]);
    s.net.device_mut(s.switch).unwrap().mac_table.learn(b, 0, 1);
    let pkt = frame(&s.net, s.hosts[0], b, s.switch, 0);
    let out = engine::process(s.net.device(s.switch).unwrap(), pkt, &s.net);
    assert_eq!(out.verdict, Verdict::Dropped(DropReason::SameSegment));
    assert!(out.packets.is_empty());
}

#[test]
fn vlans_isolate_broadcast_domains() {
    let mut s = star(4);
    s.net.create_vlan(s.switch, 10, "lab").unwrap();
    s.net.set_access_vlan(PortId::new(s.switch, 2), 10).unwrap();
    s.net.set_access_vlan(PortId::new(s.switch, 3), 10).unwrap();

    let pkt = frame(&s.net, s.hosts[0], MacAddr::BROADCAST, s.switch, 0);
    let out = engine::process(s.net.device(s.switch).unwrap(), pkt, &s.net);
    assert_eq!(out.packets.len(), 1);
    assert_eq!(out.packets[0].target_device, Some(s.hosts[1]));

    let pkt = frame(&s.net, s.hosts[2], MacAddr::BROADCAST, s.switch, 2);
    let out = engine::process(s.net.device(s.switch).unwrap(), pkt, &s.net);
    assert_eq!(out.packets.len(), 1);
    assert_eq!(out.packets[0].target_device, Some(s.hosts[3]));
    assert!(out.updates.iter().any(|u| matches!(u, DeviceUpdate::LearnMac { vlan: 10, .. })));
}

#[test]
fn tagged_frame_on_access_port_is_rejected() {
    let s = star(2);
    let mut pkt = frame(&s.net, s.hosts[0], MacAddr::BROADCAST, s.switch, 0);
    pkt.vlan_tag = Some(30);
    let out = engine::process(s.net.device(s.switch).unwrap(), pkt, &s.net);
    assert_eq!(out.verdict, Verdict::Dropped(DropReason::VlanMismatch));
}

#[test]
fn trunk_carries_tagged_frames_between_switches() {
    let mut net = Network::new();
    let s1 = net.add_switch("s1");
    let s2 = net.add_switch("s2");
    let a = net.add_host("a");
    let b = net.add_host("b");
    for s in [s1, s2] {
        net.create_vlan(s, 10, "").unwrap();
        net.set_access_vlan(PortId::new(s, 0), 10).unwrap();
        net.set_trunk(PortId::new(s, 7), 1, None).unwrap();
    }
    net.add_connection(PortId::new(a, 0), PortId::new(s1, 0), LinkParams::default()).unwrap();
    net.add_connection(PortId::new(b, 0), PortId::new(s2, 0), LinkParams::default()).unwrap();
    net.add_connection(PortId::new(s1, 7), PortId::new(s2, 7), LinkParams::default()).unwrap();

    let pkt = frame(&net, a, MacAddr::BROADCAST, s1, 0);
    let out = engine::process(net.device(s1).unwrap(), pkt, &net);
    assert_eq!(out.packets.len(), 1);
    let on_trunk = out.packets.into_iter().next().unwrap();
    assert_eq!(on_trunk.vlan_tag, Some(10));
    assert_eq!(on_trunk.target_device, Some(s2));

    let at_s2 = arriving(on_trunk, s1, PortId::new(s2, 7));
    let out = engine::process(net.device(s2).unwrap(), at_s2, &net);
    assert_eq!(out.packets.len(), 1);
    // access 口出去时剥掉 tag
    assert_eq!(out.packets[0].vlan_tag, None);
    assert_eq!(out.packets[0].target_device, Some(b));
}

#[test]
fn hosts_ignore_frames_for_other_macs() {
    let s = star(2);
    let a = s.hosts[0];
    let mut pkt = Packet::originate(s.switch, Payload::Raw);
    pkt.src_mac = mac_of(&s.net, s.hosts[1]);
    pkt.dst_mac = MacAddr::local(999);
    let pkt = arriving(pkt, s.switch, PortId::new(a, 0));
    let out = engine::process(s.net.device(a).unwrap(), pkt, &s.net);
    assert_eq!(out.verdict, Verdict::Dropped(DropReason::NotForUs));
}

#[test]
fn mac_table_keeps_static_entries() {
    let mut s = star(2);
    let b = mac_of(&s.net, s.hosts[1]);
    let table = &mut s.net.device_mut(s.switch).unwrap().mac_table;
    table.add_static(b, 1, 1);
    table.learn(b, 0, 1);
    assert_eq!(table.lookup(b, 1).unwrap().port, 1);
    table.clear();
    assert_eq!(table.len(), 1);
    assert!(table.lookup(b, 2).is_none());
}
