use std::net::Ipv4Addr;

use super::arriving;
use crate::addr::{MacAddr, RouteEgress};
use crate::engine::{self, DeviceUpdate, Verdict};
use crate::net::{
    ArpMessage, ArpOp, IcmpMessage, LinkParams, Network, Packet, Payload, PortId, Stage,
};
use crate::services::ArpEntryKind;
use crate::sim::Simulator;
use crate::topo::lan::{LanOpts, build_lan};

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

#[test]
fn cache_miss_emits_request_and_buffers_original() {
    let mut net = Network::new();
    let lan = build_lan(&mut net, &LanOpts::default()).unwrap();
    let (a, b) = (lan.hosts[0], lan.hosts[1]);
    let mut pkt = Packet::icmp(a, lan.addrs[0], lan.addrs[1], IcmpMessage::echo_request(1, 1));
    pkt.id = 3;

    let out = engine::process(net.device(a).unwrap(), pkt, &net);
    assert_eq!(out.verdict, Verdict::Buffered);
    assert_eq!(out.packets.len(), 2);

    let request = &out.packets[0];
    assert_eq!(request.stage, Stage::OnLink);
    assert!(request.dst_mac.is_broadcast());
    let Payload::Arp(msg) = &request.payload else {
        panic!("expected an ARP request, got {:?}", request.payload);
    };
    assert_eq!(msg.op, ArpOp::Request);
    assert_eq!(msg.target_ip, lan.addrs[1]);
    assert_eq!(msg.sender_ip, lan.addrs[0]);

    let buffered = out.packets[1].clone();
    assert_eq!(buffered.stage, Stage::Buffered);
    assert_eq!(buffered.waiting_for_arp, Some(lan.addrs[1]));
    assert_eq!(buffered.id, 3);

    let b_mac = net.interface(PortId::new(b, 0)).unwrap().mac;
    let sent = engine::release_buffered(net.device(a).unwrap(), buffered, b_mac, &net);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dst_mac, b_mac);
    assert_eq!(sent[0].stage, Stage::OnLink);
    assert_eq!(sent[0].waiting_for_arp, None);
    assert_eq!(sent[0].target_device, Some(lan.switch));
}

fn request_frame(net: &Network, from: crate::net::DeviceId, target: Ipv4Addr, at: PortId) -> Packet {
    let iface = net.interface(PortId::new(from, 0)).unwrap();
    let pkt = Packet::arp_request(from, iface.mac, iface.ip.unwrap(), target);
    arriving(pkt, from, at)
}

#[test]
fn request_for_own_address_is_answered() {
    let mut net = Network::new();
    let a = net.add_host("a");
    let b = net.add_host("b");
    net.configure_interface(PortId::new(a, 0), "10.0.0.1", "24", None).unwrap();
    net.configure_interface(PortId::new(b, 0), "10.0.0.2", "24", None).unwrap();
    net.connect(a, b, LinkParams::default()).unwrap();
    let a_mac = net.interface(PortId::new(a, 0)).unwrap().mac;

    let pkt = request_frame(&net, a, ip("10.0.0.2"), PortId::new(b, 0));
    let out = engine::process(net.device(b).unwrap(), pkt, &net);
    assert_eq!(out.verdict, Verdict::Consumed);
    assert_eq!(
        out.updates,
        vec![DeviceUpdate::LearnArp {
            ip: ip("10.0.0.1"),
            mac: a_mac,
            interface: RouteEgress::Port(0),
        }]
    );
    assert_eq!(out.packets.len(), 1);
    let reply = &out.packets[0];
    assert_eq!(reply.dst_mac, a_mac);
    assert_eq!(reply.target_device, Some(a));
    assert!(matches!(
        reply.payload,
        Payload::Arp(ArpMessage {
            op: ArpOp::Reply,
            ..
        })
    ));

    // 目标不是自己：只学习，不应答
    let pkt = request_frame(&net, a, ip("10.0.0.99"), PortId::new(b, 0));
    let out = engine::process(net.device(b).unwrap(), pkt, &net);
    assert_eq!(out.verdict, Verdict::Consumed);
    assert!(out.packets.is_empty());
    assert_eq!(out.updates.len(), 1);
}

#[test]
fn scheduler_releases_buffered_packet_on_reply() {
    let mut net = Network::new();
    let lan = build_lan(&mut net, &LanOpts::default()).unwrap();
    let mut sim = Simulator::default();
    sim.send_ping(&mut net, lan.hosts[0], "192.168.1.20", 1).unwrap();
    sim.run_until_idle(&mut net, 200);

    assert_eq!(net.stats.buffered_pkts, 1);
    assert_eq!(net.stats.released_pkts, 1);
    assert!(sim.packets().iter().all(|p| p.stage != Stage::Buffered));

    // 双方都学到了对方
    let a = net.device(lan.hosts[0]).unwrap();
    let b = net.device(lan.hosts[1]).unwrap();
    assert_eq!(a.arp.lookup(lan.addrs[1]), Some(b.primary_mac()));
    assert_eq!(b.arp.lookup(lan.addrs[0]), Some(a.primary_mac()));
}

#[test]
fn unanswered_request_leaves_packet_buffered() {
    let mut net = Network::new();
    let lan = build_lan(&mut net, &LanOpts::default()).unwrap();
    let mut sim = Simulator::default();
    // 同网段但没有这台主机
    sim.send_ping(&mut net, lan.hosts[0], "192.168.1.77", 1).unwrap();
    sim.run_until_idle(&mut net, 200);

    assert_eq!(sim.in_flight(), 0);
    let waiting: Vec<_> = sim.packets().iter().filter(|p| p.stage == Stage::Buffered).collect();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].waiting_for_arp, Some(ip("192.168.1.77")));
}

#[test]
fn static_entries_survive_learning_and_clear() {
    let mut net = Network::new();
    let h = net.add_host("h");
    net.add_static_arp(h, "10.0.0.9", "02:00:00:00:aa:bb", RouteEgress::Port(0)).unwrap();
    let fixed: MacAddr = "02:00:00:00:aa:bb".parse().unwrap();

    let arp = &mut net.device_mut(h).unwrap().arp;
    assert!(!arp.learn(ip("10.0.0.9"), MacAddr::local(5), RouteEgress::Port(0)));
    assert!(arp.learn(ip("10.0.0.10"), MacAddr::local(6), RouteEgress::Port(0)));
    assert_eq!(arp.lookup(ip("10.0.0.9")), Some(fixed));

    net.clear_arp(h).unwrap();
    let arp = &net.device(h).unwrap().arp;
    assert_eq!(arp.len(), 1);
    assert_eq!(arp.entry(ip("10.0.0.9")).unwrap().kind, ArpEntryKind::Static);
    assert!(net.add_static_arp(h, "10.0.0.9", "zz:00", RouteEgress::Port(0)).is_err());
}

#[test]
fn resolve_shortcut_finds_owner_without_cache() {
    let mut net = Network::new();
    let lan = build_lan(&mut net, &LanOpts::default()).unwrap();
    let b_mac = net.device(lan.hosts[1]).unwrap().primary_mac();
    assert!(net.device(lan.hosts[0]).unwrap().arp.is_empty());
    assert_eq!(net.resolve_arp(lan.hosts[0], lan.addrs[1]), Some(b_mac));
    assert_eq!(net.resolve_arp(lan.hosts[0], ip("192.168.1.200")), None);
}

#[test]
fn removing_a_link_flushes_entries_learned_on_it() {
    let mut net = Network::new();
    let a = net.add_host("a");
    let b = net.add_host("b");
    let conn = net.connect(a, b, LinkParams::default()).unwrap();
    let arp = &mut net.device_mut(a).unwrap().arp;
    arp.learn(ip("10.0.0.2"), MacAddr::local(50), RouteEgress::Port(0));
    net.remove_connection(conn).unwrap();
    assert!(net.device(a).unwrap().arp.is_empty());
}
