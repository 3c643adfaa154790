//! 二层交换：MAC 学习、VLAN、泛洪/单播转发、STP 端口过滤
//!
//! 三层交换机在此基础上把发往 SVI MAC 或已配地址端口的帧交给路由逻辑。

use tracing::{debug, trace};

use super::egress::{self, L3Ingress};
use super::outcome::{DeviceUpdate, DropReason, Outcome, Verdict};
use super::{arp, router};
use crate::net::{Device, Interface, Network, Packet, Payload};

pub(crate) fn process(device: &Device, mut pkt: Packet, net: &Network) -> Outcome {
    let Some(ingress) = pkt.ingress else {
        // 本机产生的三层包（三层交换机）
        if device.kind.routes_packets() {
            return router::route(device, pkt, L3Ingress::Local, net);
        }
        return Outcome::drop(DropReason::NoEgress);
    };
    let index = ingress.index;
    let Some(iface) = device.interface(index) else {
        return Outcome::drop(DropReason::Malformed);
    };
    if !iface.up {
        return Outcome::drop(DropReason::LinkDown);
    }

    let stp = device.stp.as_ref().filter(|s| s.enabled);
    if let (Payload::Stp(bpdu), Some(_)) = (&pkt.payload, stp) {
        trace!(port = index, root = %bpdu.root_bridge_id, "收到 BPDU");
        let mut out = Outcome::new(Verdict::Consumed);
        out.updates.push(DeviceUpdate::BpduReceived {
            port: index,
            bpdu: *bpdu,
        });
        return out;
    }
    if stp.is_some_and(|s| !s.learns(index)) {
        trace!(port = index, "端口处于阻塞/监听状态，丢弃");
        return Outcome::drop(DropReason::StpBlocked);
    }
    if device.kind.routes_packets() && addressed_to_port(iface, &pkt) {
        // 三层交换机上配了地址的物理端口
        return router::route(device, pkt, L3Ingress::Port(index), net);
    }

    let mode = iface.switchport.clone().unwrap_or_default();
    let Some(vlan) = mode.ingress_vlan(pkt.vlan_tag) else {
        return Outcome::drop(DropReason::VlanMismatch);
    };

    let mut updates = Vec::new();
    if pkt.src_mac.is_unicast() && !pkt.src_mac.0.iter().all(|b| *b == 0) {
        updates.push(DeviceUpdate::LearnMac {
            mac: pkt.src_mac,
            port: index,
            vlan,
        });
    }
    if stp.is_some_and(|s| !s.forwards(index)) {
        // learning 状态：只学习不转发
        return Outcome::drop(DropReason::StpBlocked).with_updates(updates);
    }
    pkt.vlan_tag = None;

    if device.kind.routes_packets() {
        if let Some(svi) = device.svi(vlan).filter(|s| s.up) {
            let via = L3Ingress::Svi { vlan, port: index };
            if pkt.dst_mac == svi.mac {
                return router::route(device, pkt, via, net).with_updates(updates);
            }
            if pkt.dst_mac.is_broadcast() {
                // 广播既在 VLAN 内泛洪，也交给 SVI（ARP 请求）
                let mut out = Outcome::new(Verdict::Forwarded);
                if let Payload::Arp(msg) = &pkt.payload {
                    out.merge(arp::handle(device, msg, via, net));
                }
                out.packets
                    .extend(egress::flood(device, pkt, vlan, Some(index), net));
                return out.with_updates(updates);
            }
        }
    }

    if pkt.dst_mac.is_unicast() {
        if let Some(entry) = device.mac_table.lookup(pkt.dst_mac, vlan) {
            if entry.port == index {
                trace!(port = index, "目的在同一端口，过滤");
                return Outcome::drop(DropReason::SameSegment).with_updates(updates);
            }
            if !egress::port_forwards(device, entry.port, vlan) {
                return Outcome::drop(DropReason::StpBlocked).with_updates(updates);
            }
            let out_port = entry.port;
            return match egress::send_tagged(device, pkt, vlan, out_port, net) {
                Some(p) => {
                    debug!(port = out_port, vlan, "➡️  已知单播转发");
                    let mut out = Outcome::new(Verdict::Forwarded);
                    out.packets.push(p);
                    out.with_updates(updates)
                }
                None => Outcome::drop(DropReason::LinkDown).with_updates(updates),
            };
        }
    }

    let copies = egress::flood(device, pkt, vlan, Some(index), net);
    let mut out = if copies.is_empty() {
        Outcome::drop(DropReason::NoEgress)
    } else {
        Outcome::new(Verdict::Forwarded)
    };
    out.packets = copies;
    out.with_updates(updates)
}

/// 帧发往端口自身地址：目的 MAC 是端口 MAC，或是询问端口 IP 的 ARP 广播
fn addressed_to_port(iface: &Interface, pkt: &Packet) -> bool {
    let Some(ip) = iface.ip else {
        return false;
    };
    if pkt.dst_mac == iface.mac {
        return true;
    }
    pkt.dst_mac.is_broadcast()
        && matches!(&pkt.payload, Payload::Arp(msg) if msg.target_ip == ip)
}
