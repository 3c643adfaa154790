//! 三层转发（路由器、防火墙、三层交换机的 SVI）

use std::net::Ipv4Addr;

use tracing::{debug, trace};

use super::egress::{self, L3Ingress};
use super::outcome::{DropReason, Outcome};
use super::{arp, local};
use crate::addr::broadcast_address;
use crate::net::{
    Device, ICMP_DEST_UNREACHABLE, ICMP_TIME_EXCEEDED, IcmpMessage, Network, Packet, Payload,
};

/// 路由器入口：校验目的 MAC 后交给 [`route`]
pub(crate) fn process(device: &Device, pkt: Packet, net: &Network) -> Outcome {
    let Some(ingress) = pkt.ingress else {
        return route(device, pkt, L3Ingress::Local, net);
    };
    let index = ingress.index;
    let Some(iface) = device.interface(index) else {
        return Outcome::drop(DropReason::Malformed);
    };
    if !iface.up {
        return Outcome::drop(DropReason::LinkDown);
    }
    if pkt.dst_mac != iface.mac && !pkt.dst_mac.is_broadcast() {
        trace!(dst_mac = %pkt.dst_mac, "目的 MAC 不是本接口");
        return Outcome::drop(DropReason::NotForUs);
    }
    route(device, pkt, L3Ingress::Port(index), net)
}

/// 三层处理：本机交付或按最长前缀匹配转发
pub(crate) fn route(device: &Device, mut pkt: Packet, via: L3Ingress, net: &Network) -> Outcome {
    match &pkt.payload {
        Payload::Arp(msg) => return arp::handle(device, msg, via, net),
        Payload::Stp(_) => return Outcome::drop(DropReason::NotForUs),
        _ => {}
    }
    let Some(dst_ip) = pkt.dst_ip else {
        return Outcome::drop(DropReason::Malformed);
    };

    if device.owns_ip(dst_ip) || is_local_broadcast(device, via, dst_ip) {
        return local::deliver(device, pkt, net);
    }
    if via != L3Ingress::Local && pkt.dst_mac.is_multicast() {
        // 广播不跨网段
        return Outcome::drop(DropReason::NotForUs);
    }

    if !pkt.locally_generated {
        if pkt.ttl <= 1 {
            return time_exceeded(device, pkt, via, net);
        }
        pkt.ttl -= 1;
    }

    let Some(route) = device.routes.lookup(dst_ip) else {
        debug!(device = device.id.0, %dst_ip, "🚫 无路由，丢弃");
        return Outcome::drop(DropReason::NoRoute);
    };
    let next_hop = route.next_hop_for(dst_ip);
    trace!(
        %dst_ip,
        %next_hop,
        egress = ?route.egress,
        ttl = pkt.ttl,
        "🧭 路由查找命中"
    );
    egress::send_l3(device, pkt, route.egress, next_hop, net)
}

fn is_local_broadcast(device: &Device, via: L3Ingress, dst: Ipv4Addr) -> bool {
    if dst == Ipv4Addr::BROADCAST {
        return true;
    }
    match via {
        L3Ingress::Port(i) => device.interface(i).is_some_and(|f| f.is_broadcast_for(dst)),
        L3Ingress::Svi { vlan, .. } => device
            .svi(vlan)
            .is_some_and(|s| broadcast_address(s.ip, s.mask) == dst),
        L3Ingress::Local => false,
    }
}

/// TTL 耗尽：原包丢弃，从入口送回一个 ICMP Time Exceeded
fn time_exceeded(device: &Device, pkt: Packet, via: L3Ingress, net: &Network) -> Outcome {
    let mut out = Outcome::drop(DropReason::TtlExceeded);
    let Some(orig_src) = pkt.src_ip else {
        return out;
    };
    // 不对 ICMP 差错报文再产生差错
    if let Payload::Icmp(m) = &pkt.payload {
        if m.icmp_type == ICMP_TIME_EXCEEDED || m.icmp_type == ICMP_DEST_UNREACHABLE {
            return out;
        }
    }
    let Some((own_ip, own_mac)) = via.egress().and_then(|e| device.l3_address(e)) else {
        return out;
    };
    let (ident, seq) = match &pkt.payload {
        Payload::Icmp(m) => (m.ident, m.seq),
        _ => (0, 0),
    };
    let mut te = Packet::icmp(
        device.id,
        own_ip,
        orig_src,
        IcmpMessage {
            icmp_type: ICMP_TIME_EXCEEDED,
            code: 0,
            ident,
            seq,
        },
    );
    te.src_mac = own_mac;
    te.dst_mac = pkt.src_mac;
    debug!(device = device.id.0, to = %orig_src, pkt_id = pkt.id, "⌛ TTL 耗尽，回送 Time Exceeded");
    out.packets.extend(egress::reply_out(device, te, via, net));
    out
}
