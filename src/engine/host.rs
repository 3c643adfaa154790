//! 主机/服务器：只接收发给自己的帧，不转发

use tracing::trace;

use super::egress::{self, L3Ingress};
use super::outcome::{DropReason, Outcome, Verdict};
use super::{arp, local};
use crate::addr::RouteEgress;
use crate::net::{Device, Network, Packet, Payload, PortId};

pub(crate) fn process(device: &Device, pkt: Packet, net: &Network) -> Outcome {
    match pkt.ingress {
        Some(port) => receive(device, pkt, port.index, net),
        None => originate(device, pkt, net),
    }
}

fn receive(device: &Device, pkt: Packet, index: usize, net: &Network) -> Outcome {
    let Some(iface) = device.interface(index) else {
        return Outcome::drop(DropReason::Malformed);
    };
    if !iface.up {
        return Outcome::drop(DropReason::LinkDown);
    }
    if pkt.dst_mac != iface.mac && !pkt.dst_mac.is_broadcast() {
        trace!(dst_mac = %pkt.dst_mac, "不是发给本机的帧");
        return Outcome::drop(DropReason::NotForUs);
    }
    if let Payload::Arp(msg) = &pkt.payload {
        return arp::handle(device, msg, L3Ingress::Port(index), net);
    }
    let Some(dst_ip) = pkt.dst_ip else {
        return Outcome::new(Verdict::Delivered);
    };
    if device.owns_ip(dst_ip) || iface.is_broadcast_for(dst_ip) {
        local::deliver(device, pkt, net)
    } else {
        Outcome::drop(DropReason::NotForUs)
    }
}

/// 本机发出：同网段直接发，否则经接口网关
fn originate(device: &Device, pkt: Packet, net: &Network) -> Outcome {
    let Some(dst_ip) = pkt.dst_ip else {
        // 纯二层帧：从第一个可用端口发出
        let sent = (0..device.interfaces.len())
            .map(|i| PortId::new(device.id, i))
            .find(|p| net.is_port_active(*p))
            .and_then(|p| egress::put_on_link(net, pkt, p));
        return match sent {
            Some(p) => {
                let mut out = Outcome::new(Verdict::Forwarded);
                out.packets.push(p);
                out
            }
            None => Outcome::drop(DropReason::NoEgress),
        };
    };
    if device.owns_ip(dst_ip) {
        return local::deliver(device, pkt, net);
    }

    let usable = || {
        device
            .interfaces
            .iter()
            .enumerate()
            .filter(|(_, i)| i.up && i.has_address())
    };
    let direct = usable()
        .find(|(_, i)| i.in_subnet(dst_ip) || i.is_broadcast_for(dst_ip))
        .map(|(index, _)| (index, dst_ip));
    let via_gateway = || {
        usable().find_map(|(index, i)| i.gateway.map(|gw| (index, gw)))
    };
    let Some((index, next_hop)) = direct.or_else(via_gateway) else {
        trace!(%dst_ip, "无直连网段也无网关");
        return Outcome::drop(DropReason::NoRoute);
    };
    egress::send_l3(device, pkt, RouteEgress::Port(index), next_hop, net)
}
