//! 出方向公共逻辑：上链路、二层 VLAN 内发送、ARP 缺失时缓存

use std::net::Ipv4Addr;

use tracing::{debug, trace};

use super::outcome::{DropReason, Outcome, Verdict};
use crate::addr::{MacAddr, RouteEgress};
use crate::net::{Device, Network, Packet, PortId, Stage};

/// 三层报文从哪里进入设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum L3Ingress {
    Port(usize),
    /// 经三层交换机的 SVI；`port` 为帧实际到达的物理端口
    Svi { vlan: u16, port: usize },
    /// 本机产生
    Local,
}

impl L3Ingress {
    pub(crate) fn egress(self) -> Option<RouteEgress> {
        match self {
            L3Ingress::Port(i) => Some(RouteEgress::Port(i)),
            L3Ingress::Svi { vlan, .. } => Some(RouteEgress::Svi(vlan)),
            L3Ingress::Local => None,
        }
    }
}

/// 把包放上端口所在的链路；端口不可用时返回 `None`
pub fn put_on_link(net: &Network, mut pkt: Packet, port: PortId) -> Option<Packet> {
    if !net.is_port_active(port) {
        return None;
    }
    let conn = net.connection_of(port)?;
    let peer = conn.peer_of(port)?;
    pkt.stage = Stage::OnLink;
    pkt.egress = Some(port);
    pkt.connection = Some(conn.id);
    pkt.target_device = Some(peer.device);
    pkt.progress = 0.0;
    pkt.loss_checked = false;
    pkt.waiting_for_arp = None;
    pkt.egress_svi = None;
    trace!(pkt_id = pkt.id, port = %port, to = peer.device.0, "上链路");
    Some(pkt)
}

/// 在 VLAN 内发送一个二层帧：已知单播走 MAC 表，否则泛洪。
///
/// 返回放上链路的包；`exclude` 为入端口（不回送）。泛洪时第一个副本保留原 id，
/// 其余副本 id 置 0 由调度器重新编号。
pub(crate) fn send_in_vlan(
    device: &Device,
    pkt: Packet,
    vlan: u16,
    exclude: Option<usize>,
    net: &Network,
) -> Vec<Packet> {
    if pkt.dst_mac.is_unicast() {
        if let Some(entry) = device.mac_table.lookup(pkt.dst_mac, vlan) {
            if Some(entry.port) == exclude || !port_forwards(device, entry.port, vlan) {
                return Vec::new();
            }
            return send_tagged(device, pkt, vlan, entry.port, net)
                .into_iter()
                .collect();
        }
    }
    flood(device, pkt, vlan, exclude, net)
}

pub(crate) fn flood(
    device: &Device,
    pkt: Packet,
    vlan: u16,
    exclude: Option<usize>,
    net: &Network,
) -> Vec<Packet> {
    let mut out: Vec<Packet> = Vec::new();
    for index in 0..device.interfaces.len() {
        if Some(index) == exclude || !port_forwards(device, index, vlan) {
            continue;
        }
        let copy = if out.is_empty() {
            pkt.clone()
        } else {
            pkt.duplicate()
        };
        if let Some(p) = send_tagged(device, copy, vlan, index, net) {
            out.push(p);
        }
    }
    debug!(pkt_id = pkt.id, vlan, copies = out.len(), "📢 泛洪");
    out
}

/// 端口是否可以在该 VLAN 内转发：接口 up、承载该 VLAN、STP 转发态
pub(crate) fn port_forwards(device: &Device, index: usize, vlan: u16) -> bool {
    let Some(iface) = device.interfaces.get(index) else {
        return false;
    };
    let carries = iface.switchport.as_ref().is_none_or(|m| m.carries(vlan));
    let stp_ok = device.stp.as_ref().is_none_or(|s| s.forwards(index));
    iface.up && carries && stp_ok
}

/// 按出端口模式打/剥 tag 后上链路
pub(crate) fn send_tagged(
    device: &Device,
    mut pkt: Packet,
    vlan: u16,
    index: usize,
    net: &Network,
) -> Option<Packet> {
    pkt.vlan_tag = device
        .interfaces
        .get(index)
        .and_then(|i| i.switchport.as_ref())
        .and_then(|m| m.egress_tag(vlan));
    put_on_link(net, pkt, PortId::new(device.id, index))
}

/// 三层发送：按出口解析下一跳 MAC，命中则发送，否则 ARP 请求 + 缓存原包
pub(crate) fn send_l3(
    device: &Device,
    mut pkt: Packet,
    egress: RouteEgress,
    next_hop: Ipv4Addr,
    net: &Network,
) -> Outcome {
    let Some((own_ip, own_mac)) = device.l3_address(egress) else {
        return Outcome::drop(DropReason::NoAddress);
    };
    pkt.src_mac = own_mac;

    let broadcast = match egress {
        RouteEgress::Port(i) => device
            .interface(i)
            .is_some_and(|iface| iface.is_broadcast_for(next_hop)),
        RouteEgress::Svi(vlan) => {
            next_hop == Ipv4Addr::BROADCAST
                || device.svi(vlan).is_some_and(|s| {
                    crate::addr::broadcast_address(s.ip, s.mask) == next_hop
                })
        }
    };
    let resolved = if broadcast {
        Some(MacAddr::BROADCAST)
    } else {
        device.arp.lookup(next_hop)
    };

    match resolved {
        Some(mac) => {
            pkt.dst_mac = mac;
            let sent = transmit(device, pkt, egress, net);
            if sent.is_empty() {
                Outcome::drop(DropReason::LinkDown)
            } else {
                let mut out = Outcome::new(Verdict::Forwarded);
                out.packets = sent;
                out
            }
        }
        None => {
            let request = Packet::arp_request(device.id, own_mac, own_ip, next_hop);
            let requests = transmit(device, request, egress, net);
            if requests.is_empty() {
                return Outcome::drop(DropReason::LinkDown);
            }
            debug!(pkt_id = pkt.id, %next_hop, "❓ ARP 未命中，缓存原包并发出请求");
            let mut out = Outcome::new(Verdict::Buffered);
            out.packets = requests;
            out.packets.push(buffer_for_arp(pkt, next_hop, egress, device));
            out
        }
    }
}

/// 物理端口直接上链路；SVI 出口在 VLAN 内二层转发
fn transmit(device: &Device, mut pkt: Packet, egress: RouteEgress, net: &Network) -> Vec<Packet> {
    match egress {
        RouteEgress::Port(i) => {
            pkt.vlan_tag = None;
            put_on_link(net, pkt, PortId::new(device.id, i))
                .into_iter()
                .collect()
        }
        RouteEgress::Svi(vlan) => send_in_vlan(device, pkt, vlan, None, net),
    }
}

/// 生成等待 ARP 的缓存副本（保留原 id）
pub(crate) fn buffer_for_arp(
    mut pkt: Packet,
    next_hop: Ipv4Addr,
    egress: RouteEgress,
    device: &Device,
) -> Packet {
    pkt.stage = Stage::Buffered;
    pkt.waiting_for_arp = Some(next_hop);
    pkt.current_device = Some(device.id);
    pkt.target_device = None;
    match egress {
        RouteEgress::Port(i) => {
            pkt.egress = Some(PortId::new(device.id, i));
            pkt.egress_svi = None;
        }
        RouteEgress::Svi(vlan) => {
            pkt.egress = None;
            pkt.egress_svi = Some(vlan);
        }
    }
    pkt
}

/// ARP 解析完成后重新发送缓存的包
pub fn release_buffered(device: &Device, mut pkt: Packet, mac: MacAddr, net: &Network) -> Vec<Packet> {
    pkt.dst_mac = mac;
    pkt.waiting_for_arp = None;
    pkt.stage = Stage::AtDevice;
    let egress = match (pkt.egress_svi, pkt.egress) {
        (Some(vlan), _) => RouteEgress::Svi(vlan),
        (None, Some(port)) => RouteEgress::Port(port.index),
        (None, None) => return Vec::new(),
    };
    trace!(pkt_id = pkt.id, %mac, "ARP 已解析，释放缓存包");
    transmit(device, pkt, egress, net)
}

/// 把回包（ARP 应答、ICMP 差错）从入口原路送回
pub(crate) fn reply_out(device: &Device, pkt: Packet, via: L3Ingress, net: &Network) -> Option<Packet> {
    match via {
        L3Ingress::Port(i) => {
            let mut pkt = pkt;
            pkt.vlan_tag = None;
            put_on_link(net, pkt, PortId::new(device.id, i))
        }
        L3Ingress::Svi { vlan, port } => send_tagged(device, pkt, vlan, port, net),
        L3Ingress::Local => None,
    }
}
