//! ARP 报文处理（任何三层设备）
//!
//! - 请求：总是学习发送方映射；目标是本接口地址时回应答
//! - 应答：吸收并学习；释放缓存包由调度器在提交 `LearnArp` 后完成

use std::net::Ipv4Addr;

use tracing::debug;

use super::egress::{L3Ingress, reply_out};
use super::outcome::{DeviceUpdate, DropReason, Outcome, Verdict};
use crate::net::{ArpMessage, ArpOp, Device, Network, Packet, Payload};

pub(crate) fn handle(device: &Device, msg: &ArpMessage, via: L3Ingress, net: &Network) -> Outcome {
    let Some(egress) = via.egress() else {
        return Outcome::drop(DropReason::Malformed);
    };
    let own = device.l3_address(egress);

    let mut out = Outcome::new(Verdict::Consumed);
    if msg.sender_ip != Ipv4Addr::UNSPECIFIED && msg.sender_mac.is_unicast() {
        out.updates.push(DeviceUpdate::LearnArp {
            ip: msg.sender_ip,
            mac: msg.sender_mac,
            interface: egress,
        });
    }

    match msg.op {
        ArpOp::Request => {
            let Some((own_ip, own_mac)) = own.filter(|(ip, _)| *ip == msg.target_ip) else {
                return out;
            };
            let mut reply = Packet::originate(
                device.id,
                Payload::Arp(ArpMessage {
                    op: ArpOp::Reply,
                    sender_mac: own_mac,
                    sender_ip: own_ip,
                    target_mac: msg.sender_mac,
                    target_ip: msg.sender_ip,
                }),
            );
            reply.src_mac = own_mac;
            reply.dst_mac = msg.sender_mac;
            debug!(device = device.id.0, ip = %own_ip, to = %msg.sender_ip, "📣 ARP 应答");
            out.packets.extend(reply_out(device, reply, via, net));
        }
        ArpOp::Reply => {
            debug!(device = device.id.0, ip = %msg.sender_ip, mac = %msg.sender_mac, "ARP 应答已学习");
        }
    }
    out
}
