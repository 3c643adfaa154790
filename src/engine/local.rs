//! 本机交付：ICMP echo、TCP、UDP

use tracing::{debug, info};

use super::outcome::{DeviceUpdate, Outcome, Verdict};
use crate::net::{Device, ICMP_ECHO_REQUEST, IcmpMessage, Network, Packet, Payload};

pub(crate) fn deliver(device: &Device, pkt: Packet, net: &Network) -> Outcome {
    let (Some(src_ip), Some(dst_ip)) = (pkt.src_ip, pkt.dst_ip) else {
        return Outcome::new(Verdict::Delivered);
    };

    match &pkt.payload {
        Payload::Icmp(m) if m.icmp_type == ICMP_ECHO_REQUEST => {
            // 目的是广播地址时用收包接口的地址回复
            let reply_src = if device.owns_ip(dst_ip) {
                dst_ip
            } else {
                device.source_ip_for(src_ip).unwrap_or(dst_ip)
            };
            let reply = Packet::icmp(
                device.id,
                reply_src,
                src_ip,
                IcmpMessage::echo_reply(m.ident, m.seq),
            );
            debug!(device = device.id.0, to = %src_ip, seq = m.seq, "🏓 ICMP echo reply");
            let mut out = Outcome::new(Verdict::Delivered);
            out.merge(super::process(device, reply, net));
            out
        }
        Payload::Icmp(m) => {
            info!(device = device.id.0, from = %src_ip, icmp_type = m.icmp_type, seq = m.seq, "✅ ICMP 送达");
            Outcome::new(Verdict::Delivered)
        }
        Payload::Tcp(seg) => {
            let (Some(src_port), Some(dst_port)) = (pkt.src_port, pkt.dst_port) else {
                return Outcome::new(Verdict::Delivered);
            };
            let res = device.tcp.on_segment(dst_ip, dst_port, src_ip, src_port, seg);
            let mut out = Outcome::new(Verdict::Delivered);
            if let Some(change) = res.change {
                out.updates.push(DeviceUpdate::Tcp(change));
            }
            if let Some(reply_seg) = res.reply {
                let reply = Packet::tcp(device.id, (dst_ip, dst_port), (src_ip, src_port), reply_seg);
                out.merge(super::process(device, reply, net));
            }
            out
        }
        _ => Outcome::new(Verdict::Delivered),
    }
}
