mod arp;
mod end_to_end;
mod stp;
mod switching;
mod topology;

use crate::net::{DeviceId, Packet, PortId, Stage};

/// 把一个包摆成“刚从 `from` 经链路到达 `port`”的样子
pub(crate) fn arriving(mut pkt: Packet, from: DeviceId, port: PortId) -> Packet {
    pkt.stage = Stage::AtDevice;
    pkt.last_device = Some(from);
    pkt.current_device = Some(port.device);
    pkt.ingress = Some(port);
    pkt.locally_generated = false;
    pkt.path.push(port.device);
    pkt
}
