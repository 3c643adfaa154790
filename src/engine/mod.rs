//! 设备包处理引擎
//!
//! [`process`] 对“位于某设备上”的一个包做出决定：交付、转发（单播/泛洪）、
//! 等待 ARP 或丢弃。对包是纯函数（返回新包），对设备的修改以
//! [`DeviceUpdate`] 形式返回，由调用方提交。
//!
//! 按设备能力分派：二层交换 → [`switch`]，三层转发 → [`router`]，其余 → [`host`]。

mod arp;
mod egress;
mod host;
mod local;
mod outcome;
mod router;
mod switch;

pub use egress::{put_on_link, release_buffered};
pub use outcome::{DeviceUpdate, DropReason, Outcome, Verdict};

use tracing::debug;

use crate::net::{Device, Network, Packet};

/// 处理一个位于 `device` 上的包
#[tracing::instrument(skip(device, pkt, net), fields(device = device.id.0, kind = %device.kind, pkt_id = pkt.id))]
pub fn process(device: &Device, pkt: Packet, net: &Network) -> Outcome {
    debug!(summary = %pkt.summary(), ingress = ?pkt.ingress, "📬 设备处理数据包");
    let out = if device.kind.has_l2() {
        switch::process(device, pkt, net)
    } else if device.kind.routes_packets() {
        router::process(device, pkt, net)
    } else {
        host::process(device, pkt, net)
    };
    debug!(verdict = ?out.verdict, emitted = out.packets.len(), "处理完成");
    out
}
