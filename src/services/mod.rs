//! 地址与配置服务
//!
//! ARP 缓存、DHCP 地址池/租约、DNS 区域与解析。包处理引擎只读这些状态，
//! 修改通过设备更新或 [`Network`](crate::net::Network) 上的显式操作完成。

mod arp_cache;
mod dhcp;
mod dns;

pub use arp_cache::{ArpCache, ArpEntry, ArpEntryKind};
pub use dhcp::{DhcpError, DhcpLease, DhcpPool};
pub use dns::DnsZone;

use std::net::Ipv4Addr;

use crate::addr::MacAddr;
use crate::net::{DeviceId, Network};

impl Network {
    /// ARP 解析：先查设备缓存，再走仿真捷径（全网找拥有该 IP 的设备）
    ///
    /// 包处理引擎不走捷径，缓存未命中时总是发 ARP 请求并缓存原包。
    pub fn resolve_arp(&self, from: DeviceId, ip: Ipv4Addr) -> Option<MacAddr> {
        if let Some(mac) = self.device(from).ok()?.arp.lookup(ip) {
            return Some(mac);
        }
        let owner = self.device_with_ip(ip)?;
        owner
            .interfaces
            .iter()
            .find(|i| i.ip == Some(ip))
            .map(|i| i.mac)
            .or_else(|| owner.svis.iter().find(|s| s.ip == ip).map(|s| s.mac))
    }
}
