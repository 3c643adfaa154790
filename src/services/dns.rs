//! DNS 解析
//!
//! 正向解析顺序：字面 IP → 设备主机名 → 去掉 `.local` 后缀再按主机名 → 服务器区域 A 记录
//! （优先查询方接口上配置的 DNS 服务器，其次任意服务器）。

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::addr::parse_ipv4;
use crate::net::{DeviceId, NetError, Network};

/// 服务器上的 A 记录区域（名字统一小写）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsZone {
    records: BTreeMap<String, Ipv4Addr>,
}

impl DnsZone {
    pub fn insert(&mut self, name: &str, ip: Ipv4Addr) {
        self.records.insert(normalize(name), ip);
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.records.remove(&normalize(name)).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<Ipv4Addr> {
        self.records.get(&normalize(name)).copied()
    }

    pub fn reverse(&self, ip: Ipv4Addr) -> Option<&str> {
        self.records
            .iter()
            .find(|(_, v)| **v == ip)
            .map(|(k, _)| k.as_str())
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, Ipv4Addr)> {
        self.records.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

impl Network {
    pub fn add_dns_record(&mut self, id: DeviceId, name: &str, ip: &str) -> Result<(), NetError> {
        let ip = parse_ipv4(ip)?;
        let dev = self.device_mut(id)?;
        if !dev.kind.can_serve_dns() {
            return Err(NetError::Unsupported {
                kind: dev.kind,
                feature: "dns zone",
            });
        }
        dev.dns_zone.insert(name, ip);
        Ok(())
    }

    /// 从 `from` 的视角解析名字；查不到返回 `None`
    pub fn resolve_dns(&self, from: DeviceId, name: &str) -> Option<Ipv4Addr> {
        let name = name.trim();
        if let Ok(ip) = parse_ipv4(name) {
            return Some(ip);
        }
        if let Some(ip) = self.resolve_hostname(name) {
            return Some(ip);
        }
        let lower = name.to_ascii_lowercase();
        if let Some(stripped) = lower.strip_suffix(".local") {
            if let Some(ip) = self.resolve_hostname(stripped) {
                return Some(ip);
            }
        }

        // 先问查询方配置的 DNS 服务器
        let configured: Vec<Ipv4Addr> = self
            .device(from)
            .map(|d| {
                d.interfaces
                    .iter()
                    .flat_map(|i| i.dns_servers.iter().copied())
                    .collect()
            })
            .unwrap_or_default();
        for server_ip in configured {
            if let Some(ip) = self
                .device_with_ip(server_ip)
                .and_then(|srv| srv.dns_zone.lookup(name))
            {
                trace!(name, %server_ip, %ip, "DNS 由配置的服务器解析");
                return Some(ip);
            }
        }
        self.devices()
            .filter(|d| d.kind.can_serve_dns())
            .find_map(|d| d.dns_zone.lookup(name))
    }

    /// 反向解析：先查区域记录，再查主机名
    pub fn reverse_dns(&self, ip: Ipv4Addr) -> Option<String> {
        self.devices()
            .find_map(|d| d.dns_zone.reverse(ip).map(str::to_string))
            .or_else(|| self.device_with_ip(ip).map(|d| d.hostname.clone()))
    }

    /// 按主机名找设备，返回它第一个已配置的地址
    fn resolve_hostname(&self, name: &str) -> Option<Ipv4Addr> {
        self.devices()
            .filter(|d| d.hostname.eq_ignore_ascii_case(name))
            .find_map(|d| d.addresses().first().copied())
    }
}
