//! ARP 缓存
//!
//! 表项不会自动老化淘汰；`age` 只是计数器，供展示使用。

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::addr::{MacAddr, RouteEgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArpEntryKind {
    Dynamic,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    /// 学到该表项的接口
    pub interface: RouteEgress,
    pub kind: ArpEntryKind,
    /// 自上次刷新以来经过的 tick 数
    pub age: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpCache {
    entries: Vec<ArpEntry>,
}

impl ArpCache {
    pub fn entries(&self) -> &[ArpEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, ip: Ipv4Addr) -> Option<&ArpEntry> {
        self.entries.iter().find(|e| e.ip == ip)
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entry(ip).map(|e| e.mac)
    }

    /// 学习/刷新动态表项；静态表项不会被覆盖。返回表项是否有变化
    pub fn learn(&mut self, ip: Ipv4Addr, mac: MacAddr, interface: RouteEgress) -> bool {
        match self.entries.iter_mut().find(|e| e.ip == ip) {
            Some(e) if e.kind == ArpEntryKind::Static => false,
            Some(e) => {
                let changed = e.mac != mac || e.interface != interface;
                e.mac = mac;
                e.interface = interface;
                e.age = 0;
                changed
            }
            None => {
                self.entries.push(ArpEntry {
                    ip,
                    mac,
                    interface,
                    kind: ArpEntryKind::Dynamic,
                    age: 0,
                });
                true
            }
        }
    }

    pub fn add_static(&mut self, ip: Ipv4Addr, mac: MacAddr, interface: RouteEgress) {
        self.entries.retain(|e| e.ip != ip);
        self.entries.push(ArpEntry {
            ip,
            mac,
            interface,
            kind: ArpEntryKind::Static,
            age: 0,
        });
    }

    pub fn remove(&mut self, ip: Ipv4Addr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.ip != ip);
        before != self.entries.len()
    }

    /// 清除全部动态表项（静态表项保留）
    pub fn clear(&mut self) {
        self.entries.retain(|e| e.kind == ArpEntryKind::Static);
    }

    /// 删除经某个接口学到的动态表项
    pub fn flush_interface(&mut self, interface: RouteEgress) {
        self.entries
            .retain(|e| e.kind == ArpEntryKind::Static || e.interface != interface);
    }

    pub(crate) fn tick_age(&mut self) {
        for e in &mut self.entries {
            if e.kind == ArpEntryKind::Dynamic {
                e.age = e.age.saturating_add(1);
            }
        }
    }
}
