//! 设备类型
//!
//! 设备种类用枚举表示，按能力（二层交换、三层转发、STP 等）分支，
//! 协议相关的附属状态（路由表、MAC 表、ARP 缓存……）都直接挂在 [`Device`] 上。

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::id::DeviceId;
use super::interface::{DEFAULT_VLAN, Interface, SwitchportMode};
use crate::addr::{MacAddr, RouteEgress, RoutingTable};
use crate::proto::tcp::TcpTable;
use crate::services::{ArpCache, DhcpLease, DhcpPool, DnsZone};
use crate::stp::StpBridge;

/// 设备种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    Host,
    Server,
    Switch,
    L3Switch,
    Router,
    Firewall,
}

impl DeviceKind {
    /// 二层交换（MAC 学习/泛洪、VLAN）
    pub fn has_l2(self) -> bool {
        matches!(self, DeviceKind::Switch | DeviceKind::L3Switch)
    }

    /// 可以配置 IP 地址
    pub fn has_l3(self) -> bool {
        self != DeviceKind::Switch
    }

    /// 会在接口之间转发三层包
    pub fn routes_packets(self) -> bool {
        matches!(
            self,
            DeviceKind::L3Switch | DeviceKind::Router | DeviceKind::Firewall
        )
    }

    pub fn has_stp(self) -> bool {
        self.has_l2()
    }

    pub fn can_serve_dhcp(self) -> bool {
        matches!(
            self,
            DeviceKind::Server | DeviceKind::Router | DeviceKind::L3Switch | DeviceKind::Firewall
        )
    }

    pub fn can_serve_dns(self) -> bool {
        self == DeviceKind::Server
    }

    /// 默认端口：(名字列表, 速率 Mbps)
    fn default_ports(self) -> (Vec<String>, u32) {
        match self {
            DeviceKind::Host | DeviceKind::Server => (vec!["eth0".to_string()], 1000),
            DeviceKind::Switch => ((1..=8).map(|i| format!("fa0/{i}")).collect(), 100),
            DeviceKind::L3Switch => ((1..=8).map(|i| format!("gi0/{i}")).collect(), 1000),
            DeviceKind::Router => ((0..4).map(|i| format!("gi0/{i}")).collect(), 1000),
            DeviceKind::Firewall => ((0..4).map(|i| format!("eth{i}")).collect(), 1000),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceKind::Host => "host",
            DeviceKind::Server => "server",
            DeviceKind::Switch => "switch",
            DeviceKind::L3Switch => "l3-switch",
            DeviceKind::Router => "router",
            DeviceKind::Firewall => "firewall",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacEntryKind {
    Dynamic,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacEntry {
    pub mac: MacAddr,
    pub port: usize,
    pub vlan: u16,
    pub kind: MacEntryKind,
    pub age: u64,
}

/// 交换机 MAC 地址表，按 (MAC, VLAN) 索引
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacTable {
    entries: Vec<MacEntry>,
}

impl MacTable {
    pub fn entries(&self) -> &[MacEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, mac: MacAddr, vlan: u16) -> Option<&MacEntry> {
        self.entries.iter().find(|e| e.mac == mac && e.vlan == vlan)
    }

    /// 学习源地址；静态表项不会被改写
    pub fn learn(&mut self, mac: MacAddr, port: usize, vlan: u16) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.mac == mac && e.vlan == vlan)
        {
            Some(e) if e.kind == MacEntryKind::Static => {}
            Some(e) => {
                e.port = port;
                e.age = 0;
            }
            None => self.entries.push(MacEntry {
                mac,
                port,
                vlan,
                kind: MacEntryKind::Dynamic,
                age: 0,
            }),
        }
    }

    pub fn add_static(&mut self, mac: MacAddr, port: usize, vlan: u16) {
        self.entries.retain(|e| !(e.mac == mac && e.vlan == vlan));
        self.entries.push(MacEntry {
            mac,
            port,
            vlan,
            kind: MacEntryKind::Static,
            age: 0,
        });
    }

    /// 删除某端口上的动态表项
    pub fn flush_port(&mut self, port: usize) {
        self.entries
            .retain(|e| e.kind == MacEntryKind::Static || e.port != port);
    }

    pub fn flush_vlan(&mut self, vlan: u16) {
        self.entries.retain(|e| e.vlan != vlan);
    }

    pub fn clear(&mut self) {
        self.entries.retain(|e| e.kind == MacEntryKind::Static);
    }

    pub(crate) fn tick_age(&mut self) {
        for e in &mut self.entries {
            if e.kind == MacEntryKind::Dynamic {
                e.age = e.age.saturating_add(1);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub id: u16,
    pub name: String,
}

/// 交换机虚拟接口（三层交换机上绑定 VLAN 的三层接口）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Svi {
    pub vlan: u16,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub mac: MacAddr,
    pub up: bool,
}

/// 网络设备
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub hostname: String,
    pub kind: DeviceKind,
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub routes: RoutingTable,
    #[serde(default)]
    pub mac_table: MacTable,
    #[serde(default)]
    pub arp: ArpCache,
    #[serde(default)]
    pub dhcp_pools: Vec<DhcpPool>,
    #[serde(default)]
    pub dhcp_leases: Vec<DhcpLease>,
    #[serde(default)]
    pub dns_zone: DnsZone,
    #[serde(default)]
    pub tcp: TcpTable,
    #[serde(default)]
    pub stp: Option<StpBridge>,
    #[serde(default)]
    pub vlans: BTreeMap<u16, Vlan>,
    #[serde(default)]
    pub svis: Vec<Svi>,
}

impl Device {
    /// 按种类创建带默认端口的设备；`next_mac` 为全网 MAC 分配游标
    pub fn new(id: DeviceId, kind: DeviceKind, name: impl Into<String>, next_mac: &mut u64) -> Self {
        let name = name.into();
        let (names, speed) = kind.default_ports();
        let interfaces: Vec<Interface> = names
            .into_iter()
            .map(|n| {
                let mac = MacAddr::local(*next_mac);
                *next_mac += 1;
                let mut iface = Interface::new(n, mac, speed);
                if kind.has_l2() {
                    iface.switchport = Some(SwitchportMode::default());
                }
                iface
            })
            .collect();

        let mut vlans = BTreeMap::new();
        let stp = if kind.has_stp() {
            vlans.insert(
                DEFAULT_VLAN,
                Vlan {
                    id: DEFAULT_VLAN,
                    name: "default".to_string(),
                },
            );
            let speeds: Vec<u32> = interfaces.iter().map(|i| i.speed_mbps).collect();
            let mac = interfaces.first().map(|i| i.mac).unwrap_or_default();
            Some(StpBridge::new(mac, &speeds))
        } else {
            None
        };

        Self {
            id,
            hostname: name.clone(),
            name,
            kind,
            interfaces,
            routes: RoutingTable::default(),
            mac_table: MacTable::default(),
            arp: ArpCache::default(),
            dhcp_pools: Vec::new(),
            dhcp_leases: Vec::new(),
            dns_zone: DnsZone::default(),
            tcp: TcpTable::default(),
            stp,
            vlans,
            svis: Vec::new(),
        }
    }

    pub fn interface(&self, index: usize) -> Option<&Interface> {
        self.interfaces.get(index)
    }

    pub fn interface_index(&self, name: &str) -> Option<usize> {
        self.interfaces
            .iter()
            .position(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_mac(&self) -> MacAddr {
        self.interfaces.first().map(|i| i.mac).unwrap_or_default()
    }

    pub fn svi(&self, vlan: u16) -> Option<&Svi> {
        self.svis.iter().find(|s| s.vlan == vlan)
    }

    /// MAC 是否属于本设备（接口或 SVI）
    pub fn owns_mac(&self, mac: MacAddr) -> bool {
        self.interfaces.iter().any(|i| i.mac == mac) || self.svis.iter().any(|s| s.mac == mac)
    }

    /// IP 是否配置在本设备某个接口或 SVI 上
    pub fn owns_ip(&self, ip: Ipv4Addr) -> bool {
        self.interfaces.iter().any(|i| i.ip == Some(ip))
            || self.svis.iter().any(|s| s.ip == ip)
    }

    /// 所有已配置的 IP
    pub fn addresses(&self) -> Vec<Ipv4Addr> {
        self.interfaces
            .iter()
            .filter_map(|i| i.ip)
            .chain(self.svis.iter().map(|s| s.ip))
            .collect()
    }

    /// 某个三层出口上的 (IP, MAC)
    pub fn l3_address(&self, egress: RouteEgress) -> Option<(Ipv4Addr, MacAddr)> {
        match egress {
            RouteEgress::Port(i) => {
                let iface = self.interfaces.get(i)?;
                Some((iface.ip?, iface.mac))
            }
            RouteEgress::Svi(vlan) => self.svi(vlan).map(|s| (s.ip, s.mac)),
        }
    }

    /// 选一个用作源地址的 IP：优先与 `dst` 同网段的接口，否则第一个有地址的接口
    pub fn source_ip_for(&self, dst: Ipv4Addr) -> Option<Ipv4Addr> {
        let same = self
            .interfaces
            .iter()
            .filter(|i| i.up && i.in_subnet(dst))
            .find_map(|i| i.ip)
            .or_else(|| {
                self.svis
                    .iter()
                    .find(|s| s.up && crate::addr::same_subnet(s.ip, dst, s.mask))
                    .map(|s| s.ip)
            });
        if same.is_some() {
            return same;
        }
        if let Some(route) = self.routes.lookup(dst) {
            if let Some((ip, _)) = self.l3_address(route.egress) {
                return Some(ip);
            }
        }
        self.interfaces
            .iter()
            .filter(|i| i.up)
            .find_map(|i| i.ip)
            .or_else(|| self.svis.first().map(|s| s.ip))
    }
}
