//! 接口类型
//!
//! 接口归设备独占。对端关系（connectedTo）不存放在接口里，
//! 而是由 [`Network`](super::Network) 的端口→连接索引维护。

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::addr::{MacAddr, broadcast_address, same_subnet};

pub const DEFAULT_VLAN: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Duplex {
    #[default]
    Full,
    Half,
}

/// 交换机端口模式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SwitchportMode {
    Access {
        vlan: u16,
    },
    Trunk {
        native_vlan: u16,
        /// `None` 表示允许全部 VLAN
        #[serde(default)]
        allowed: Option<Vec<u16>>,
    },
}

impl Default for SwitchportMode {
    fn default() -> Self {
        SwitchportMode::Access { vlan: DEFAULT_VLAN }
    }
}

impl SwitchportMode {
    /// 该端口是否承载 `vlan`
    pub fn carries(&self, vlan: u16) -> bool {
        match self {
            SwitchportMode::Access { vlan: v } => *v == vlan,
            SwitchportMode::Trunk {
                native_vlan,
                allowed,
            } => {
                vlan == *native_vlan
                    || allowed.as_ref().is_none_or(|list| list.contains(&vlan))
            }
        }
    }

    /// 入方向：由帧上的 tag 推出所属 VLAN；不被接受时返回 `None`
    pub fn ingress_vlan(&self, tag: Option<u16>) -> Option<u16> {
        match (self, tag) {
            (SwitchportMode::Access { vlan }, None) => Some(*vlan),
            (SwitchportMode::Access { vlan }, Some(t)) => (t == *vlan).then_some(t),
            (SwitchportMode::Trunk { native_vlan, .. }, None) => Some(*native_vlan),
            (SwitchportMode::Trunk { .. }, Some(t)) => self.carries(t).then_some(t),
        }
    }

    /// 出方向的 tag：access 口剥离，trunk 口除 native VLAN 外都打 tag
    pub fn egress_tag(&self, vlan: u16) -> Option<u16> {
        match self {
            SwitchportMode::Access { .. } => None,
            SwitchportMode::Trunk { native_vlan, .. } => (vlan != *native_vlan).then_some(vlan),
        }
    }
}

/// 网络接口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Option<Ipv4Addr>,
    pub mask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub dns_servers: Vec<Ipv4Addr>,
    pub up: bool,
    pub speed_mbps: u32,
    #[serde(default)]
    pub duplex: Duplex,
    /// 仅交换机端口有值
    #[serde(default)]
    pub switchport: Option<SwitchportMode>,
    #[serde(default)]
    pub dhcp_enabled: bool,
}

impl Interface {
    pub fn new(name: impl Into<String>, mac: MacAddr, speed_mbps: u32) -> Self {
        Self {
            name: name.into(),
            mac,
            ip: None,
            mask: None,
            gateway: None,
            dns_servers: Vec::new(),
            up: true,
            speed_mbps,
            duplex: Duplex::Full,
            switchport: None,
            dhcp_enabled: false,
        }
    }

    pub fn has_address(&self) -> bool {
        self.ip.is_some() && self.mask.is_some()
    }

    /// `ip` 是否落在本接口所在子网
    pub fn in_subnet(&self, ip: Ipv4Addr) -> bool {
        match (self.ip, self.mask) {
            (Some(own), Some(mask)) => same_subnet(own, ip, mask),
            _ => false,
        }
    }

    /// `ip` 是否为本接口子网的定向广播或受限广播
    pub fn is_broadcast_for(&self, ip: Ipv4Addr) -> bool {
        if ip == Ipv4Addr::BROADCAST {
            return true;
        }
        match (self.ip, self.mask) {
            (Some(own), Some(mask)) => broadcast_address(own, mask) == ip,
            _ => false,
        }
    }

    pub fn clear_address(&mut self) {
        self.ip = None;
        self.mask = None;
        self.gateway = None;
        self.dns_servers.clear();
        self.dhcp_enabled = false;
    }
}
