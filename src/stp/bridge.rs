//! 生成树的桥/端口状态

use std::fmt;

use serde::{Deserialize, Serialize};

use super::bpdu::Bpdu;
use crate::addr::MacAddr;

pub const DEFAULT_BRIDGE_PRIORITY: u16 = 32768;
pub const BRIDGE_PRIORITY_STEP: u16 = 4096;
pub const MAX_BRIDGE_PRIORITY: u16 = 61440;
pub const DEFAULT_PORT_PRIORITY: u8 = 128;

/// 桥标识：先比较优先级，再按字节序比较 MAC（越小越优）
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BridgeId {
    pub priority: u16,
    pub mac: MacAddr,
}

impl BridgeId {
    pub fn new(priority: u16, mac: MacAddr) -> Self {
        Self { priority, mac }
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}.", self.priority)?;
        for b in self.mac.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BridgeId({self})")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Disabled,
    Blocking,
    Listening,
    Learning,
    Forwarding,
}

impl PortState {
    /// 是否学习源 MAC
    pub fn learns(self) -> bool {
        matches!(self, PortState::Learning | PortState::Forwarding)
    }

    pub fn forwards(self) -> bool {
        self == PortState::Forwarding
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRole {
    Root,
    Designated,
    Alternate,
    Backup,
    Disabled,
}

/// 按接口速率给出默认路径开销（802.1D short path cost）
pub fn path_cost_for_speed(speed_mbps: u32) -> u32 {
    match speed_mbps {
        0..=10 => 100,
        11..=100 => 19,
        101..=1000 => 4,
        1001..=10000 => 2,
        _ => 1,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StpPort {
    pub state: PortState,
    pub role: PortRole,
    /// 由接口速率得出的默认开销
    pub path_cost: u32,
    pub cost_override: Option<u32>,
    pub priority: u8,
    pub port_id: u16,
    #[serde(default)]
    pub last_bpdu: Option<Bpdu>,
    #[serde(default)]
    pub bpdus_received: u64,
}

impl StpPort {
    fn new(index: usize, speed_mbps: u32) -> Self {
        Self {
            state: PortState::Forwarding,
            role: PortRole::Designated,
            path_cost: path_cost_for_speed(speed_mbps),
            cost_override: None,
            priority: DEFAULT_PORT_PRIORITY,
            port_id: port_id(DEFAULT_PORT_PRIORITY, index),
            last_bpdu: None,
            bpdus_received: 0,
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost_override.unwrap_or(self.path_cost)
    }
}

/// 端口标识：高 8 位为端口优先级，低 8 位为端口号（从 1 开始）
pub fn port_id(priority: u8, index: usize) -> u16 {
    ((priority as u16) << 8) | ((index as u16 + 1) & 0xff)
}

/// 一台交换机上的生成树实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StpBridge {
    pub enabled: bool,
    pub priority: u16,
    pub bridge_id: BridgeId,
    pub root_id: BridgeId,
    pub root_path_cost: u32,
    pub root_port: Option<usize>,
    pub ports: Vec<StpPort>,
    pub topology_changes: u64,
}

impl StpBridge {
    pub fn new(mac: MacAddr, port_speeds: &[u32]) -> Self {
        let bridge_id = BridgeId::new(DEFAULT_BRIDGE_PRIORITY, mac);
        Self {
            enabled: true,
            priority: DEFAULT_BRIDGE_PRIORITY,
            bridge_id,
            root_id: bridge_id,
            root_path_cost: 0,
            root_port: None,
            ports: port_speeds
                .iter()
                .enumerate()
                .map(|(i, &s)| StpPort::new(i, s))
                .collect(),
            topology_changes: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.root_id == self.bridge_id
    }

    pub fn port(&self, index: usize) -> Option<&StpPort> {
        self.ports.get(index)
    }

    /// 端口的有效状态；关闭 STP 时一律转发
    pub fn port_state(&self, index: usize) -> PortState {
        if !self.enabled {
            return PortState::Forwarding;
        }
        self.ports
            .get(index)
            .map(|p| p.state)
            .unwrap_or(PortState::Disabled)
    }

    pub fn forwards(&self, index: usize) -> bool {
        self.port_state(index).forwards()
    }

    pub fn learns(&self, index: usize) -> bool {
        self.port_state(index).learns()
    }

    pub(crate) fn set_priority(&mut self, priority: u16) {
        self.priority = priority;
        self.bridge_id.priority = priority;
    }

    /// 收敛前复位为“自认根桥”
    pub(crate) fn reset_to_self_root(&mut self) {
        self.root_id = self.bridge_id;
        self.root_path_cost = 0;
        self.root_port = None;
    }

    pub(crate) fn record_bpdu(&mut self, index: usize, bpdu: Bpdu) {
        if let Some(p) = self.ports.get_mut(index) {
            p.bpdus_received += 1;
            p.last_bpdu = Some(bpdu);
        }
    }
}
