//! 拓扑快照（JSON 导入导出）
//!
//! 快照只包含 `{devices, connections}`；导入时校验连接端点存在且没有接口被引用两次。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::device::Device;
use super::id::PortId;
use super::link::Connection;
use super::network::Network;

/// 快照中设备/连接编号的上限（导入时按编号分配槽位）
pub const MAX_SNAPSHOT_ID: usize = 1 << 16;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{kind} id {id} is out of range (must be below {max})", max = MAX_SNAPSHOT_ID)]
    IdOutOfRange { kind: &'static str, id: usize },
    #[error("duplicate device id {0}")]
    DuplicateDevice(usize),
    #[error("duplicate connection id {0}")]
    DuplicateConnection(usize),
    #[error("connection {conn} references missing interface {port}")]
    DanglingEndpoint { conn: usize, port: PortId },
    #[error("interface {0} is used by more than one connection")]
    InterfaceReused(PortId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub devices: Vec<Device>,
    pub connections: Vec<Connection>,
}

impl Network {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            devices: self.devices().cloned().collect(),
            connections: self.connections().cloned().collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn from_json(s: &str) -> Result<Network, SnapshotError> {
        let snap: Snapshot = serde_json::from_str(s)?;
        Network::from_snapshot(snap)
    }

    /// 校验并重建网络；id 保持不变
    pub fn from_snapshot(snap: Snapshot) -> Result<Network, SnapshotError> {
        let ids = snap
            .devices
            .iter()
            .map(|d| ("device", d.id.0))
            .chain(snap.connections.iter().map(|c| ("connection", c.id.0)));
        for (kind, id) in ids {
            if id >= MAX_SNAPSHOT_ID {
                return Err(SnapshotError::IdOutOfRange { kind, id });
            }
        }

        let dev_len = snap.devices.iter().map(|d| d.id.0 + 1).max().unwrap_or(0);
        let mut devices: Vec<Option<Device>> = (0..dev_len).map(|_| None).collect();
        for d in snap.devices {
            let slot = d.id.0;
            if devices[slot].is_some() {
                return Err(SnapshotError::DuplicateDevice(slot));
            }
            devices[slot] = Some(d);
        }

        let conn_len = snap.connections.iter().map(|c| c.id.0 + 1).max().unwrap_or(0);
        let mut connections: Vec<Option<Connection>> = (0..conn_len).map(|_| None).collect();
        let mut used = HashSet::new();
        for c in snap.connections {
            for port in [c.a, c.b] {
                let exists = devices
                    .get(port.device.0)
                    .and_then(|d| d.as_ref())
                    .is_some_and(|d| port.index < d.interfaces.len());
                if !exists {
                    return Err(SnapshotError::DanglingEndpoint { conn: c.id.0, port });
                }
                if !used.insert(port) {
                    return Err(SnapshotError::InterfaceReused(port));
                }
            }
            let slot = c.id.0;
            if connections[slot].is_some() {
                return Err(SnapshotError::DuplicateConnection(slot));
            }
            connections[slot] = Some(c);
        }

        let net = Network::from_parts(devices, connections);
        info!(
            devices = net.device_count(),
            connections = net.connections().count(),
            "📥 导入快照"
        );
        Ok(net)
    }
}
