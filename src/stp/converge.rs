//! 生成树收敛
//!
//! 同步不动点模型：每次调用都从“每台桥自认根”出发，
//! 按邻居当前通告的 (根, 开销) 迭代更新（Jacobi 式 Bellman-Ford），
//! 直到不再变化或达到迭代上限，然后一次性给所有端口分配角色与状态。

use std::collections::BTreeMap;

use tracing::{debug, info, trace};

use super::bridge::{
    BRIDGE_PRIORITY_STEP, BridgeId, MAX_BRIDGE_PRIORITY, PortRole, PortState,
};
use crate::net::{DeviceId, NetError, Network, PortId};

/// 参与收敛的一个端口快照
#[derive(Debug, Clone)]
struct PortView {
    active: bool,
    cost: u32,
    port_id: u16,
    peer: Option<PortId>,
}

#[derive(Debug, Clone)]
struct BridgeView {
    bid: BridgeId,
    ports: Vec<PortView>,
}

/// 一台桥当前认定的根向量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RootVector {
    root: BridgeId,
    cost: u32,
    root_port: Option<usize>,
}

impl Network {
    /// 启用/关闭某台交换机的 STP；关闭后所有端口直接转发
    pub fn set_stp_enabled(&mut self, id: DeviceId, enabled: bool) -> Result<(), NetError> {
        let dev = self.device_mut(id)?;
        let kind = dev.kind;
        let stp = dev.stp.as_mut().ok_or(NetError::Unsupported {
            kind,
            feature: "stp",
        })?;
        stp.enabled = enabled;
        info!(device = id.0, enabled, "🌲 STP 开关");
        self.converge_stp();
        Ok(())
    }

    /// 设置桥优先级（0..=61440，且为 4096 的整数倍）
    pub fn set_bridge_priority(&mut self, id: DeviceId, priority: u32) -> Result<(), NetError> {
        if priority > MAX_BRIDGE_PRIORITY as u32 || priority % BRIDGE_PRIORITY_STEP as u32 != 0 {
            return Err(NetError::InvalidBridgePriority(priority));
        }
        let dev = self.device_mut(id)?;
        let kind = dev.kind;
        let stp = dev.stp.as_mut().ok_or(NetError::Unsupported {
            kind,
            feature: "stp",
        })?;
        stp.set_priority(priority as u16);
        self.converge_stp();
        Ok(())
    }

    /// 覆盖端口路径开销；`None` 恢复按速率计算的默认值
    pub fn set_port_cost(&mut self, port: PortId, cost: Option<u32>) -> Result<(), NetError> {
        if cost == Some(0) {
            return Err(NetError::InvalidPathCost(0));
        }
        let dev = self.device_mut(port.device)?;
        let kind = dev.kind;
        let stp = dev.stp.as_mut().ok_or(NetError::Unsupported {
            kind,
            feature: "stp",
        })?;
        let p = stp
            .ports
            .get_mut(port.index)
            .ok_or(NetError::UnknownPort(port))?;
        p.cost_override = cost;
        self.converge_stp();
        Ok(())
    }

    /// 链路增删或接口启停后调用：所有运行 STP 的交换机拓扑变更计数加一并重新收敛
    pub(crate) fn topology_changed(&mut self) {
        let mut bumped = 0;
        for dev in self.devices_mut() {
            if let Some(stp) = dev.stp.as_mut().filter(|s| s.enabled) {
                stp.topology_changes += 1;
                bumped += 1;
            }
        }
        if bumped > 0 {
            debug!(bridges = bumped, "拓扑变更");
        }
        self.converge_stp();
    }

    /// 重新计算所有交换机的根桥、根端口以及端口角色/状态
    #[tracing::instrument(skip(self))]
    pub fn converge_stp(&mut self) {
        let bridges = self.bridge_views();
        if bridges.is_empty() {
            self.open_disabled_bridges();
            return;
        }

        let mut best: BTreeMap<DeviceId, RootVector> = bridges
            .iter()
            .map(|(id, v)| {
                (
                    *id,
                    RootVector {
                        root: v.bid,
                        cost: 0,
                        root_port: None,
                    },
                )
            })
            .collect();

        let bound = bridges.len() + 2;
        let mut rounds = 0;
        for _ in 0..bound {
            rounds += 1;
            let next: BTreeMap<DeviceId, RootVector> = bridges
                .iter()
                .map(|(id, view)| (*id, best_vector(*id, view, &bridges, &best)))
                .collect();
            if next == best {
                break;
            }
            best = next;
        }
        trace!(rounds, bridges = bridges.len(), "收敛迭代完成");

        for (id, view) in &bridges {
            let me = best[id];
            let roles: Vec<(PortRole, PortState)> = view
                .ports
                .iter()
                .enumerate()
                .map(|(index, port)| port_role(*id, index, port, view, me, &bridges, &best))
                .collect();

            let Ok(dev) = self.device_mut(*id) else {
                continue;
            };
            let Some(stp) = dev.stp.as_mut() else {
                continue;
            };
            stp.root_id = me.root;
            stp.root_path_cost = me.cost;
            stp.root_port = me.root_port;
            let mut blocked = Vec::new();
            for (index, (role, state)) in roles.into_iter().enumerate() {
                if let Some(p) = stp.ports.get_mut(index) {
                    p.role = role;
                    p.state = state;
                }
                if state != PortState::Forwarding {
                    blocked.push(index);
                }
            }
            for index in blocked {
                dev.mac_table.flush_port(index);
            }
            debug!(
                device = id.0,
                root = %me.root,
                cost = me.cost,
                root_port = ?me.root_port,
                "🌲 STP 端口角色已更新"
            );
        }

        self.open_disabled_bridges();
    }

    fn bridge_views(&self) -> BTreeMap<DeviceId, BridgeView> {
        let mut views = BTreeMap::new();
        for dev in self.devices() {
            let Some(stp) = dev.stp.as_ref().filter(|s| s.enabled) else {
                continue;
            };
            let ports = stp
                .ports
                .iter()
                .enumerate()
                .map(|(index, p)| {
                    let port = PortId::new(dev.id, index);
                    PortView {
                        active: self.is_port_active(port),
                        cost: p.cost(),
                        port_id: p.port_id,
                        peer: self.peer_of(port),
                    }
                })
                .collect();
            views.insert(
                dev.id,
                BridgeView {
                    bid: stp.bridge_id,
                    ports,
                },
            );
        }
        views
    }

    /// 关闭了 STP 的交换机：所有端口转发，自认根
    fn open_disabled_bridges(&mut self) {
        for dev in self.devices_mut() {
            if let Some(stp) = dev.stp.as_mut().filter(|s| !s.enabled) {
                stp.reset_to_self_root();
                for p in &mut stp.ports {
                    p.role = PortRole::Designated;
                    p.state = PortState::Forwarding;
                }
            }
        }
    }
}

/// 从邻居通告中挑选最优根向量
///
/// 比较键：(根桥, 经该端口的开销, 邻居桥, 邻居端口, 本端口)。
fn best_vector(
    id: DeviceId,
    view: &BridgeView,
    bridges: &BTreeMap<DeviceId, BridgeView>,
    best: &BTreeMap<DeviceId, RootVector>,
) -> RootVector {
    let mut key = (view.bid, 0u32, view.bid, 0u16, 0u16);
    let mut root_port = None;
    for (index, port) in view.ports.iter().enumerate() {
        if !port.active {
            continue;
        }
        let Some(peer) = port.peer else {
            continue;
        };
        if peer.device == id {
            continue;
        }
        let (Some(nview), Some(nvec)) = (bridges.get(&peer.device), best.get(&peer.device)) else {
            continue;
        };
        let Some(nport) = nview.ports.get(peer.index) else {
            continue;
        };
        let cand = (
            nvec.root,
            nvec.cost.saturating_add(port.cost),
            nview.bid,
            nport.port_id,
            port.port_id,
        );
        if cand < key {
            key = cand;
            root_port = Some(index);
        }
    }
    RootVector {
        root: key.0,
        cost: key.1,
        root_port,
    }
}

fn port_role(
    id: DeviceId,
    index: usize,
    port: &PortView,
    view: &BridgeView,
    me: RootVector,
    bridges: &BTreeMap<DeviceId, BridgeView>,
    best: &BTreeMap<DeviceId, RootVector>,
) -> (PortRole, PortState) {
    if !port.active {
        return (PortRole::Disabled, PortState::Disabled);
    }
    if me.root_port == Some(index) {
        return (PortRole::Root, PortState::Forwarding);
    }
    let neighbor = port.peer.and_then(|peer| {
        let nview = bridges.get(&peer.device)?;
        let nvec = best.get(&peer.device)?;
        let nport = nview.ports.get(peer.index)?;
        Some((peer, nview.bid, *nvec, nport.port_id))
    });
    // 对端不跑 STP：边缘端口
    let Some((peer, nbid, nvec, npid)) = neighbor else {
        return (PortRole::Designated, PortState::Forwarding);
    };

    let mine = (me.root, me.cost, view.bid, port.port_id);
    let theirs = (nvec.root, nvec.cost, nbid, npid);
    if mine < theirs {
        (PortRole::Designated, PortState::Forwarding)
    } else if peer.device == id {
        (PortRole::Backup, PortState::Blocking)
    } else {
        (PortRole::Alternate, PortState::Blocking)
    }
}
