//! DHCP 服务
//!
//! 不模拟 DISCOVER/OFFER 报文交换：客户端请求沿二层广播域（经交换机邻接）
//! 广度优先地找到第一台配置了地址池的设备，直接分配并配置接口。

use std::collections::{HashSet, VecDeque};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::addr::{MacAddr, is_valid_mask, parse_ipv4, parse_mask, same_subnet};
use crate::net::{DeviceId, NetError, Network, PortId};
use crate::sim::SimTime;

#[derive(Debug, Error)]
pub enum DhcpError {
    #[error("interface {0} is not connected")]
    InterfaceNotConnected(PortId),
    #[error("no DHCP server found from {0}")]
    NoServerFound(PortId),
    #[error("address pool on {0:?} is exhausted")]
    PoolExhausted(DeviceId),
    #[error("invalid pool: {0}")]
    InvalidPool(&'static str),
    #[error("no lease held by interface {0}")]
    NoLease(PortId),
    #[error(transparent)]
    Net(#[from] NetError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpPool {
    pub pool_start: Ipv4Addr,
    pub pool_end: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
    pub lease_time_secs: u64,
}

impl DhcpPool {
    pub const DEFAULT_LEASE_SECS: u64 = 86_400;

    /// 由文本参数构造并校验
    pub fn parse(start: &str, end: &str, mask: &str, gateway: Option<&str>) -> Result<Self, DhcpError> {
        let pool = Self {
            pool_start: parse_ipv4(start).map_err(NetError::from)?,
            pool_end: parse_ipv4(end).map_err(NetError::from)?,
            subnet_mask: parse_mask(mask).map_err(NetError::from)?,
            gateway: gateway
                .map(parse_ipv4)
                .transpose()
                .map_err(NetError::from)?,
            dns: Vec::new(),
            lease_time_secs: Self::DEFAULT_LEASE_SECS,
        };
        pool.validate()?;
        Ok(pool)
    }

    pub fn validate(&self) -> Result<(), DhcpError> {
        if !is_valid_mask(self.subnet_mask) {
            return Err(DhcpError::InvalidPool("non-contiguous mask"));
        }
        if u32::from(self.pool_start) > u32::from(self.pool_end) {
            return Err(DhcpError::InvalidPool("start is after end"));
        }
        if !same_subnet(self.pool_start, self.pool_end, self.subnet_mask) {
            return Err(DhcpError::InvalidPool("range spans several subnets"));
        }
        if self
            .gateway
            .is_some_and(|gw| !same_subnet(gw, self.pool_start, self.subnet_mask))
        {
            return Err(DhcpError::InvalidPool("gateway outside the pool subnet"));
        }
        Ok(())
    }

    fn contains(&self, ip: Ipv4Addr) -> bool {
        (u32::from(self.pool_start)..=u32::from(self.pool_end)).contains(&u32::from(ip))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpLease {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub start: SimTime,
    pub end: SimTime,
}

impl Network {
    pub fn add_dhcp_pool(&mut self, id: DeviceId, pool: DhcpPool) -> Result<(), DhcpError> {
        pool.validate()?;
        let dev = self.device_mut(id)?;
        if !dev.kind.can_serve_dhcp() {
            return Err(NetError::Unsupported {
                kind: dev.kind,
                feature: "dhcp server",
            }
            .into());
        }
        info!(device = id.0, start = %pool.pool_start, end = %pool.pool_end, "📦 添加 DHCP 地址池");
        dev.dhcp_pools.push(pool);
        Ok(())
    }

    /// 为客户端接口申请地址并完成配置
    #[tracing::instrument(skip(self), fields(port = %port))]
    pub fn request_dhcp(&mut self, port: PortId, now: SimTime) -> Result<DhcpLease, DhcpError> {
        let client = self.device(port.device)?;
        if !client.kind.has_l3() {
            return Err(NetError::Unsupported {
                kind: client.kind,
                feature: "dhcp client",
            }
            .into());
        }
        let mac = self.interface(port)?.mac;
        if !self.is_port_active(port) {
            return Err(DhcpError::InterfaceNotConnected(port));
        }

        let (server, pool_idx) = self
            .find_dhcp_server(port)
            .ok_or(DhcpError::NoServerFound(port))?;
        let srv = self.device(server)?;
        let pool = srv.dhcp_pools[pool_idx].clone();

        let existing = srv
            .dhcp_leases
            .iter()
            .find(|l| l.mac == mac && pool.contains(l.ip))
            .map(|l| l.ip);
        let ip = match existing {
            Some(ip) => ip,
            None => {
                let own = srv.addresses();
                let leased: HashSet<Ipv4Addr> = srv.dhcp_leases.iter().map(|l| l.ip).collect();
                (u32::from(pool.pool_start)..=u32::from(pool.pool_end))
                    .map(Ipv4Addr::from)
                    .find(|ip| {
                        !leased.contains(ip) && Some(*ip) != pool.gateway && !own.contains(ip)
                    })
                    .ok_or(DhcpError::PoolExhausted(server))?
            }
        };

        let lease = DhcpLease {
            ip,
            mac,
            start: now,
            end: now + SimTime::from_secs(pool.lease_time_secs),
        };
        let srv = self.device_mut(server)?;
        srv.dhcp_leases.retain(|l| l.mac != mac || !pool.contains(l.ip));
        srv.dhcp_leases.push(lease.clone());

        self.assign_address(port, ip, pool.subnet_mask, pool.gateway)?;
        let iface = self.interface_mut(port)?;
        iface.dns_servers = pool.dns.clone();
        iface.dhcp_enabled = true;

        info!(server = server.0, %ip, %mac, "📨 DHCP 分配地址");
        Ok(lease)
    }

    /// 释放租约并清除接口地址
    pub fn release_dhcp(&mut self, port: PortId) -> Result<(), DhcpError> {
        let mac = self.interface(port)?.mac;
        let mut released = false;
        for dev in self.devices_mut() {
            let before = dev.dhcp_leases.len();
            dev.dhcp_leases.retain(|l| l.mac != mac);
            released |= before != dev.dhcp_leases.len();
        }
        if !released {
            return Err(DhcpError::NoLease(port));
        }
        self.clear_interface_address(port)?;
        info!(%mac, "DHCP 租约已释放");
        Ok(())
    }

    /// 删除到期租约，并清除仍在使用这些地址的 DHCP 客户端接口
    pub fn expire_dhcp_leases(&mut self, now: SimTime) -> usize {
        let mut expired = Vec::new();
        for dev in self.devices_mut() {
            dev.dhcp_leases.retain(|l| {
                if l.end <= now {
                    expired.push((l.mac, l.ip));
                    false
                } else {
                    true
                }
            });
        }
        if expired.is_empty() {
            return 0;
        }

        let mut stale = Vec::new();
        for dev in self.devices() {
            for (index, iface) in dev.interfaces.iter().enumerate() {
                if iface.dhcp_enabled
                    && expired
                        .iter()
                        .any(|(mac, ip)| *mac == iface.mac && Some(*ip) == iface.ip)
                {
                    stale.push(PortId::new(dev.id, index));
                }
            }
        }
        for port in stale {
            if let Err(e) = self.clear_interface_address(port) {
                warn!(%port, error = %e, "⚠️  清除过期租约的接口地址失败");
            }
        }
        debug!(count = expired.len(), "DHCP 租约到期");
        expired.len()
    }

    /// 在客户端所在广播域内广度优先查找 DHCP 服务器，返回 (服务器, 地址池下标)
    fn find_dhcp_server(&self, port: PortId) -> Option<(DeviceId, usize)> {
        let start = self.peer_of(port)?;
        let mut queue: VecDeque<(PortId, Option<u16>)> = VecDeque::from([(start, None)]);
        // 交换机按 (设备, VLAN) 去重：trunk 上的不同 VLAN 各自展开
        let mut seen: HashSet<(DeviceId, u16)> = HashSet::new();

        while let Some((at, tag)) = queue.pop_front() {
            if at.device == port.device {
                continue;
            }
            let Ok(dev) = self.device(at.device) else {
                continue;
            };
            let Some(iface) = dev.interface(at.index) else {
                continue;
            };

            if dev.kind.can_serve_dhcp() && !dev.dhcp_pools.is_empty() {
                let pool = dev
                    .dhcp_pools
                    .iter()
                    .position(|p| iface.ip.is_some_and(|ip| same_subnet(ip, p.pool_start, p.subnet_mask)))
                    .unwrap_or(0);
                return Some((dev.id, pool));
            }
            if !dev.kind.has_l2() {
                continue;
            }
            if dev.stp.as_ref().is_some_and(|s| !s.forwards(at.index)) {
                continue;
            }
            let mode = iface.switchport.clone().unwrap_or_default();
            let Some(vlan) = mode.ingress_vlan(tag) else {
                continue;
            };
            if !seen.insert((dev.id, vlan)) {
                continue;
            }

            for (index, other) in dev.interfaces.iter().enumerate() {
                if index == at.index {
                    continue;
                }
                let out = PortId::new(dev.id, index);
                let carries = other.switchport.as_ref().is_none_or(|m| m.carries(vlan));
                let forwards = dev.stp.as_ref().is_none_or(|s| s.forwards(index));
                if !carries || !forwards || !self.is_port_active(out) {
                    continue;
                }
                let tag = other.switchport.as_ref().and_then(|m| m.egress_tag(vlan));
                if let Some(peer) = self.peer_of(out) {
                    queue.push_back((peer, tag));
                }
            }
        }
        None
    }
}
