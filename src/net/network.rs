//! 网络拓扑管理
//!
//! 设备与连接都放在以下标为 id 的 arena 里（删除后留空槽，id 不复用），
//! 接口的对端关系通过 `PortId -> ConnectionId` 索引维护。
//! 所有配置操作先校验再修改：返回 `Err` 时状态保持不变。

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tracing::{debug, info, trace};

use super::device::{Device, DeviceKind, Svi, Vlan};
use super::error::NetError;
use super::id::{ConnectionId, DeviceId, PortId};
use super::interface::{DEFAULT_VLAN, Interface, SwitchportMode};
use super::link::{Connection, LinkParams};
use super::stats::Stats;
use crate::addr::{
    MacAddr, Route, RouteEgress, RouteKind, is_host_address, parse_ipv4, parse_mask, same_subnet,
};
use crate::capture::CaptureLog;

pub const MAX_VLAN_ID: u32 = 4094;

/// 网络拓扑
#[derive(Debug, Default)]
pub struct Network {
    devices: Vec<Option<Device>>,
    connections: Vec<Option<Connection>>,
    port_links: HashMap<PortId, ConnectionId>,
    next_mac: u64,
    pub stats: Stats,
    pub capture: Option<CaptureLog>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由已校验的快照内容重建
    pub(crate) fn from_parts(devices: Vec<Option<Device>>, connections: Vec<Option<Connection>>) -> Self {
        let mut port_links = HashMap::new();
        for c in connections.iter().flatten() {
            port_links.insert(c.a, c.id);
            port_links.insert(c.b, c.id);
        }
        let next_mac = devices
            .iter()
            .flatten()
            .flat_map(|d| {
                d.interfaces
                    .iter()
                    .map(|i| i.mac)
                    .chain(d.svis.iter().map(|s| s.mac))
            })
            .map(|m| u64::from_be_bytes([0, 0, 0, m.0[1], m.0[2], m.0[3], m.0[4], m.0[5]]))
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        let mut net = Self {
            devices,
            connections,
            port_links,
            next_mac,
            ..Self::default()
        };
        net.converge_stp();
        net
    }

    // ---- 设备 ----

    /// 添加设备，按种类生成默认接口
    #[tracing::instrument(skip(self, name), fields(kind = %kind))]
    pub fn add_device(&mut self, kind: DeviceKind, name: impl Into<String>) -> DeviceId {
        let name = name.into();
        let id = DeviceId(self.devices.len());
        let dev = Device::new(id, kind, name, &mut self.next_mac);
        debug!(device = id.0, ports = dev.interfaces.len(), "➕ 添加设备");
        let has_stp = dev.stp.is_some();
        self.devices.push(Some(dev));
        if has_stp {
            self.converge_stp();
        }
        id
    }

    pub fn add_host(&mut self, name: impl Into<String>) -> DeviceId {
        self.add_device(DeviceKind::Host, name)
    }

    pub fn add_switch(&mut self, name: impl Into<String>) -> DeviceId {
        self.add_device(DeviceKind::Switch, name)
    }

    pub fn add_router(&mut self, name: impl Into<String>) -> DeviceId {
        self.add_device(DeviceKind::Router, name)
    }

    /// 删除设备及其全部连接
    pub fn remove_device(&mut self, id: DeviceId) -> Result<Device, NetError> {
        self.device(id)?;
        let conns: Vec<ConnectionId> = self
            .connections()
            .filter(|c| c.a.device == id || c.b.device == id)
            .map(|c| c.id)
            .collect();
        for c in &conns {
            self.detach_connection(*c);
        }
        let dev = self.devices[id.0].take().ok_or(NetError::UnknownDevice(id))?;
        info!(device = id.0, name = %dev.name, links = conns.len(), "🗑️  删除设备");
        self.topology_changed();
        Ok(dev)
    }

    pub fn device(&self, id: DeviceId) -> Result<&Device, NetError> {
        self.devices
            .get(id.0)
            .and_then(|d| d.as_ref())
            .ok_or(NetError::UnknownDevice(id))
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Result<&mut Device, NetError> {
        self.devices
            .get_mut(id.0)
            .and_then(|d| d.as_mut())
            .ok_or(NetError::UnknownDevice(id))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().flatten()
    }

    pub(crate) fn devices_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut().flatten()
    }

    pub fn device_count(&self) -> usize {
        self.devices().count()
    }

    /// 按名字或主机名查找（不区分大小写）
    pub fn find_device(&self, name: &str) -> Option<DeviceId> {
        self.devices()
            .find(|d| d.name.eq_ignore_ascii_case(name) || d.hostname.eq_ignore_ascii_case(name))
            .map(|d| d.id)
    }

    /// 拥有该 IP 的设备
    pub fn device_with_ip(&self, ip: Ipv4Addr) -> Option<&Device> {
        self.devices().find(|d| d.owns_ip(ip))
    }

    pub fn set_hostname(&mut self, id: DeviceId, hostname: impl Into<String>) -> Result<(), NetError> {
        self.device_mut(id)?.hostname = hostname.into();
        Ok(())
    }

    pub fn interface(&self, port: PortId) -> Result<&Interface, NetError> {
        self.device(port.device)?
            .interfaces
            .get(port.index)
            .ok_or(NetError::UnknownPort(port))
    }

    pub(crate) fn interface_mut(&mut self, port: PortId) -> Result<&mut Interface, NetError> {
        self.device_mut(port.device)?
            .interfaces
            .get_mut(port.index)
            .ok_or(NetError::UnknownPort(port))
    }

    /// 按设备名 + 接口名定位端口
    pub fn port(&self, device: DeviceId, name: &str) -> Result<PortId, NetError> {
        let dev = self.device(device)?;
        dev.interface_index(name)
            .map(|i| PortId::new(device, i))
            .ok_or_else(|| NetError::UnknownInterface(name.to_string()))
    }

    pub(crate) fn alloc_mac(&mut self) -> MacAddr {
        let mac = MacAddr::local(self.next_mac);
        self.next_mac += 1;
        mac
    }

    // ---- 连接 ----

    /// 连接两个接口（无向）
    #[tracing::instrument(skip(self), fields(a = %a, b = %b))]
    pub fn add_connection(
        &mut self,
        a: PortId,
        b: PortId,
        params: LinkParams,
    ) -> Result<ConnectionId, NetError> {
        self.interface(a)?;
        self.interface(b)?;
        if a == b {
            return Err(NetError::SelfLoop(a));
        }
        for p in [a, b] {
            if self.port_links.contains_key(&p) {
                return Err(NetError::PortInUse(p));
            }
        }
        validate_link(&params)?;

        let id = ConnectionId(self.connections.len());
        self.connections.push(Some(Connection::new(id, a, b, params)));
        self.port_links.insert(a, id);
        self.port_links.insert(b, id);
        info!(
            conn = id.0,
            bandwidth_mbps = params.bandwidth_mbps,
            latency_ms = params.latency_ms,
            loss_pct = params.loss_pct,
            "🔗 建立连接"
        );
        self.topology_changed();
        Ok(id)
    }

    /// 按设备连接：各自取第一个空闲端口
    pub fn connect(
        &mut self,
        a: DeviceId,
        b: DeviceId,
        params: LinkParams,
    ) -> Result<ConnectionId, NetError> {
        let pa = self.free_port(a)?;
        let pb = if a == b {
            let dev = self.device(b)?;
            (pa.index + 1..dev.interfaces.len())
                .map(|i| PortId::new(b, i))
                .find(|p| !self.port_links.contains_key(p))
                .ok_or(NetError::PortInUse(pa))?
        } else {
            self.free_port(b)?
        };
        self.add_connection(pa, pb, params)
    }

    /// 第一个未连线的端口
    pub fn free_port(&self, id: DeviceId) -> Result<PortId, NetError> {
        let dev = self.device(id)?;
        (0..dev.interfaces.len())
            .map(|i| PortId::new(id, i))
            .find(|p| !self.port_links.contains_key(p))
            .ok_or(NetError::PortInUse(PortId::new(id, dev.interfaces.len())))
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<Connection, NetError> {
        let conn = self.detach_connection(id).ok_or(NetError::UnknownConnection(id))?;
        info!(conn = id.0, a = %conn.a, b = %conn.b, "✂️  删除连接");
        self.topology_changed();
        Ok(conn)
    }

    /// 同时清除两端的索引
    fn detach_connection(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.connections.get_mut(id.0)?.take()?;
        self.port_links.remove(&conn.a);
        self.port_links.remove(&conn.b);
        for port in [conn.a, conn.b] {
            if let Ok(dev) = self.device_mut(port.device) {
                dev.mac_table.flush_port(port.index);
                dev.arp.flush_interface(RouteEgress::Port(port.index));
            }
        }
        Some(conn)
    }

    pub fn set_connection_up(&mut self, id: ConnectionId, up: bool) -> Result<(), NetError> {
        let conn = self
            .connections
            .get_mut(id.0)
            .and_then(|c| c.as_mut())
            .ok_or(NetError::UnknownConnection(id))?;
        if conn.up == up {
            return Ok(());
        }
        conn.up = up;
        debug!(conn = id.0, up, "链路状态变化");
        self.topology_changed();
        Ok(())
    }

    pub fn set_link_params(&mut self, id: ConnectionId, params: LinkParams) -> Result<(), NetError> {
        validate_link(&params)?;
        let conn = self
            .connections
            .get_mut(id.0)
            .and_then(|c| c.as_mut())
            .ok_or(NetError::UnknownConnection(id))?;
        conn.bandwidth_mbps = params.bandwidth_mbps;
        conn.latency_ms = params.latency_ms;
        conn.loss_pct = params.loss_pct;
        Ok(())
    }

    pub fn connection(&self, id: ConnectionId) -> Result<&Connection, NetError> {
        self.connections
            .get(id.0)
            .and_then(|c| c.as_ref())
            .ok_or(NetError::UnknownConnection(id))
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().flatten()
    }

    /// 接口所在的连接
    pub fn connection_of(&self, port: PortId) -> Option<&Connection> {
        let id = self.port_links.get(&port)?;
        self.connection(*id).ok()
    }

    /// 对端接口（`connectedTo`）
    pub fn peer_of(&self, port: PortId) -> Option<PortId> {
        self.connection_of(port)?.peer_of(port)
    }

    /// 端口能否收发：本端与对端接口都 up，链路存在且 up
    pub fn is_port_active(&self, port: PortId) -> bool {
        let Some(conn) = self.connection_of(port) else {
            return false;
        };
        let Some(peer) = conn.peer_of(port) else {
            return false;
        };
        conn.up
            && self.interface(port).map(|i| i.up).unwrap_or(false)
            && self.interface(peer).map(|i| i.up).unwrap_or(false)
    }

    pub fn set_interface_up(&mut self, port: PortId, up: bool) -> Result<(), NetError> {
        let iface = self.interface_mut(port)?;
        if iface.up == up {
            return Ok(());
        }
        iface.up = up;
        debug!(port = %port, up, "接口状态变化");
        if self.port_links.contains_key(&port) {
            self.topology_changed();
        }
        Ok(())
    }

    // ---- 三层配置 ----

    /// 配置接口 IP/掩码/网关；路由设备同时生成直连路由
    #[tracing::instrument(skip(self), fields(port = %port))]
    pub fn configure_interface(
        &mut self,
        port: PortId,
        ip: &str,
        mask: &str,
        gateway: Option<&str>,
    ) -> Result<(), NetError> {
        let dev = self.device(port.device)?;
        if !dev.kind.has_l3() {
            return Err(NetError::Unsupported {
                kind: dev.kind,
                feature: "interface addressing",
            });
        }
        self.interface(port)?;
        let ip = parse_ipv4(ip)?;
        let mask = parse_mask(mask)?;
        if !is_host_address(ip, mask) {
            return Err(NetError::NotHostAddress(ip));
        }
        let gateway = gateway.map(parse_ipv4).transpose()?;
        if let Some(gw) = gateway {
            if !same_subnet(ip, gw, mask) || gw == ip {
                return Err(NetError::GatewayOutsideSubnet(gw));
            }
        }

        self.assign_address(port, ip, mask, gateway)?;
        info!(%ip, %mask, gateway = ?gateway, "🛠️  配置接口地址");
        Ok(())
    }

    /// 写入已校验的地址（DHCP 也走这里）
    pub(crate) fn assign_address(
        &mut self,
        port: PortId,
        ip: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Option<Ipv4Addr>,
    ) -> Result<(), NetError> {
        let dev = self.device_mut(port.device)?;
        let routes = dev.kind.routes_packets();
        let iface = dev
            .interfaces
            .get_mut(port.index)
            .ok_or(NetError::UnknownPort(port))?;
        iface.ip = Some(ip);
        iface.mask = Some(mask);
        iface.gateway = gateway;
        iface.dhcp_enabled = false;
        if routes {
            let egress = RouteEgress::Port(port.index);
            dev.routes.remove_connected(egress);
            dev.routes.insert(Route {
                destination: ip,
                mask,
                next_hop: None,
                egress,
                metric: 0,
                kind: RouteKind::Connected,
            });
        }
        Ok(())
    }

    pub fn clear_interface_address(&mut self, port: PortId) -> Result<(), NetError> {
        let dev = self.device_mut(port.device)?;
        let iface = dev
            .interfaces
            .get_mut(port.index)
            .ok_or(NetError::UnknownPort(port))?;
        iface.clear_address();
        dev.routes.remove_connected(RouteEgress::Port(port.index));
        Ok(())
    }

    pub fn set_dns_servers(&mut self, port: PortId, servers: &[&str]) -> Result<(), NetError> {
        let parsed = servers
            .iter()
            .map(|s| parse_ipv4(s))
            .collect::<Result<Vec<_>, _>>()?;
        self.interface_mut(port)?.dns_servers = parsed;
        Ok(())
    }

    /// 添加静态路由：下一跳必须落在某个直连网段内
    pub fn add_static_route(
        &mut self,
        id: DeviceId,
        destination: &str,
        mask: &str,
        next_hop: &str,
        metric: u32,
    ) -> Result<(), NetError> {
        let destination = parse_ipv4(destination)?;
        let mask = parse_mask(mask)?;
        let next_hop = parse_ipv4(next_hop)?;
        let dev = self.device_mut(id)?;
        if !dev.kind.routes_packets() {
            return Err(NetError::Unsupported {
                kind: dev.kind,
                feature: "static routes",
            });
        }
        let egress = dev
            .interfaces
            .iter()
            .position(|i| i.in_subnet(next_hop))
            .map(RouteEgress::Port)
            .or_else(|| {
                dev.svis
                    .iter()
                    .find(|s| same_subnet(s.ip, next_hop, s.mask))
                    .map(|s| RouteEgress::Svi(s.vlan))
            })
            .ok_or(NetError::NextHopUnreachable(next_hop))?;
        dev.routes.insert(Route {
            destination,
            mask,
            next_hop: Some(next_hop),
            egress,
            metric,
            kind: RouteKind::Static,
        });
        debug!(device = id.0, %destination, %mask, %next_hop, "添加静态路由");
        Ok(())
    }

    pub fn remove_static_route(
        &mut self,
        id: DeviceId,
        destination: &str,
        mask: &str,
    ) -> Result<bool, NetError> {
        let destination = parse_ipv4(destination)?;
        let mask = parse_mask(mask)?;
        Ok(self.device_mut(id)?.routes.remove_static(destination, mask))
    }

    // ---- VLAN / SVI ----

    pub fn create_vlan(&mut self, id: DeviceId, vlan: u32, name: &str) -> Result<(), NetError> {
        let vlan = check_vlan(vlan)?;
        let dev = self.l2_device_mut(id)?;
        let name = if name.is_empty() {
            format!("VLAN{vlan:04}")
        } else {
            name.to_string()
        };
        dev.vlans.insert(vlan, Vlan { id: vlan, name });
        Ok(())
    }

    /// 删除 VLAN；其 access 端口回落到 VLAN 1，对应 SVI 一并删除
    pub fn delete_vlan(&mut self, id: DeviceId, vlan: u32) -> Result<(), NetError> {
        let vlan = check_vlan(vlan)?;
        if vlan == DEFAULT_VLAN {
            return Err(NetError::DefaultVlan);
        }
        let dev = self.l2_device_mut(id)?;
        if dev.vlans.remove(&vlan).is_none() {
            return Err(NetError::UnknownVlan(vlan));
        }
        for iface in &mut dev.interfaces {
            if iface.switchport == Some(SwitchportMode::Access { vlan }) {
                iface.switchport = Some(SwitchportMode::default());
            }
        }
        dev.svis.retain(|s| s.vlan != vlan);
        dev.routes.remove_connected(RouteEgress::Svi(vlan));
        dev.mac_table.flush_vlan(vlan);
        Ok(())
    }

    pub fn set_access_vlan(&mut self, port: PortId, vlan: u32) -> Result<(), NetError> {
        let vlan = check_vlan(vlan)?;
        let dev = self.l2_device_mut(port.device)?;
        if !dev.vlans.contains_key(&vlan) {
            return Err(NetError::UnknownVlan(vlan));
        }
        let iface = dev
            .interfaces
            .get_mut(port.index)
            .ok_or(NetError::UnknownPort(port))?;
        iface.switchport = Some(SwitchportMode::Access { vlan });
        dev.mac_table.flush_port(port.index);
        Ok(())
    }

    /// 设为 trunk；`allowed = None` 表示允许全部 VLAN
    pub fn set_trunk(
        &mut self,
        port: PortId,
        native_vlan: u32,
        allowed: Option<Vec<u32>>,
    ) -> Result<(), NetError> {
        let native_vlan = check_vlan(native_vlan)?;
        let allowed = allowed
            .map(|list| list.into_iter().map(check_vlan).collect::<Result<Vec<_>, _>>())
            .transpose()?;
        let dev = self.l2_device_mut(port.device)?;
        let iface = dev
            .interfaces
            .get_mut(port.index)
            .ok_or(NetError::UnknownPort(port))?;
        iface.switchport = Some(SwitchportMode::Trunk {
            native_vlan,
            allowed,
        });
        dev.mac_table.flush_port(port.index);
        Ok(())
    }

    /// 在三层交换机上为 VLAN 创建（或重新配置）SVI
    pub fn create_svi(&mut self, id: DeviceId, vlan: u32, ip: &str, mask: &str) -> Result<(), NetError> {
        let vlan = check_vlan(vlan)?;
        let ip = parse_ipv4(ip)?;
        let mask = parse_mask(mask)?;
        if !is_host_address(ip, mask) {
            return Err(NetError::NotHostAddress(ip));
        }
        let dev = self.device(id)?;
        if dev.kind != DeviceKind::L3Switch {
            return Err(NetError::Unsupported {
                kind: dev.kind,
                feature: "svi",
            });
        }
        if !dev.vlans.contains_key(&vlan) {
            return Err(NetError::UnknownVlan(vlan));
        }
        let existing = dev.svi(vlan).map(|s| s.mac);
        let mac = match existing {
            Some(mac) => mac,
            None => self.alloc_mac(),
        };
        let dev = self.device_mut(id)?;
        dev.svis.retain(|s| s.vlan != vlan);
        dev.svis.push(Svi {
            vlan,
            ip,
            mask,
            mac,
            up: true,
        });
        let egress = RouteEgress::Svi(vlan);
        dev.routes.remove_connected(egress);
        dev.routes.insert(Route {
            destination: ip,
            mask,
            next_hop: None,
            egress,
            metric: 0,
            kind: RouteKind::Connected,
        });
        info!(device = id.0, vlan, %ip, "🛠️  配置 SVI");
        Ok(())
    }

    fn l2_device_mut(&mut self, id: DeviceId) -> Result<&mut Device, NetError> {
        let dev = self.device_mut(id)?;
        if !dev.kind.has_l2() {
            return Err(NetError::Unsupported {
                kind: dev.kind,
                feature: "vlans",
            });
        }
        Ok(dev)
    }

    // ---- ARP / MAC 表 ----

    pub fn add_static_arp(
        &mut self,
        id: DeviceId,
        ip: &str,
        mac: &str,
        interface: RouteEgress,
    ) -> Result<(), NetError> {
        let ip = parse_ipv4(ip)?;
        let mac: MacAddr = mac.parse()?;
        self.device_mut(id)?.arp.add_static(ip, mac, interface);
        Ok(())
    }

    pub fn clear_arp(&mut self, id: DeviceId) -> Result<(), NetError> {
        self.device_mut(id)?.arp.clear();
        Ok(())
    }

    pub fn clear_mac_table(&mut self, id: DeviceId) -> Result<(), NetError> {
        self.device_mut(id)?.mac_table.clear();
        Ok(())
    }

    /// 每 tick 调用：ARP / MAC 表项年龄加一（不淘汰）
    pub(crate) fn age_tables(&mut self) {
        for dev in self.devices_mut() {
            dev.arp.tick_age();
            dev.mac_table.tick_age();
        }
        trace!("表项老化计数 +1");
    }
}

fn validate_link(params: &LinkParams) -> Result<(), NetError> {
    if params.bandwidth_mbps == 0 {
        return Err(NetError::InvalidLink("bandwidth must be positive"));
    }
    if !(0.0..=100.0).contains(&params.loss_pct) {
        return Err(NetError::InvalidLink("loss must be within 0..=100"));
    }
    Ok(())
}

fn check_vlan(vlan: u32) -> Result<u16, NetError> {
    if (1..=MAX_VLAN_ID).contains(&vlan) {
        Ok(vlan as u16)
    } else {
        Err(NetError::InvalidVlan(vlan))
    }
}
