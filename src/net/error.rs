//! 拓扑与配置错误

use thiserror::Error;

use super::device::DeviceKind;
use super::id::{ConnectionId, DeviceId, PortId};
use crate::addr::AddrError;
use crate::proto::tcp::TcpError;

/// 拓扑/配置操作失败。出错时网络状态保持不变
#[derive(Debug, Error)]
pub enum NetError {
    #[error("unknown device {0:?}")]
    UnknownDevice(DeviceId),
    #[error("unknown port {0}")]
    UnknownPort(PortId),
    #[error("no interface named {0}")]
    UnknownInterface(String),
    #[error("unknown connection {0:?}")]
    UnknownConnection(ConnectionId),
    #[error("port {0} is already connected")]
    PortInUse(PortId),
    #[error("cannot connect port {0} to itself")]
    SelfLoop(PortId),
    #[error(transparent)]
    Addr(#[from] AddrError),
    #[error("{0} is not a usable host address for its mask")]
    NotHostAddress(std::net::Ipv4Addr),
    #[error("gateway {0} is outside the interface subnet")]
    GatewayOutsideSubnet(std::net::Ipv4Addr),
    #[error("invalid VLAN id {0} (expected 1..=4094)")]
    InvalidVlan(u32),
    #[error("VLAN 1 cannot be deleted")]
    DefaultVlan,
    #[error("VLAN {0} does not exist")]
    UnknownVlan(u16),
    #[error("{kind} does not support {feature}")]
    Unsupported {
        kind: DeviceKind,
        feature: &'static str,
    },
    #[error("bridge priority {0} must be a multiple of 4096 in 0..=61440")]
    InvalidBridgePriority(u32),
    #[error("invalid STP path cost {0}")]
    InvalidPathCost(u32),
    #[error("next hop {0} is not on a connected subnet")]
    NextHopUnreachable(std::net::Ipv4Addr),
    #[error("invalid link parameters: {0}")]
    InvalidLink(&'static str),
    #[error("device {0:?} has no usable IP address")]
    NoAddress(DeviceId),
    #[error("cannot resolve host {0}")]
    UnknownHost(String),
    #[error(transparent)]
    Tcp(#[from] TcpError),
}
