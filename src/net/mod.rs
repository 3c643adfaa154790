//! 网络模型模块
//!
//! 此模块包含拓扑的核心组件：设备、接口、连接、数据包，以及对拓扑的全部配置操作。

// 子模块声明
mod id;
mod interface;
mod link;
mod packet;
mod transport;
mod device;
mod error;
mod network;
mod stats;
mod snapshot;

// 重新导出公共接口
pub use id::{ConnectionId, DeviceId, PortId};
pub use interface::{DEFAULT_VLAN, Duplex, Interface, SwitchportMode};
pub use link::{Connection, LinkParams};
pub use packet::{CONTROL_FRAME_BYTES, DEFAULT_TTL, Packet, Stage};
pub use transport::{
    ArpMessage, ArpOp, ICMP_DEST_UNREACHABLE, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST,
    ICMP_TIME_EXCEEDED, IcmpMessage, Payload, Protocol, TcpFlags, TcpSegment,
};
pub use device::{Device, DeviceKind, MacEntry, MacEntryKind, MacTable, Svi, Vlan};
pub use error::NetError;
pub use network::{MAX_VLAN_ID, Network};
pub use stats::Stats;
pub use snapshot::{MAX_SNAPSHOT_ID, Snapshot, SnapshotError};
