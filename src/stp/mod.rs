//! 生成树协议（802.1D 风格）
//!
//! 桥标识与端口角色/状态、同步收敛、BPDU 生成。收敛结果直接写回各交换机的
//! [`StpBridge`]，包处理引擎据此过滤转发端口。

mod bpdu;
mod bridge;
mod converge;

pub use bpdu::{Bpdu, BpduType, STP_PROTOCOL_ID};
pub use bridge::{
    BRIDGE_PRIORITY_STEP, BridgeId, DEFAULT_BRIDGE_PRIORITY, DEFAULT_PORT_PRIORITY,
    MAX_BRIDGE_PRIORITY, PortRole, PortState, StpBridge, StpPort, path_cost_for_speed, port_id,
};
