//! 标识符类型
//!
//! 定义设备、接口（端口）与连接的唯一标识符。接口没有独立的全局编号，
//! 由 (设备, 端口下标) 唯一确定。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 设备标识符（即设备在网络 arena 中的下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub usize);

/// 连接（链路）标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub usize);

/// 接口标识符：设备 + 端口下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId {
    pub device: DeviceId,
    pub index: usize,
}

impl PortId {
    pub fn new(device: DeviceId, index: usize) -> Self {
        Self { device, index }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}#{}", self.device.0, self.index)
    }
}
