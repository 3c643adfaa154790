//! 链路类型
//!
//! 定义无向连接及其传输时延计算。

use serde::{Deserialize, Serialize};

use super::id::{ConnectionId, PortId};

/// 建立连接时使用的链路参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    pub bandwidth_mbps: u32,
    pub latency_ms: u32,
    /// 丢包率（百分比，0..=100）
    pub loss_pct: f64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            bandwidth_mbps: 100,
            latency_ms: 5,
            loss_pct: 0.0,
        }
    }
}

/// 两个接口之间的无向连接
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub a: PortId,
    pub b: PortId,
    pub bandwidth_mbps: u32,
    pub latency_ms: u32,
    pub loss_pct: f64,
    pub up: bool,
}

impl Connection {
    pub fn new(id: ConnectionId, a: PortId, b: PortId, params: LinkParams) -> Self {
        Self {
            id,
            a,
            b,
            bandwidth_mbps: params.bandwidth_mbps,
            latency_ms: params.latency_ms,
            loss_pct: params.loss_pct,
            up: true,
        }
    }

    /// 获取另一端接口；`port` 不是本连接端点时返回 `None`
    pub fn peer_of(&self, port: PortId) -> Option<PortId> {
        if port == self.a {
            Some(self.b)
        } else if port == self.b {
            Some(self.a)
        } else {
            None
        }
    }

    pub fn touches(&self, port: PortId) -> bool {
        self.a == port || self.b == port
    }

    /// 串行化指定字节数所需的时间（毫秒）
    pub(crate) fn serialization_ms(&self, bytes: u32) -> f64 {
        if self.bandwidth_mbps == 0 {
            return f64::INFINITY;
        }
        // 1 Mbps = 1000 bit/ms
        (bytes as f64 * 8.0) / (self.bandwidth_mbps as f64 * 1000.0)
    }

    /// 单个包穿过该链路的总耗时（传播 + 串行化，毫秒）
    pub(crate) fn transit_ms(&self, bytes: u32) -> f64 {
        self.latency_ms as f64 + self.serialization_ms(bytes)
    }
}
