//! 抓包记录（结构化 JSON 事件，用于离线回放/检查）
//!
//! 设计目标：
//! - **结构化**：用 JSON 事件而不是解析文本日志
//! - **轻量**：只存内存，结束时由调用方写文件
//! - **可过滤**：每条事件带 tick、设备、包编号和协议

mod types;

pub use types::{CaptureDevice, CaptureEvent, CaptureKind, CaptureLink, CaptureLog};

use tracing::info;

use crate::net::Network;

impl Network {
    /// 开始抓包；第一条事件是拓扑元信息
    pub fn enable_capture(&mut self) {
        let devices = self
            .devices()
            .map(|d| CaptureDevice {
                id: d.id.0,
                name: d.name.clone(),
                kind: d.kind,
            })
            .collect();
        let links = self
            .connections()
            .map(|c| CaptureLink {
                id: c.id.0,
                a: (c.a.device.0, c.a.index),
                b: (c.b.device.0, c.b.index),
                bandwidth_mbps: c.bandwidth_mbps,
                latency_ms: c.latency_ms,
            })
            .collect();
        let mut log = CaptureLog::default();
        log.push(CaptureEvent {
            tick: 0,
            t_ms: 0,
            pkt_id: None,
            device: None,
            protocol: None,
            summary: None,
            kind: CaptureKind::Meta { devices, links },
        });
        info!("🎥 开始抓包");
        self.capture = Some(log);
    }

    /// 结束抓包并取走记录
    pub fn take_capture(&mut self) -> Option<CaptureLog> {
        self.capture.take()
    }
}
