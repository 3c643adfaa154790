use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::net::{DeviceKind, Packet, Protocol};

/// 抓包事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptureKind {
    /// 拓扑元信息（总是第一条事件）
    Meta {
        devices: Vec<CaptureDevice>,
        links: Vec<CaptureLink>,
    },
    /// 意图注入（ping、TCP 等）
    Inject,
    /// 设备开始处理一个 at-device 包
    Rx { port: Option<usize> },
    /// 包被放上链路
    Tx { port: usize, to: usize },
    /// 交付给设备上层
    Deliver,
    /// ARP/BPDU 等控制报文被吸收
    Consumed,
    /// 等待 ARP 解析
    Buffer { next_hop: Ipv4Addr },
    /// ARP 解析完成后重新发送
    Release,
    Drop { reason: String },
    /// 链路随机丢包
    Lost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureDevice {
    pub id: usize,
    pub name: String,
    pub kind: DeviceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureLink {
    pub id: usize,
    /// (设备, 端口下标)
    pub a: (usize, usize),
    pub b: (usize, usize),
    pub bandwidth_mbps: u32,
    pub latency_ms: u32,
}

/// 一条抓包事件（JSON）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub tick: u64,
    /// 仿真时间（毫秒，和 `SimTime.0` 同口径）
    pub t_ms: u64,
    pub pkt_id: Option<u64>,
    pub device: Option<usize>,
    pub protocol: Option<Protocol>,
    pub summary: Option<String>,
    #[serde(flatten)]
    pub kind: CaptureKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CaptureLog {
    pub events: Vec<CaptureEvent>,
}

impl CaptureLog {
    pub fn push(&mut self, ev: CaptureEvent) {
        self.events.push(ev);
    }

    pub(crate) fn record(&mut self, tick: u64, t_ms: u64, pkt: &Packet, kind: CaptureKind) {
        self.push(CaptureEvent {
            tick,
            t_ms,
            pkt_id: Some(pkt.id),
            device: pkt.current_device.map(|d| d.0),
            protocol: Some(pkt.protocol()),
            summary: Some(pkt.summary()),
            kind,
        });
    }

    /// 某个包的全部事件
    pub fn for_packet(&self, pkt_id: u64) -> impl Iterator<Item = &CaptureEvent> {
        self.events.iter().filter(move |e| e.pkt_id == Some(pkt_id))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}
