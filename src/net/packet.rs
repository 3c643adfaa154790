//! 数据包类型
//!
//! 数据包是仿真的基本单位。生命周期：
//! `at-device → on-link → at-device* → arrived | dropped | buffered`。
//! on-link 期间由调度器持有；at-device 期间只交给一个设备处理。

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::id::{ConnectionId, DeviceId, PortId};
use super::transport::{ArpMessage, ArpOp, IcmpMessage, Payload, Protocol, TcpSegment};
use crate::addr::MacAddr;

/// 数据包所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    AtDevice,
    OnLink,
    Arrived,
    Dropped,
    Buffered,
}

pub const DEFAULT_TTL: u8 = 64;
/// 控制帧（ARP/ICMP/BPDU 等）的统一大小（最小以太网帧）
pub const CONTROL_FRAME_BYTES: u32 = 64;

/// 网络数据包
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// 0 表示尚未分配，由调度器在接收时编号
    pub id: u64,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Option<Ipv4Addr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub ttl: u8,
    pub size_bytes: u32,
    /// 802.1Q tag（仅在 trunk 链路上出现）
    pub vlan_tag: Option<u16>,
    pub payload: Payload,

    pub stage: Stage,
    /// 当前链路上的进度（0..=100）
    pub progress: f64,
    pub current_device: Option<DeviceId>,
    pub last_device: Option<DeviceId>,
    pub target_device: Option<DeviceId>,
    /// 到达当前设备所经的端口；`None` 表示本设备自己产生的包
    pub ingress: Option<PortId>,
    /// 发出端口（on-link 或等待 ARP 时有效）
    pub egress: Option<PortId>,
    /// 经 SVI 发出且等待 ARP 时记录的出 VLAN
    pub egress_svi: Option<u16>,
    pub connection: Option<ConnectionId>,
    /// 诊断用：依次经过的设备
    pub path: Vec<DeviceId>,
    pub locally_generated: bool,
    pub waiting_for_arp: Option<Ipv4Addr>,
    /// 是否已经做过本段链路的丢包判定
    pub loss_checked: bool,
}

impl Packet {
    /// 创建一个挂在 `at` 上、由其自身产生的包
    pub fn originate(at: DeviceId, payload: Payload) -> Self {
        Self {
            id: 0,
            src_mac: MacAddr::ZERO,
            dst_mac: MacAddr::ZERO,
            src_ip: None,
            dst_ip: None,
            src_port: None,
            dst_port: None,
            ttl: DEFAULT_TTL,
            size_bytes: CONTROL_FRAME_BYTES,
            vlan_tag: None,
            payload,
            stage: Stage::AtDevice,
            progress: 0.0,
            current_device: Some(at),
            last_device: None,
            target_device: None,
            ingress: None,
            egress: None,
            egress_svi: None,
            connection: None,
            path: vec![at],
            locally_generated: true,
            waiting_for_arp: None,
            loss_checked: false,
        }
    }

    /// 三层包（MAC 留待出接口决定）
    pub fn ip(at: DeviceId, src_ip: Ipv4Addr, dst_ip: Ipv4Addr, payload: Payload) -> Self {
        let mut pkt = Self::originate(at, payload);
        pkt.src_ip = Some(src_ip);
        pkt.dst_ip = Some(dst_ip);
        pkt
    }

    pub fn icmp(at: DeviceId, src_ip: Ipv4Addr, dst_ip: Ipv4Addr, msg: IcmpMessage) -> Self {
        Self::ip(at, src_ip, dst_ip, Payload::Icmp(msg))
    }

    pub fn tcp(
        at: DeviceId,
        (src_ip, src_port): (Ipv4Addr, u16),
        (dst_ip, dst_port): (Ipv4Addr, u16),
        seg: TcpSegment,
    ) -> Self {
        let mut pkt = Self::ip(at, src_ip, dst_ip, Payload::Tcp(seg));
        pkt.src_port = Some(src_port);
        pkt.dst_port = Some(dst_port);
        pkt.size_bytes = CONTROL_FRAME_BYTES.max(54 + seg.len);
        pkt
    }

    /// 广播 ARP 请求
    pub fn arp_request(
        at: DeviceId,
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_ip: Ipv4Addr,
    ) -> Self {
        let mut pkt = Self::originate(
            at,
            Payload::Arp(ArpMessage {
                op: ArpOp::Request,
                sender_mac,
                sender_ip,
                target_mac: MacAddr::ZERO,
                target_ip,
            }),
        );
        pkt.src_mac = sender_mac;
        pkt.dst_mac = MacAddr::BROADCAST;
        pkt
    }

    pub fn protocol(&self) -> Protocol {
        self.payload.protocol()
    }

    pub fn icmp_type(&self) -> Option<u8> {
        match &self.payload {
            Payload::Icmp(m) => Some(m.icmp_type),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, Stage::Arrived | Stage::Dropped)
    }

    /// 泛洪用的副本：内容相同，编号留给调度器重新分配
    pub fn duplicate(&self) -> Self {
        Self {
            id: 0,
            ..self.clone()
        }
    }

    /// 一行类 tcpdump 的摘要
    pub fn summary(&self) -> String {
        let l3 = match (self.src_ip, self.dst_ip) {
            (Some(s), Some(d)) => match (self.src_port, self.dst_port) {
                (Some(sp), Some(dp)) => format!("{s}.{sp} > {d}.{dp}"),
                _ => format!("{s} > {d}"),
            },
            _ => format!("{} > {}", self.src_mac, self.dst_mac),
        };
        let detail = match &self.payload {
            Payload::Raw => "raw".to_string(),
            Payload::Icmp(m) => format!(
                "ICMP type {} code {} id {} seq {}",
                m.icmp_type, m.code, m.ident, m.seq
            ),
            Payload::Tcp(s) => format!("TCP [{}] seq {} ack {} len {}", s.flags, s.seq, s.ack, s.len),
            Payload::Udp { len } => format!("UDP len {len}"),
            Payload::Arp(a) => match a.op {
                ArpOp::Request => format!("ARP who-has {} tell {}", a.target_ip, a.sender_ip),
                ArpOp::Reply => format!("ARP {} is-at {}", a.sender_ip, a.sender_mac),
            },
            Payload::Stp(b) => format!(
                "STP root {} cost {} sender {}",
                b.root_bridge_id, b.root_path_cost, b.sender_bridge_id
            ),
        };
        match self.vlan_tag {
            Some(v) => format!("vlan {v} {l3}: {detail}"),
            None => format!("{l3}: {detail}"),
        }
    }
}
