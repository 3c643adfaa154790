//! 处理结果与设备更新

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::addr::{MacAddr, RouteEgress};
use crate::net::{Device, Packet};
use crate::proto::tcp::TcpChange;
use crate::stp::Bpdu;

/// 丢弃原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoRoute,
    TtlExceeded,
    NotForUs,
    StpBlocked,
    /// 已知单播的出端口就是入端口
    SameSegment,
    LinkDown,
    VlanMismatch,
    NoEgress,
    NoAddress,
    Malformed,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::NoRoute => "no_route",
            DropReason::TtlExceeded => "ttl_exceeded",
            DropReason::NotForUs => "not_for_us",
            DropReason::StpBlocked => "stp_blocked",
            DropReason::SameSegment => "same_segment",
            DropReason::LinkDown => "link_down",
            DropReason::VlanMismatch => "vlan_mismatch",
            DropReason::NoEgress => "no_egress",
            DropReason::NoAddress => "no_address",
            DropReason::Malformed => "malformed",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 原包的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// 原包（或其泛洪副本）已经放上下一段链路
    Forwarded,
    /// 交付给本设备的上层
    Delivered,
    /// 控制报文（ARP/BPDU）被本设备吸收
    Consumed,
    /// 等待 ARP 解析
    Buffered,
    Dropped(DropReason),
}

/// 处理过程中请求的设备状态修改
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceUpdate {
    LearnMac {
        mac: MacAddr,
        port: usize,
        vlan: u16,
    },
    LearnArp {
        ip: Ipv4Addr,
        mac: MacAddr,
        interface: RouteEgress,
    },
    Tcp(TcpChange),
    BpduReceived {
        port: usize,
        bpdu: Bpdu,
    },
}

/// `process` 的返回值
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// 新产生的包（on-link 或 buffered）
    pub packets: Vec<Packet>,
    pub updates: Vec<DeviceUpdate>,
    pub verdict: Verdict,
}

impl Outcome {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            packets: Vec::new(),
            updates: Vec::new(),
            verdict,
        }
    }

    pub fn drop(reason: DropReason) -> Self {
        Self::new(Verdict::Dropped(reason))
    }

    pub(crate) fn with_updates(mut self, mut updates: Vec<DeviceUpdate>) -> Self {
        updates.append(&mut self.updates);
        self.updates = updates;
        self
    }

    pub(crate) fn merge(&mut self, other: Outcome) {
        self.packets.extend(other.packets);
        self.updates.extend(other.updates);
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self.verdict, Verdict::Dropped(_))
    }
}

impl Device {
    /// 提交一个设备更新；返回 ARP 表是否因此新学到/改变了表项
    pub fn apply(&mut self, update: DeviceUpdate) -> bool {
        trace!(device = self.id.0, ?update, "应用设备更新");
        match update {
            DeviceUpdate::LearnMac { mac, port, vlan } => {
                self.mac_table.learn(mac, port, vlan);
                false
            }
            DeviceUpdate::LearnArp { ip, mac, interface } => {
                self.arp.learn(ip, mac, interface);
                true
            }
            DeviceUpdate::Tcp(change) => {
                self.tcp.apply(change);
                false
            }
            DeviceUpdate::BpduReceived { port, bpdu } => {
                if let Some(stp) = self.stp.as_mut() {
                    stp.record_bpdu(port, bpdu);
                }
                false
            }
        }
    }
}
