//! 数据包携带的协议负载

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::addr::MacAddr;
use crate::stp::Bpdu;

/// 包负载
///
/// `Packet` 只是帧/数据报的载体，设备按负载类型选择协议处理逻辑。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "proto", rename_all = "snake_case")]
pub enum Payload {
    /// 无协议语义的原始帧
    #[default]
    Raw,
    Icmp(IcmpMessage),
    Tcp(TcpSegment),
    Udp { len: u32 },
    Arp(ArpMessage),
    Stp(Bpdu),
}

/// 日志与抓包使用的粗粒度协议标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Raw,
    Icmp,
    Tcp,
    Udp,
    Arp,
    Stp,
}

impl Payload {
    pub fn protocol(&self) -> Protocol {
        match self {
            Payload::Raw => Protocol::Raw,
            Payload::Icmp(_) => Protocol::Icmp,
            Payload::Tcp(_) => Protocol::Tcp,
            Payload::Udp { .. } => Protocol::Udp,
            Payload::Arp(_) => Protocol::Arp,
            Payload::Stp(_) => Protocol::Stp,
        }
    }
}

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

/// ICMP 报文；差错报文同样保留 echo 的 ident/seq，便于发起方对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpMessage {
    pub icmp_type: u8,
    pub code: u8,
    pub ident: u16,
    pub seq: u16,
}

impl IcmpMessage {
    pub fn echo_request(ident: u16, seq: u16) -> Self {
        Self {
            icmp_type: ICMP_ECHO_REQUEST,
            code: 0,
            ident,
            seq,
        }
    }

    pub fn echo_reply(ident: u16, seq: u16) -> Self {
        Self {
            icmp_type: ICMP_ECHO_REPLY,
            code: 0,
            ident,
            seq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArpOp {
    Request,
    Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpMessage {
    pub op: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

/// TCP 控制位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
}

impl TcpFlags {
    pub const SYN: TcpFlags = TcpFlags {
        syn: true,
        ack: false,
        fin: false,
        rst: false,
        psh: false,
    };
    pub const SYN_ACK: TcpFlags = TcpFlags {
        syn: true,
        ack: true,
        ..TcpFlags::NONE
    };
    pub const ACK: TcpFlags = TcpFlags {
        ack: true,
        ..TcpFlags::NONE
    };
    pub const FIN_ACK: TcpFlags = TcpFlags {
        fin: true,
        ack: true,
        ..TcpFlags::NONE
    };
    pub const RST: TcpFlags = TcpFlags {
        rst: true,
        ..TcpFlags::NONE
    };
    pub const RST_ACK: TcpFlags = TcpFlags {
        rst: true,
        ack: true,
        ..TcpFlags::NONE
    };
    pub const NONE: TcpFlags = TcpFlags {
        syn: false,
        ack: false,
        fin: false,
        rst: false,
        psh: false,
    };
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (on, name) in [
            (self.syn, "SYN"),
            (self.fin, "FIN"),
            (self.rst, "RST"),
            (self.psh, "PSH"),
            (self.ack, "ACK"),
        ] {
            if on {
                names.push(name);
            }
        }
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

/// TCP 报文段；`len` 为负载字节数（不含 SYN/FIN）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSegment {
    pub flags: TcpFlags,
    pub seq: u32,
    pub ack: u32,
    #[serde(default)]
    pub len: u32,
}

impl TcpSegment {
    pub fn new(flags: TcpFlags, seq: u32, ack: u32) -> Self {
        Self {
            flags,
            seq,
            ack,
            len: 0,
        }
    }

    /// 本报文段占用的序号空间（SYN、FIN 各算 1）
    pub fn seq_len(&self) -> u32 {
        self.len + self.flags.syn as u32 + self.flags.fin as u32
    }
}
