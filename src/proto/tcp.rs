//! TCP 连接状态机
//!
//! 每台设备一张连接表（[`TcpTable`]），覆盖标准 11 状态生命周期：
//! - 主动打开（`connect`）：分配临时端口，进入 SYN_SENT 并发出 SYN
//! - 被动打开（`listen`）：LISTEN；收到 SYN 时派生出一个 SYN_RECV 连接，监听者保留
//! - 四次挥手、同时关闭（CLOSING）、RST 立即删除连接
//!
//! 入站报文的处理是纯函数：[`TcpTable::on_segment`] 只计算变化（[`TcpChange`]）
//! 和需要回复的报文，由调用方决定何时 [`TcpTable::apply`]。
//! 应用层调用（listen/connect/close）直接修改表。
//!
//! 注意：不实现数据重传、窗口、2MSL 定时器；TIME_WAIT 连接一直保留到显式清理。

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::net::{TcpFlags, TcpSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TcpState::Closed => "CLOSED",
            TcpState::Listen => "LISTEN",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRecv => "SYN_RECV",
            TcpState::Established => "ESTABLISHED",
            TcpState::FinWait1 => "FIN_WAIT_1",
            TcpState::FinWait2 => "FIN_WAIT_2",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::Closing => "CLOSING",
            TcpState::LastAck => "LAST_ACK",
            TcpState::TimeWait => "TIME_WAIT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TcpError {
    #[error("port {0} is already listening")]
    PortInUse(u16),
    #[error("no free ephemeral port")]
    NoEphemeralPort,
    #[error("no connection on local port {0}")]
    NoConnection(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// 临时端口范围（含两端）
    pub ephemeral_start: u16,
    pub ephemeral_end: u16,
    /// 相邻两个连接 ISS 的间隔
    pub iss_step: u32,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            ephemeral_start: 49152,
            ephemeral_end: 65535,
            iss_step: 64_000,
        }
    }
}

/// 一个 TCP 连接（或监听者，此时远端为 0.0.0.0:0）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConnection {
    pub local_ip: Ipv4Addr,
    pub local_port: u16,
    pub remote_ip: Ipv4Addr,
    pub remote_port: u16,
    pub state: TcpState,
    /// 初始发送序号
    pub iss: u32,
    pub snd_nxt: u32,
    pub rcv_nxt: u32,
}

impl TcpConnection {
    fn same_socket(&self, other: &TcpConnection) -> bool {
        self.local_port == other.local_port
            && self.remote_ip == other.remote_ip
            && self.remote_port == other.remote_port
    }

    fn segment(&self, flags: TcpFlags) -> TcpSegment {
        TcpSegment::new(flags, self.snd_nxt, if flags.ack { self.rcv_nxt } else { 0 })
    }
}

/// 入站报文对连接表的影响
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpChange {
    /// 新建或覆盖同一四元组的连接
    Upsert(TcpConnection),
    Remove {
        local_port: u16,
        remote_ip: Ipv4Addr,
        remote_port: u16,
    },
}

/// [`TcpTable::on_segment`] 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentOutcome {
    pub change: Option<TcpChange>,
    /// 需要回给对端的报文（源/目的端口与收到的报文相反）
    pub reply: Option<TcpSegment>,
}

impl SegmentOutcome {
    fn reply(seg: TcpSegment) -> Self {
        Self {
            change: None,
            reply: Some(seg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpTable {
    conns: Vec<TcpConnection>,
    #[serde(default)]
    pub cfg: TcpConfig,
    next_iss: u32,
    next_ephemeral: u16,
}

impl Default for TcpTable {
    fn default() -> Self {
        Self::with_config(TcpConfig::default())
    }
}

impl TcpTable {
    pub fn with_config(cfg: TcpConfig) -> Self {
        Self {
            conns: Vec::new(),
            next_iss: 1000,
            next_ephemeral: cfg.ephemeral_start,
            cfg,
        }
    }

    pub fn connections(&self) -> &[TcpConnection] {
        &self.conns
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// 按四元组查找（不含监听者）
    pub fn find(&self, local_port: u16, remote_ip: Ipv4Addr, remote_port: u16) -> Option<&TcpConnection> {
        self.conns.iter().find(|c| {
            c.state != TcpState::Listen
                && c.local_port == local_port
                && c.remote_ip == remote_ip
                && c.remote_port == remote_port
        })
    }

    pub fn listener(&self, port: u16) -> Option<&TcpConnection> {
        self.conns
            .iter()
            .find(|c| c.state == TcpState::Listen && c.local_port == port)
    }

    /// 被动打开；端口已在监听时失败且不产生副作用
    pub fn listen(&mut self, port: u16) -> Result<(), TcpError> {
        if self.listener(port).is_some() {
            return Err(TcpError::PortInUse(port));
        }
        self.conns.push(TcpConnection {
            local_ip: Ipv4Addr::UNSPECIFIED,
            local_port: port,
            remote_ip: Ipv4Addr::UNSPECIFIED,
            remote_port: 0,
            state: TcpState::Listen,
            iss: 0,
            snd_nxt: 0,
            rcv_nxt: 0,
        });
        debug!(port, "👂 TCP LISTEN");
        Ok(())
    }

    /// 主动打开：返回 (本地临时端口, SYN 报文)
    pub fn connect(
        &mut self,
        local_ip: Ipv4Addr,
        remote_ip: Ipv4Addr,
        remote_port: u16,
    ) -> Result<(u16, TcpSegment), TcpError> {
        let local_port = self.alloc_ephemeral()?;
        let iss = self.take_iss();
        let conn = TcpConnection {
            local_ip,
            local_port,
            remote_ip,
            remote_port,
            state: TcpState::SynSent,
            iss,
            snd_nxt: iss.wrapping_add(1),
            rcv_nxt: 0,
        };
        let syn = TcpSegment::new(TcpFlags::SYN, iss, 0);
        debug!(local_port, %remote_ip, remote_port, "📞 TCP SYN_SENT");
        self.conns.push(conn);
        Ok((local_port, syn))
    }

    /// 应用层关闭。`remote = None` 表示关闭该端口上的监听者。
    ///
    /// 返回需要发送的 FIN（LISTEN/SYN_SENT 直接删除，不发报文）。
    pub fn close(
        &mut self,
        local_port: u16,
        remote: Option<(Ipv4Addr, u16)>,
    ) -> Result<Option<TcpSegment>, TcpError> {
        let pos = match remote {
            None => self
                .conns
                .iter()
                .position(|c| c.state == TcpState::Listen && c.local_port == local_port),
            Some((ip, port)) => self.conns.iter().position(|c| {
                c.state != TcpState::Listen
                    && c.local_port == local_port
                    && c.remote_ip == ip
                    && c.remote_port == port
            }),
        }
        .ok_or(TcpError::NoConnection(local_port))?;

        let conn = &mut self.conns[pos];
        let from = conn.state;
        let fin = match conn.state {
            TcpState::Listen | TcpState::SynSent | TcpState::Closed => {
                self.conns.remove(pos);
                debug!(local_port, %from, "TCP 连接直接关闭");
                return Ok(None);
            }
            TcpState::SynRecv | TcpState::Established => {
                let seg = conn.segment(TcpFlags::FIN_ACK);
                conn.snd_nxt = conn.snd_nxt.wrapping_add(1);
                conn.state = TcpState::FinWait1;
                Some(seg)
            }
            TcpState::CloseWait => {
                let seg = conn.segment(TcpFlags::FIN_ACK);
                conn.snd_nxt = conn.snd_nxt.wrapping_add(1);
                conn.state = TcpState::LastAck;
                Some(seg)
            }
            // 已在关闭流程中
            _ => None,
        };
        debug!(local_port, %from, to = %conn.state, "👋 TCP close");
        Ok(fin)
    }

    /// 删除所有 TIME_WAIT 连接
    pub fn reap_time_wait(&mut self) -> usize {
        let before = self.conns.len();
        self.conns.retain(|c| c.state != TcpState::TimeWait);
        before - self.conns.len()
    }

    /// 计算一个入站报文引起的变化；不修改表
    pub fn on_segment(
        &self,
        local_ip: Ipv4Addr,
        local_port: u16,
        remote_ip: Ipv4Addr,
        remote_port: u16,
        seg: &TcpSegment,
    ) -> SegmentOutcome {
        if let Some(conn) = self.find(local_port, remote_ip, remote_port) {
            let out = transition(conn, seg);
            trace!(
                local_port,
                remote_port,
                state = %conn.state,
                flags = %seg.flags,
                change = ?out.change,
                "TCP 状态迁移"
            );
            return out;
        }

        if seg.flags.rst {
            return SegmentOutcome::default();
        }

        if self.listener(local_port).is_some() {
            if seg.flags.syn && !seg.flags.ack {
                let iss = self.next_iss;
                let conn = TcpConnection {
                    local_ip,
                    local_port,
                    remote_ip,
                    remote_port,
                    state: TcpState::SynRecv,
                    iss,
                    snd_nxt: iss.wrapping_add(1),
                    rcv_nxt: seg.seq.wrapping_add(seg.seq_len()),
                };
                let reply = TcpSegment::new(TcpFlags::SYN_ACK, iss, conn.rcv_nxt);
                return SegmentOutcome {
                    change: Some(TcpChange::Upsert(conn)),
                    reply: Some(reply),
                };
            }
            if seg.flags.ack {
                return SegmentOutcome::reply(TcpSegment::new(TcpFlags::RST, seg.ack, 0));
            }
            return SegmentOutcome::default();
        }

        SegmentOutcome::reply(reset_for(seg))
    }

    /// 提交 [`TcpChange`]
    pub fn apply(&mut self, change: TcpChange) {
        match change {
            TcpChange::Upsert(conn) => {
                if conn.iss >= self.next_iss {
                    self.next_iss = conn.iss.wrapping_add(self.cfg.iss_step);
                }
                match self
                    .conns
                    .iter_mut()
                    .find(|c| c.state != TcpState::Listen && c.same_socket(&conn))
                {
                    Some(existing) => *existing = conn,
                    None => self.conns.push(conn),
                }
            }
            TcpChange::Remove {
                local_port,
                remote_ip,
                remote_port,
            } => {
                self.conns.retain(|c| {
                    c.state == TcpState::Listen
                        || !(c.local_port == local_port
                            && c.remote_ip == remote_ip
                            && c.remote_port == remote_port)
                });
            }
        }
    }

    fn take_iss(&mut self) -> u32 {
        let iss = self.next_iss;
        self.next_iss = self.next_iss.wrapping_add(self.cfg.iss_step);
        iss
    }

    fn alloc_ephemeral(&mut self) -> Result<u16, TcpError> {
        let start = self.cfg.ephemeral_start;
        let end = self.cfg.ephemeral_end.max(start);
        let span = (end - start) as u32 + 1;
        let mut candidate = self.next_ephemeral.clamp(start, end);
        for _ in 0..span {
            let taken = self.conns.iter().any(|c| c.local_port == candidate);
            let next = if candidate >= end { start } else { candidate + 1 };
            if !taken {
                self.next_ephemeral = next;
                return Ok(candidate);
            }
            candidate = next;
        }
        Err(TcpError::NoEphemeralPort)
    }
}

/// 对无匹配连接的报文回 RST（RFC 793 reset generation）
fn reset_for(seg: &TcpSegment) -> TcpSegment {
    if seg.flags.ack {
        TcpSegment::new(TcpFlags::RST, seg.ack, 0)
    } else {
        TcpSegment::new(TcpFlags::RST_ACK, 0, seg.seq.wrapping_add(seg.seq_len()))
    }
}

/// 已建立四元组上的状态迁移
fn transition(conn: &TcpConnection, seg: &TcpSegment) -> SegmentOutcome {
    let remove = || TcpChange::Remove {
        local_port: conn.local_port,
        remote_ip: conn.remote_ip,
        remote_port: conn.remote_port,
    };

    if seg.flags.rst {
        return SegmentOutcome {
            change: Some(remove()),
            reply: None,
        };
    }

    let mut next = conn.clone();
    let acks_all = seg.flags.ack && seg.ack == conn.snd_nxt;
    let mut reply = None;

    match conn.state {
        TcpState::SynSent => {
            if seg.flags.syn && seg.flags.ack {
                if !acks_all {
                    return SegmentOutcome::reply(TcpSegment::new(TcpFlags::RST, seg.ack, 0));
                }
                next.rcv_nxt = seg.seq.wrapping_add(seg.seq_len());
                next.state = TcpState::Established;
                reply = Some(next.segment(TcpFlags::ACK));
            } else if seg.flags.syn {
                // 同时打开
                next.rcv_nxt = seg.seq.wrapping_add(seg.seq_len());
                next.state = TcpState::SynRecv;
                reply = Some(TcpSegment::new(TcpFlags::SYN_ACK, conn.iss, next.rcv_nxt));
            } else {
                return SegmentOutcome::default();
            }
        }
        TcpState::SynRecv => {
            if seg.flags.syn && !seg.flags.ack {
                // 重传的 SYN：再发一次 SYN+ACK
                return SegmentOutcome::reply(TcpSegment::new(
                    TcpFlags::SYN_ACK,
                    conn.iss,
                    conn.rcv_nxt,
                ));
            }
            if !acks_all {
                return SegmentOutcome::default();
            }
            next.state = TcpState::Established;
            if seg.flags.syn {
                // 同时打开的一端收到 SYN+ACK
                reply = Some(next.segment(TcpFlags::ACK));
            }
            if seg.flags.fin {
                next.rcv_nxt = seg.seq.wrapping_add(seg.seq_len());
                next.state = TcpState::CloseWait;
                reply = Some(next.segment(TcpFlags::ACK));
            }
        }
        TcpState::Established => {
            if seg.flags.fin {
                next.rcv_nxt = seg.seq.wrapping_add(seg.seq_len());
                next.state = TcpState::CloseWait;
                reply = Some(next.segment(TcpFlags::ACK));
            } else if seg.len > 0 {
                next.rcv_nxt = seg.seq.wrapping_add(seg.len);
                reply = Some(next.segment(TcpFlags::ACK));
            } else {
                return SegmentOutcome::default();
            }
        }
        TcpState::FinWait1 => {
            if seg.flags.fin {
                next.rcv_nxt = seg.seq.wrapping_add(seg.seq_len());
                next.state = if acks_all {
                    TcpState::TimeWait
                } else {
                    TcpState::Closing
                };
                reply = Some(next.segment(TcpFlags::ACK));
            } else if acks_all {
                next.state = TcpState::FinWait2;
            } else {
                return SegmentOutcome::default();
            }
        }
        TcpState::FinWait2 => {
            if seg.flags.fin {
                next.rcv_nxt = seg.seq.wrapping_add(seg.seq_len());
                next.state = TcpState::TimeWait;
                reply = Some(next.segment(TcpFlags::ACK));
            } else if seg.len > 0 {
                next.rcv_nxt = seg.seq.wrapping_add(seg.len);
                reply = Some(next.segment(TcpFlags::ACK));
            } else {
                return SegmentOutcome::default();
            }
        }
        TcpState::Closing => {
            if acks_all {
                next.state = TcpState::TimeWait;
            } else {
                return SegmentOutcome::default();
            }
        }
        TcpState::LastAck => {
            if acks_all {
                return SegmentOutcome {
                    change: Some(remove()),
                    reply: None,
                };
            }
            return SegmentOutcome::default();
        }
        TcpState::TimeWait => {
            // 对端重传 FIN：重新确认
            if seg.flags.fin {
                return SegmentOutcome::reply(conn.segment(TcpFlags::ACK));
            }
            return SegmentOutcome::default();
        }
        TcpState::CloseWait | TcpState::Listen | TcpState::Closed => {
            return SegmentOutcome::default();
        }
    }

    SegmentOutcome {
        change: (next != *conn).then_some(TcpChange::Upsert(next)),
        reply,
    }
}
