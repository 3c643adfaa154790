//! 链路传播：按 tick 推进 on-link 包的进度

use rand::Rng;
use tracing::trace;

use crate::net::{Connection, Network, Packet, Stage};

/// 一次推进的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// 仍在链路上（或不是 on-link 包）
    Moving(Packet),
    /// 到达对端设备，进入 at-device
    Arrived(Packet),
    /// 按链路丢包率被丢弃
    Lost(Packet),
    /// 所在链路已被删除或 down
    Severed(Packet),
}

/// 每 tick 的进度增量（百分比），上限 100
pub fn progress_per_tick(conn: &Connection, size_bytes: u32, speed: f64, tick_ms: u64) -> f64 {
    let transit = conn.transit_ms(size_bytes);
    if transit <= 0.0 {
        return 100.0;
    }
    (speed * 100.0 * tick_ms as f64 / transit).min(100.0)
}

/// 推进一个 on-link 包
pub fn advance<R: Rng>(
    mut pkt: Packet,
    net: &Network,
    speed: f64,
    tick_ms: u64,
    rng: &mut R,
) -> Advance {
    if pkt.stage != Stage::OnLink || pkt.target_device.is_none() {
        return Advance::Moving(pkt);
    }
    let Some(conn) = pkt.connection.and_then(|c| net.connection(c).ok()) else {
        return Advance::Severed(pkt);
    };
    if !conn.up {
        return Advance::Severed(pkt);
    }

    if !pkt.loss_checked {
        pkt.loss_checked = true;
        if conn.loss_pct > 0.0 && rng.gen_range(0.0..100.0) < conn.loss_pct {
            return Advance::Lost(pkt);
        }
    }

    pkt.progress = (pkt.progress + progress_per_tick(conn, pkt.size_bytes, speed, tick_ms)).min(100.0);
    if pkt.progress < 100.0 {
        return Advance::Moving(pkt);
    }

    let Some(peer) = pkt.egress.and_then(|e| conn.peer_of(e)) else {
        return Advance::Severed(pkt);
    };
    pkt.stage = Stage::AtDevice;
    pkt.last_device = pkt.current_device;
    pkt.current_device = Some(peer.device);
    pkt.target_device = None;
    pkt.progress = 0.0;
    pkt.ingress = Some(peer);
    pkt.egress = None;
    pkt.connection = None;
    pkt.locally_generated = false;
    pkt.path.push(peer.device);
    trace!(pkt_id = pkt.id, at = peer.device.0, port = peer.index, "到达设备");
    Advance::Arrived(pkt)
}
