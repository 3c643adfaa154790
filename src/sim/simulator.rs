//! 仿真器
//!
//! 定义按 tick 推进的调度器：先推进链路上的包，再处理所有位于设备上的包。

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::config::{SimConfig, SimError, check_speed};
use super::propagation::{self, Advance};
use super::time::SimTime;
use crate::addr::MacAddr;
use crate::capture::CaptureKind;
use crate::engine::{self, DeviceUpdate, DropReason, Verdict};
use crate::net::{DeviceId, Network, Packet, Stage};

/// 单个 tick 的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub now: SimTime,
    /// 本 tick 到达设备的包
    pub arrived: usize,
    pub processed: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub lost: usize,
    pub buffered: usize,
    pub released: usize,
    /// tick 结束时仍在链路上或设备上的包
    pub in_flight: usize,
    pub expired_leases: usize,
}

/// tick 驱动的仿真器：持有所有在途/缓存的包。
#[derive(Debug)]
pub struct Simulator {
    cfg: SimConfig,
    now: SimTime,
    tick: u64,
    running: bool,
    packets: Vec<Packet>,
    history: VecDeque<Packet>,
    next_packet_id: u64,
    rng: SmallRng,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::from_config(SimConfig::default())
    }
}

impl Simulator {
    pub fn new(cfg: SimConfig) -> Result<Self, SimError> {
        cfg.validate()?;
        Ok(Self::from_config(cfg))
    }

    fn from_config(cfg: SimConfig) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(cfg.seed),
            cfg,
            now: SimTime::ZERO,
            tick: 0,
            running: false,
            packets: Vec::new(),
            history: VecDeque::new(),
            next_packet_id: 1,
        }
    }

    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// 所有在途、待处理和等待 ARP 的包
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// 最近交付的包（按交付顺序）
    pub fn history(&self) -> impl Iterator<Item = &Packet> {
        self.history.iter()
    }

    /// 在途包数（不含等待 ARP 的缓存包）
    pub fn in_flight(&self) -> usize {
        self.packets
            .iter()
            .filter(|p| matches!(p.stage, Stage::OnLink | Stage::AtDevice))
            .count()
    }

    pub fn start(&mut self) {
        self.running = true;
        info!(now = %self.now, "▶️  仿真开始");
    }

    /// 停止并丢弃所有在途与缓存的包
    pub fn stop(&mut self) {
        self.running = false;
        let cleared = self.packets.len();
        self.packets.clear();
        info!(now = %self.now, cleared, "⏹️  仿真停止");
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), SimError> {
        check_speed(speed)?;
        self.cfg.speed = speed;
        debug!(speed, "设置速度倍率");
        Ok(())
    }

    /// 注入一个位于设备上的包，下一次 tick 时处理；返回包编号
    pub fn inject(&mut self, net: &mut Network, mut pkt: Packet) -> u64 {
        self.assign_id(&mut pkt);
        net.stats.injected_pkts += 1;
        if let Some(cap) = net.capture.as_mut() {
            cap.record(self.tick, self.now.0, &pkt, CaptureKind::Inject);
        }
        trace!(pkt_id = pkt.id, summary = %pkt.summary(), "注入数据包");
        let id = pkt.id;
        self.packets.push(pkt);
        id
    }

    fn assign_id(&mut self, pkt: &mut Packet) {
        if pkt.id == 0 {
            pkt.id = self.next_packet_id;
            self.next_packet_id += 1;
        }
    }

    /// 推进一个 tick
    #[tracing::instrument(skip(self, net), fields(tick = self.tick + 1))]
    pub fn tick(&mut self, net: &mut Network) -> TickReport {
        self.tick += 1;
        self.now = self.now + SimTime::from_millis(self.cfg.tick_ms);
        let mut report = TickReport {
            tick: self.tick,
            now: self.now,
            ..TickReport::default()
        };

        net.age_tables();
        report.expired_leases = net.expire_dhcp_leases(self.now);
        self.send_hellos(net);

        // 1. 推进链路
        let mut ready = Vec::new();
        let mut keep = Vec::new();
        for pkt in std::mem::take(&mut self.packets) {
            match pkt.stage {
                Stage::OnLink => {
                    match propagation::advance(pkt, net, self.cfg.speed, self.cfg.tick_ms, &mut self.rng) {
                        Advance::Moving(p) => keep.push(p),
                        Advance::Arrived(p) => {
                            report.arrived += 1;
                            ready.push(p);
                        }
                        Advance::Lost(p) => {
                            report.lost += 1;
                            net.stats.lost_pkts += 1;
                            debug!(pkt_id = p.id, "💥 链路丢包");
                            if let Some(cap) = net.capture.as_mut() {
                                cap.record(self.tick, self.now.0, &p, CaptureKind::Lost);
                            }
                        }
                        Advance::Severed(p) => {
                            report.dropped += 1;
                            self.record_drop(net, &p, DropReason::LinkDown);
                        }
                    }
                }
                Stage::AtDevice => ready.push(pkt),
                Stage::Buffered => keep.push(pkt),
                Stage::Arrived | Stage::Dropped => {}
            }
        }
        self.packets = keep;

        // 2. 处理设备上的包
        for pkt in ready {
            self.process_at_device(net, pkt, &mut report);
        }

        report.in_flight = self.in_flight();
        trace!(?report, "tick 完成");
        report
    }

    /// 连续推进 `n` 个 tick
    pub fn run_ticks(&mut self, net: &mut Network, n: u64) -> Vec<TickReport> {
        (0..n).map(|_| self.tick(net)).collect()
    }

    /// 推进直到没有在途包或达到 `max_ticks`；返回实际推进的 tick 数
    #[tracing::instrument(skip(self, net))]
    pub fn run_until_idle(&mut self, net: &mut Network, max_ticks: u64) -> u64 {
        let mut ticks = 0;
        while ticks < max_ticks && self.in_flight() > 0 {
            self.tick(net);
            ticks += 1;
        }
        if self.in_flight() > 0 {
            warn!(ticks, in_flight = self.in_flight(), "⚠️  达到 tick 上限仍有在途包");
        } else {
            debug!(ticks, buffered = self.packets.len(), "网络空闲");
        }
        ticks
    }

    fn send_hellos(&mut self, net: &mut Network) {
        let Some(every) = self.cfg.stp_hello_ticks.filter(|n| *n > 0) else {
            return;
        };
        if self.tick % every != 0 {
            return;
        }
        let bridges: Vec<DeviceId> = net
            .devices()
            .filter(|d| d.stp.as_ref().is_some_and(|s| s.enabled))
            .map(|d| d.id)
            .collect();
        for id in bridges {
            let Ok(bpdus) = net.generate_bpdus(id) else {
                continue;
            };
            for mut pkt in bpdus {
                self.assign_id(&mut pkt);
                self.packets.push(pkt);
            }
        }
    }

    fn process_at_device(&mut self, net: &mut Network, pkt: Packet, report: &mut TickReport) {
        report.processed += 1;
        let Some(dev_id) = pkt.current_device else {
            report.dropped += 1;
            self.record_drop(net, &pkt, DropReason::Malformed);
            return;
        };
        if let Some(cap) = net.capture.as_mut() {
            cap.record(
                self.tick,
                self.now.0,
                &pkt,
                CaptureKind::Rx {
                    port: pkt.ingress.map(|p| p.index),
                },
            );
        }
        let Ok(device) = net.device(dev_id) else {
            report.dropped += 1;
            self.record_drop(net, &pkt, DropReason::NoEgress);
            return;
        };

        let original = pkt.clone();
        let outcome = engine::process(device, pkt, net);

        match outcome.verdict {
            Verdict::Delivered => {
                report.delivered += 1;
                net.stats.delivered_pkts += 1;
                net.stats.delivered_bytes += original.size_bytes as u64;
                if let Some(cap) = net.capture.as_mut() {
                    cap.record(self.tick, self.now.0, &original, CaptureKind::Deliver);
                }
                let mut done = original;
                done.stage = Stage::Arrived;
                self.remember(done);
            }
            Verdict::Consumed => {
                if let Some(cap) = net.capture.as_mut() {
                    cap.record(self.tick, self.now.0, &original, CaptureKind::Consumed);
                }
            }
            Verdict::Dropped(reason) => {
                report.dropped += 1;
                self.record_drop(net, &original, reason);
            }
            Verdict::Forwarded | Verdict::Buffered => {}
        }

        for mut p in outcome.packets {
            self.assign_id(&mut p);
            match p.stage {
                Stage::Buffered => {
                    report.buffered += 1;
                    net.stats.buffered_pkts += 1;
                    if let Some(cap) = net.capture.as_mut() {
                        let next_hop = p.waiting_for_arp.unwrap_or(Ipv4Addr::UNSPECIFIED);
                        cap.record(self.tick, self.now.0, &p, CaptureKind::Buffer { next_hop });
                    }
                }
                _ => self.record_tx(net, &p),
            }
            self.packets.push(p);
        }

        let mut learned: Vec<(Ipv4Addr, MacAddr)> = Vec::new();
        if let Ok(dev) = net.device_mut(dev_id) {
            for update in outcome.updates {
                let arp = match &update {
                    DeviceUpdate::LearnArp { ip, mac, .. } => Some((*ip, *mac)),
                    _ => None,
                };
                if dev.apply(update) {
                    learned.extend(arp);
                }
            }
        }
        for (ip, mac) in learned {
            report.released += self.release_waiting(net, dev_id, ip, mac);
        }
    }

    /// 释放 `dev` 上等待 `ip` 解析的缓存包
    fn release_waiting(&mut self, net: &mut Network, dev: DeviceId, ip: Ipv4Addr, mac: MacAddr) -> usize {
        let (waiting, rest): (Vec<Packet>, Vec<Packet>) =
            std::mem::take(&mut self.packets).into_iter().partition(|p| {
                p.stage == Stage::Buffered
                    && p.current_device == Some(dev)
                    && p.waiting_for_arp == Some(ip)
            });
        self.packets = rest;
        if waiting.is_empty() {
            return 0;
        }
        let Ok(device) = net.device(dev) else {
            return 0;
        };
        // 静态表项优先于刚学到的映射
        let mac = device.arp.lookup(ip).unwrap_or(mac);

        let count = waiting.len();
        let mut sent = Vec::new();
        for pkt in waiting {
            sent.extend(engine::release_buffered(device, pkt, mac, net));
        }
        debug!(device = dev.0, %ip, %mac, count, "🔓 ARP 解析完成，释放缓存包");
        net.stats.released_pkts += count as u64;
        for mut p in sent {
            self.assign_id(&mut p);
            if let Some(cap) = net.capture.as_mut() {
                cap.record(self.tick, self.now.0, &p, CaptureKind::Release);
            }
            self.record_tx(net, &p);
            self.packets.push(p);
        }
        count
    }

    fn record_tx(&self, net: &mut Network, p: &Packet) {
        net.stats.forwarded_pkts += 1;
        if let Some(cap) = net.capture.as_mut() {
            if let (Some(port), Some(to)) = (p.egress, p.target_device) {
                cap.record(
                    self.tick,
                    self.now.0,
                    p,
                    CaptureKind::Tx {
                        port: port.index,
                        to: to.0,
                    },
                );
            }
        }
    }

    fn record_drop(&self, net: &mut Network, p: &Packet, reason: DropReason) {
        debug!(pkt_id = p.id, %reason, summary = %p.summary(), "🗑️  丢弃数据包");
        net.stats.record_drop(reason.as_str());
        if let Some(cap) = net.capture.as_mut() {
            cap.record(
                self.tick,
                self.now.0,
                p,
                CaptureKind::Drop {
                    reason: reason.to_string(),
                },
            );
        }
    }

    fn remember(&mut self, pkt: Packet) {
        if self.cfg.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.cfg.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(pkt);
    }
}
