//! 两主机 LAN ping 演示
//!
//! h0 -> sw0 -> h1：发送若干 ICMP echo，统计收到的 echo reply，
//! 最后在 stdout 打印一行 JSON 汇总。

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use netlab_rs::net::{ICMP_ECHO_REPLY, LinkParams, Network};
use netlab_rs::sim::{SimConfig, Simulator};
use netlab_rs::topo::lan::{LanOpts, build_lan, prime_tables};
use serde_json::json;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "lan_ping", about = "LAN ping 仿真：h0 ping h1")]
struct Args {
    #[arg(long, default_value_t = 2)]
    hosts: usize,
    /// 发送的 echo request 个数
    #[arg(long, default_value_t = 3)]
    count: u16,
    #[arg(long, default_value_t = 100)]
    bandwidth_mbps: u32,
    #[arg(long, default_value_t = 5)]
    latency_ms: u32,
    /// 链路丢包率（百分比）
    #[arg(long, default_value_t = 0.0)]
    loss_pct: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,
    /// 最多推进多少个 tick
    #[arg(long, default_value_t = 1000)]
    max_ticks: u64,
    /// 预先填充 ARP/MAC 表（跳过 ARP 解析）
    #[arg(long)]
    prime: bool,
    /// 拓扑快照输出路径（JSON）
    #[arg(long)]
    snapshot_json: Option<PathBuf>,
    /// 抓包输出路径（JSON）
    #[arg(long)]
    capture_json: Option<PathBuf>,
}

fn main() {
    // 初始化 tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut net = Network::new();
    let opts = LanOpts {
        hosts: args.hosts.max(2),
        link: LinkParams {
            bandwidth_mbps: args.bandwidth_mbps,
            latency_ms: args.latency_ms,
            loss_pct: args.loss_pct,
        },
        ..LanOpts::default()
    };
    let lan = build_lan(&mut net, &opts).expect("build lan");
    if args.prime {
        prime_tables(&mut net, &lan).expect("prime tables");
    }
    if args.capture_json.is_some() {
        net.enable_capture();
    }

    let cfg = SimConfig {
        seed: args.seed,
        tick_ms: args.tick_ms,
        ..SimConfig::default()
    };
    let mut sim = Simulator::new(cfg).expect("valid sim config");
    sim.start();

    let (src, dst_ip) = (lan.hosts[0], lan.addrs[1]);
    info!(%dst_ip, count = args.count, "开始 ping");
    for seq in 1..=args.count {
        sim.send_ping(&mut net, src, &dst_ip.to_string(), seq)
            .expect("send ping");
    }
    let ticks = sim.run_until_idle(&mut net, args.max_ticks);

    let replies = sim
        .history()
        .filter(|p| p.current_device == Some(src) && p.icmp_type() == Some(ICMP_ECHO_REPLY))
        .count();
    info!(ticks, replies, "✅ 仿真完成");

    if let Some(path) = &args.snapshot_json {
        let snap = net.to_json().expect("serialize snapshot");
        fs::write(path, snap).expect("write snapshot json");
        eprintln!("wrote snapshot to {}", path.display());
    }
    if let Some(path) = &args.capture_json {
        let log = net.take_capture().unwrap_or_default();
        let json = log.to_json().expect("serialize capture events");
        fs::write(path, json).expect("write capture json");
        eprintln!("wrote capture events to {}", path.display());
    }

    let summary = json!({
        "ticks": ticks,
        "now_ms": sim.now().as_millis(),
        "sent": args.count,
        "replies": replies,
        "stats": net.stats,
    });
    println!("{summary}");
}
