//! 交换机环生成树收敛演示
//!
//! 构建 N 台交换机组成的环，打印每台交换机的根桥、根端口与端口状态。

use clap::Parser;
use netlab_rs::net::{Network, PortId};
use netlab_rs::sim::{SimConfig, Simulator};
use netlab_rs::stp::PortRole;
use netlab_rs::topo::ring::{RingOpts, build_ring};
use serde_json::json;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "stp_ring", about = "STP 环收敛：打印端口角色与状态")]
struct Args {
    #[arg(long, default_value_t = 4)]
    switches: usize,
    /// 把第几台交换机设为最高优先级（最小数值）
    #[arg(long)]
    root: Option<usize>,
    /// 断开第几条环链路后重新收敛
    #[arg(long)]
    cut: Option<usize>,
    /// 收敛后发送 hello BPDU 的 tick 数
    #[arg(long, default_value_t = 0)]
    hello_ticks: u64,
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
    let ring = build_ring(
        &mut net,
        &RingOpts {
            switches: args.switches,
            ..RingOpts::default()
        },
    )
    .expect("build ring");

    if let Some(i) = args.root {
        let id = *ring.switches.get(i).expect("root index out of range");
        net.set_bridge_priority(id, 4096).expect("set bridge priority");
    }
    if let Some(i) = args.cut {
        let link = *ring.links.get(i).expect("cut index out of range");
        net.remove_connection(link).expect("remove link");
        info!(link = i, "✂️  断开环链路");
    }

    if args.hello_ticks > 0 {
        let mut sim = Simulator::new(SimConfig {
            stp_hello_ticks: Some(1),
            ..SimConfig::default()
        })
        .expect("valid sim config");
        sim.run_ticks(&mut net, args.hello_ticks);
    }

    let bridges: Vec<_> = ring
        .switches
        .iter()
        .filter_map(|&id| net.device(id).ok())
        .filter_map(|d| {
            let stp = d.stp.as_ref()?;
            let ports: Vec<_> = stp
                .ports
                .iter()
                .enumerate()
                .filter(|(i, _)| net.connection_of(PortId::new(d.id, *i)).is_some())
                .map(|(i, p)| {
                    json!({
                        "port": d.interfaces[i].name,
                        "role": p.role,
                        "state": p.state,
                        "cost": p.cost(),
                        "bpdus": p.bpdus_received,
                    })
                })
                .collect();
            Some(json!({
                "name": d.name,
                "bridge_id": stp.bridge_id.to_string(),
                "root_id": stp.root_id.to_string(),
                "is_root": stp.is_root(),
                "root_path_cost": stp.root_path_cost,
                "root_port": stp.root_port.map(|i| d.interfaces[i].name.clone()),
                "topology_changes": stp.topology_changes,
                "ports": ports,
            }))
        })
        .collect();

    let blocked = ring
        .switches
        .iter()
        .filter_map(|&id| net.device(id).ok())
        .filter_map(|d| d.stp.as_ref())
        .flat_map(|s| s.ports.iter())
        .filter(|p| !p.state.forwards() && p.role != PortRole::Disabled)
        .count();
    info!(blocked, "🌲 收敛完成");

    println!("{}", json!({ "bridges": bridges, "blocked_ports": blocked }));
}
