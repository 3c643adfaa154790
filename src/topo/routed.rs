//! 两个 LAN 经路由器链相连的拓扑
//!
//! `left: 10.0.1.0/24`，`right: 10.0.2.0/24`，路由器之间用 `10.255.i.0/30` 互联，
//! 每台路由器都配置到两侧 LAN 的静态路由。

use std::net::Ipv4Addr;

use tracing::debug;

use crate::net::{DeviceId, LinkParams, NetError, Network, PortId};

#[derive(Debug, Clone)]
pub struct RoutedOpts {
    /// 串联的路由器数量（至少 1）
    pub routers: usize,
    pub link: LinkParams,
}

impl Default for RoutedOpts {
    fn default() -> Self {
        Self {
            routers: 1,
            link: LinkParams::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Routed {
    pub left_host: DeviceId,
    pub right_host: DeviceId,
    pub left_switch: DeviceId,
    pub right_switch: DeviceId,
    pub routers: Vec<DeviceId>,
    pub left_ip: Ipv4Addr,
    pub right_ip: Ipv4Addr,
}

const LEFT_NET: &str = "10.0.1.0";
const RIGHT_NET: &str = "10.0.2.0";
const LAN_MASK: &str = "255.255.255.0";
const TRANSIT_MASK: &str = "255.255.255.252";

/// 构建路由拓扑
///
/// 拓扑结构：hl <-> swl <-> r0 <-> ... <-> rN <-> swr <-> hr
pub fn build_routed(net: &mut Network, opts: &RoutedOpts) -> Result<Routed, NetError> {
    let n = opts.routers.max(1);
    let left_host = net.add_host("hl");
    let right_host = net.add_host("hr");
    let left_switch = net.add_switch("swl");
    let right_switch = net.add_switch("swr");
    let routers: Vec<DeviceId> = (0..n).map(|i| net.add_router(format!("r{i}"))).collect();
    let first = routers[0];
    let last = routers[n - 1];

    net.configure_interface(PortId::new(left_host, 0), "10.0.1.10", LAN_MASK, Some("10.0.1.1"))?;
    net.configure_interface(PortId::new(right_host, 0), "10.0.2.10", LAN_MASK, Some("10.0.2.1"))?;
    net.connect(left_host, left_switch, opts.link)?;
    net.connect(right_host, right_switch, opts.link)?;

    // gi0/0 朝左，gi0/1 朝右
    net.configure_interface(PortId::new(first, 0), "10.0.1.1", LAN_MASK, None)?;
    let swl_port = net.free_port(left_switch)?;
    net.add_connection(swl_port, PortId::new(first, 0), opts.link)?;
    net.configure_interface(PortId::new(last, 1), "10.0.2.1", LAN_MASK, None)?;
    let swr_port = net.free_port(right_switch)?;
    net.add_connection(swr_port, PortId::new(last, 1), opts.link)?;

    for i in 0..n - 1 {
        let (a, b) = (routers[i], routers[i + 1]);
        net.configure_interface(PortId::new(a, 1), &transit(i, 1).to_string(), TRANSIT_MASK, None)?;
        net.configure_interface(PortId::new(b, 0), &transit(i, 2).to_string(), TRANSIT_MASK, None)?;
        net.add_connection(PortId::new(a, 1), PortId::new(b, 0), opts.link)?;
    }
    for (i, &r) in routers.iter().enumerate() {
        if i > 0 {
            let hop = transit(i - 1, 1).to_string();
            net.add_static_route(r, LEFT_NET, LAN_MASK, &hop, 1)?;
        }
        if i + 1 < n {
            let hop = transit(i, 2).to_string();
            net.add_static_route(r, RIGHT_NET, LAN_MASK, &hop, 1)?;
        }
    }
    debug!(routers = n, "路由拓扑已构建");

    Ok(Routed {
        left_host,
        right_host,
        left_switch,
        right_switch,
        routers,
        left_ip: Ipv4Addr::new(10, 0, 1, 10),
        right_ip: Ipv4Addr::new(10, 0, 2, 10),
    })
}

fn transit(i: usize, host: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 255, i as u8, host)
}
