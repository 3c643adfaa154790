//! 单交换机 LAN 拓扑构建

use std::net::Ipv4Addr;

use tracing::debug;

use crate::addr::RouteEgress;
use crate::net::{DEFAULT_VLAN, DeviceId, LinkParams, NetError, Network, PortId};

/// LAN 拓扑配置选项
#[derive(Debug, Clone)]
pub struct LanOpts {
    pub hosts: usize,
    /// 网段前三个字节，主机地址为 `.10`、`.20`……
    pub prefix: [u8; 3],
    pub mask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub link: LinkParams,
}

impl Default for LanOpts {
    fn default() -> Self {
        Self {
            hosts: 2,
            prefix: [192, 168, 1],
            mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: None,
            link: LinkParams::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lan {
    pub switch: DeviceId,
    pub hosts: Vec<DeviceId>,
    pub addrs: Vec<Ipv4Addr>,
}

/// 构建 LAN
///
/// 拓扑结构：h0..hN 全部接在 sw0 上
pub fn build_lan(net: &mut Network, opts: &LanOpts) -> Result<Lan, NetError> {
    let switch = net.add_switch("sw0");
    let mut hosts = Vec::with_capacity(opts.hosts);
    let mut addrs = Vec::with_capacity(opts.hosts);
    let [a, b, c] = opts.prefix;
    let gateway = opts.gateway.map(|g| g.to_string());

    for i in 0..opts.hosts {
        let h = net.add_host(format!("h{i}"));
        let ip = Ipv4Addr::new(a, b, c, ((i + 1) * 10) as u8);
        net.configure_interface(
            PortId::new(h, 0),
            &ip.to_string(),
            &opts.mask.to_string(),
            gateway.as_deref(),
        )?;
        net.connect(h, switch, opts.link)?;
        hosts.push(h);
        addrs.push(ip);
    }
    debug!(hosts = hosts.len(), "LAN 拓扑已构建");
    Ok(Lan {
        switch,
        hosts,
        addrs,
    })
}

/// 预先填充主机 ARP 表与交换机 MAC 表
pub fn prime_tables(net: &mut Network, lan: &Lan) -> Result<(), NetError> {
    let mut learned = Vec::new();
    for (&h, &ip) in lan.hosts.iter().zip(&lan.addrs) {
        let mac = net.interface(PortId::new(h, 0))?.mac;
        let sw_port = net
            .peer_of(PortId::new(h, 0))
            .filter(|p| p.device == lan.switch)
            .ok_or(NetError::UnknownPort(PortId::new(h, 0)))?;
        learned.push((h, ip, mac, sw_port.index));
    }
    for &(_, _, mac, port) in &learned {
        net.device_mut(lan.switch)?
            .mac_table
            .learn(mac, port, DEFAULT_VLAN);
    }
    for &(h, ..) in &learned {
        let dev = net.device_mut(h)?;
        for &(other, ip, mac, _) in &learned {
            if other != h {
                dev.arp.learn(ip, mac, RouteEgress::Port(0));
            }
        }
    }
    Ok(())
}
