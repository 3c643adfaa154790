//! 交换机环拓扑（用于生成树实验）

use tracing::debug;

use crate::net::{ConnectionId, DeviceId, LinkParams, NetError, Network};

#[derive(Debug, Clone)]
pub struct RingOpts {
    pub switches: usize,
    pub link: LinkParams,
}

impl Default for RingOpts {
    fn default() -> Self {
        Self {
            switches: 4,
            link: LinkParams::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ring {
    pub switches: Vec<DeviceId>,
    /// `links[i]` 连接 `switches[i]` 与 `switches[(i + 1) % n]`
    pub links: Vec<ConnectionId>,
}

/// 构建环
///
/// 拓扑结构：s0 <-> s1 <-> ... <-> s(n-1) <-> s0
pub fn build_ring(net: &mut Network, opts: &RingOpts) -> Result<Ring, NetError> {
    let n = opts.switches;
    let switches: Vec<DeviceId> = (0..n).map(|i| net.add_switch(format!("s{i}"))).collect();
    let mut links = Vec::with_capacity(n);
    if n >= 2 {
        let pairs = if n == 2 { 1 } else { n };
        for i in 0..pairs {
            links.push(net.connect(switches[i], switches[(i + 1) % n], opts.link)?);
        }
    }
    debug!(switches = n, links = links.len(), "环拓扑已构建");
    Ok(Ring { switches, links })
}
