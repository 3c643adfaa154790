//! 路由表与最长前缀匹配
//!
//! 表项分两类：接口配置地址时自动生成的直连路由，以及手工添加的静态路由。
//! 查找规则：前缀最长者优先；前缀相同取 metric 最小；仍相同则取先插入的表项。

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::ip::{network_address, subnet_mask_to_cidr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Connected,
    Static,
}

/// 出接口：物理端口下标，或三层交换机上的 SVI（按 VLAN 号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteEgress {
    Port(usize),
    Svi(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// `None` 表示直连：下一跳就是目的地址本身
    pub next_hop: Option<Ipv4Addr>,
    pub egress: RouteEgress,
    pub metric: u32,
    pub kind: RouteKind,
}

impl Route {
    pub fn prefix_len(&self) -> u8 {
        subnet_mask_to_cidr(self.mask).unwrap_or(0)
    }

    pub fn matches(&self, dst: Ipv4Addr) -> bool {
        network_address(dst, self.mask) == network_address(self.destination, self.mask)
    }

    /// 到达 `dst` 时实际需要 ARP 解析的地址
    pub fn next_hop_for(&self, dst: Ipv4Addr) -> Ipv4Addr {
        self.next_hop.unwrap_or(dst)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// 添加路由；目的网段+掩码+下一跳完全相同的旧表项会被替换
    pub fn insert(&mut self, route: Route) {
        let dst = network_address(route.destination, route.mask);
        self.routes.retain(|r| {
            !(network_address(r.destination, r.mask) == dst
                && r.mask == route.mask
                && r.next_hop == route.next_hop
                && r.kind == route.kind)
        });
        self.routes.push(Route {
            destination: dst,
            ..route
        });
    }

    /// 删除匹配的静态路由，返回是否删除了表项
    pub fn remove_static(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool {
        let dst = network_address(destination, mask);
        let before = self.routes.len();
        self.routes
            .retain(|r| !(r.kind == RouteKind::Static && r.destination == dst && r.mask == mask));
        before != self.routes.len()
    }

    /// 删除某个出接口上的全部直连路由（接口改址或关闭时调用）
    pub fn remove_connected(&mut self, egress: RouteEgress) {
        self.routes
            .retain(|r| !(r.kind == RouteKind::Connected && r.egress == egress));
    }

    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&Route> {
        longest_prefix_match(&self.routes, dst)
    }
}

/// 最长前缀匹配
pub(crate) fn longest_prefix_match(routes: &[Route], dst: Ipv4Addr) -> Option<&Route> {
    let mut best: Option<&Route> = None;
    for r in routes.iter().filter(|r| r.matches(dst)) {
        best = match best {
            None => Some(r),
            Some(b) => {
                let better = r.prefix_len() > b.prefix_len()
                    || (r.prefix_len() == b.prefix_len() && r.metric < b.metric);
                if better { Some(r) } else { Some(b) }
            }
        };
    }
    best
}
