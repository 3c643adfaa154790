//! 地址与路由工具
//!
//! 纯函数：IPv4 / MAC 的解析与格式化、CIDR 计算、最长前缀匹配、校验和。
//! 本模块不持有任何状态。

mod ip;
mod mac;
mod route;

pub use ip::{
    AddrError, broadcast_address, cidr_to_subnet_mask, host_range, internet_checksum,
    is_host_address, is_valid_mask, network_address, next_ip, parse_cidr, parse_ipv4,
    parse_mask, same_subnet, subnet_mask_to_cidr,
};
pub use mac::MacAddr;
pub use route::{Route, RouteEgress, RouteKind, RoutingTable};
