//! IPv4 地址工具
//!
//! 掩码统一用点分形式的 `Ipv4Addr` 表示；只接受连续掩码（CIDR）。

use std::net::Ipv4Addr;

use thiserror::Error;

/// 地址解析错误（配置边界上的“输入格式错误”）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("invalid IPv4 address: {0:?}")]
    InvalidIp(String),
    #[error("invalid subnet mask: {0:?}")]
    InvalidMask(String),
    #[error("invalid prefix length: /{0}")]
    InvalidPrefix(u8),
    #[error("invalid MAC address: {0:?}")]
    InvalidMac(String),
}

/// 解析点分十进制 IPv4 地址
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr, AddrError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| AddrError::InvalidIp(s.to_string()))
}

/// 解析子网掩码，接受 `255.255.255.0`、`/24` 或 `24` 三种写法
pub fn parse_mask(s: &str) -> Result<Ipv4Addr, AddrError> {
    let t = s.trim();
    let bits = t.strip_prefix('/').unwrap_or(t);
    if !bits.is_empty() && bits.len() <= 2 && bits.bytes().all(|b| b.is_ascii_digit()) {
        let prefix: u8 = bits
            .parse()
            .map_err(|_| AddrError::InvalidMask(s.to_string()))?;
        return cidr_to_subnet_mask(prefix);
    }
    let mask = t
        .parse::<Ipv4Addr>()
        .map_err(|_| AddrError::InvalidMask(s.to_string()))?;
    if !is_valid_mask(mask) {
        return Err(AddrError::InvalidMask(s.to_string()));
    }
    Ok(mask)
}

/// 解析 `10.0.0.0/24` 形式的网段，返回 (网络地址, 掩码)
pub fn parse_cidr(s: &str) -> Result<(Ipv4Addr, Ipv4Addr), AddrError> {
    let (ip, prefix) = s
        .trim()
        .split_once('/')
        .ok_or_else(|| AddrError::InvalidMask(s.to_string()))?;
    let ip = parse_ipv4(ip)?;
    let mask = parse_mask(prefix)?;
    Ok((network_address(ip, mask), mask))
}

/// 掩码是否连续（高位全 1，低位全 0）
pub fn is_valid_mask(mask: Ipv4Addr) -> bool {
    let m = u32::from(mask);
    m.leading_ones() + m.trailing_zeros() == 32
}

/// 掩码 -> 前缀长度；非连续掩码返回 `None`
pub fn subnet_mask_to_cidr(mask: Ipv4Addr) -> Option<u8> {
    if !is_valid_mask(mask) {
        return None;
    }
    Some(u32::from(mask).leading_ones() as u8)
}

/// 前缀长度 -> 掩码
pub fn cidr_to_subnet_mask(prefix: u8) -> Result<Ipv4Addr, AddrError> {
    match prefix {
        0 => Ok(Ipv4Addr::UNSPECIFIED),
        1..=32 => Ok(Ipv4Addr::from(u32::MAX << (32 - prefix as u32))),
        _ => Err(AddrError::InvalidPrefix(prefix)),
    }
}

pub fn network_address(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) & u32::from(mask))
}

pub fn broadcast_address(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(mask))
}

pub fn same_subnet(a: Ipv4Addr, b: Ipv4Addr, mask: Ipv4Addr) -> bool {
    network_address(a, mask) == network_address(b, mask)
}

/// 地址在该掩码下是否可作为主机地址（/31、/32 没有网络号/广播号之分）
pub fn is_host_address(ip: Ipv4Addr, mask: Ipv4Addr) -> bool {
    match subnet_mask_to_cidr(mask) {
        None => false,
        Some(31) | Some(32) => true,
        Some(_) => ip != network_address(ip, mask) && ip != broadcast_address(ip, mask),
    }
}

/// 可用主机地址范围 (first, last)
pub fn host_range(ip: Ipv4Addr, mask: Ipv4Addr) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let prefix = subnet_mask_to_cidr(mask)?;
    let net = u32::from(network_address(ip, mask));
    let bcast = u32::from(broadcast_address(ip, mask));
    if prefix >= 31 {
        return Some((Ipv4Addr::from(net), Ipv4Addr::from(bcast)));
    }
    Some((Ipv4Addr::from(net + 1), Ipv4Addr::from(bcast - 1)))
}

pub fn next_ip(ip: Ipv4Addr) -> Option<Ipv4Addr> {
    u32::from(ip).checked_add(1).map(Ipv4Addr::from)
}

/// RFC 1071 互联网校验和（16 位反码和的反码）
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for c in &mut chunks {
        sum = sum.wrapping_add(u16::from_be_bytes([c[0], c[1]]) as u32);
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
