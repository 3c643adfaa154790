//! 统计信息
//!
//! 定义网络仿真统计数据结构。

use std::collections::BTreeMap;

use serde::Serialize;

/// 网络统计信息
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub injected_pkts: u64,
    pub delivered_pkts: u64,
    pub delivered_bytes: u64,
    /// 设备处理后发往下一段链路的次数（含泛洪副本）
    pub forwarded_pkts: u64,
    pub dropped_pkts: u64,
    /// 链路丢包（按丢包率随机丢弃）
    pub lost_pkts: u64,
    pub buffered_pkts: u64,
    pub released_pkts: u64,
    /// 按丢弃原因计数
    pub drops: BTreeMap<String, u64>,
}

impl Stats {
    pub(crate) fn record_drop(&mut self, reason: &str) {
        self.dropped_pkts += 1;
        *self.drops.entry(reason.to_string()).or_default() += 1;
    }
}
