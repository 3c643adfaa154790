//! 拓扑构建模块
//!
//! 常用小型拓扑：单交换机 LAN、路由器串联的两个 LAN、交换机环。

pub mod lan;
pub mod ring;
pub mod routed;
