//! 传输层/协议模块
//!
//! 包含 TCP 连接状态机（三次握手、四次挥手、RST）。

pub mod tcp;

// Segment types live in `net::transport`.
