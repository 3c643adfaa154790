//! 仿真配置

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("invalid speed multiplier {0}: must be finite and positive")]
    InvalidSpeed(f64),
    #[error("invalid tick length: must be at least 1 ms")]
    InvalidTick,
}

/// 调度器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// 动画速度倍率，影响每 tick 的链路进度
    pub speed: f64,
    /// 链路丢包随机数种子
    pub seed: u64,
    /// 每个 tick 代表的仿真毫秒数
    pub tick_ms: u64,
    /// 每隔多少 tick 发送一轮 hello BPDU；`None` 表示不发
    pub stp_hello_ticks: Option<u64>,
    /// 保留最近多少个已交付的包
    pub history_limit: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            seed: 0,
            tick_ms: 10,
            stp_hello_ticks: None,
            history_limit: 256,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        check_speed(self.speed)?;
        if self.tick_ms == 0 {
            return Err(SimError::InvalidTick);
        }
        Ok(())
    }
}

pub(crate) fn check_speed(speed: f64) -> Result<(), SimError> {
    if speed.is_finite() && speed > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidSpeed(speed))
    }
}
