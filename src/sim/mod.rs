//! 仿真核心模块
//!
//! 此模块包含 tick 驱动仿真的核心组件：仿真时间、配置、链路传播、调度器与用户意图。

// 子模块声明
mod config;
mod intents;
mod propagation;
mod simulator;
mod time;

// 重新导出公共接口
pub use config::{SimConfig, SimError};
pub use propagation::{Advance, advance, progress_per_tick};
pub use simulator::{Simulator, TickReport};
pub use time::SimTime;
