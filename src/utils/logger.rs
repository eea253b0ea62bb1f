//! 日志宏统一出口
//!
//! 各模块通过 `crate::utils::logger::{debug, info, warn, error}` 使用 rat_logger

pub use rat_logger::{debug, error, info, warn};
