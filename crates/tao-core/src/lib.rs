//! # tao-core
//!
//! Tao 核心库, 提供 APE 编解码与封装共用的基础类型、错误处理和 CRC 工具.

pub mod channel_layout;
pub mod crc;
pub mod error;
pub mod rational;
pub mod sample_format;

// 重导出常用类型
pub use channel_layout::ChannelLayout;
pub use error::{TaoError, TaoResult};
pub use rational::{NOPTS_VALUE, Rational};
pub use sample_format::SampleFormat;
