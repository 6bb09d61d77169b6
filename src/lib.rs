//! # tao-ape
//!
//! 纯 Rust 实现的 Monkey's Audio (APE) 无损音频编解码与文件封装.
//!
//! - **编解码**: 区间编码、多级自适应预测、NN 滤波, 支持 3.93 ~ 3.97 格式, 五个压缩级别
//! - **文件层**: APE 文件头与 seek 表, WAV 头部保存, APE/ID3v1 标签, `.apl` 链接文件
//! - **驱动**: 文件级压缩、解压、校验与转换, 带进度回调和终止标志
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use tao_ape::codec::ape::CompressionLevel;
//! use tao_ape::format::ape::{CompressOptions, ProcessControl, compress_file};
//!
//! let options = CompressOptions {
//!     level: CompressionLevel::High,
//!     ..Default::default()
//! };
//! let mut ctl = ProcessControl::new().with_progress(|p| println!("{p}%"));
//! compress_file("in.wav", "out.ape", options, &mut ctl).unwrap();
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 错误类型、CRC-32、采样格式与声道布局 |
//! | `tao-codec` | 编解码器框架与 APE 帧编解码核心 |
//! | `tao-format` | 容器格式框架, APE/WAV 读写, 标签与文件级处理 |

/// 核心类型与工具
pub use tao_core as core;

/// 编解码器框架
pub use tao_codec as codec;

/// 容器格式框架
pub use tao_format as format;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置编解码器的注册表
pub fn default_codec_registry() -> tao_codec::CodecRegistry {
    let mut registry = tao_codec::CodecRegistry::new();
    tao_codec::register_all(&mut registry);
    registry
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> tao_format::FormatRegistry {
    let mut registry = tao_format::FormatRegistry::new();
    tao_format::register_all(&mut registry);
    registry
}
