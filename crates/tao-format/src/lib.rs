//! # tao-format
//!
//! Tao APE 容器格式库.
//!
//! 负责 APE 与 WAV 文件的读写、APE/ID3 标签, 以及文件级的压缩与解压流程.
//! 帧数据的编解码由 `tao-codec` 完成.

pub mod ape;
pub mod demuxer;
pub mod demuxers;
pub mod format_id;
pub mod io;
pub mod muxer;
pub mod muxers;
pub mod probe;
pub mod registry;
pub mod stream;
pub mod tags;

// 重导出常用类型
pub use ape::{ApeCompress, ApeDecompress, ApeFileInfo, ApeInfoField};
pub use demuxer::Demuxer;
pub use format_id::FormatId;
pub use io::IoContext;
pub use muxer::Muxer;
pub use probe::ProbeResult;
pub use registry::FormatRegistry;
pub use stream::Stream;
pub use tags::ApeTag;

/// 注册所有内置容器格式
pub fn register_all(registry: &mut FormatRegistry) {
    demuxers::register_all_demuxers(registry);
    muxers::register_all_muxers(registry);
}
