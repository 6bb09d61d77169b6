//! 封装器实现模块.

pub mod ape;
pub mod wav;

use crate::format_id::FormatId;
use crate::registry::FormatRegistry;

/// 注册所有内置封装器
pub fn register_all_muxers(registry: &mut FormatRegistry) {
    registry.register_muxer(FormatId::Ape, ape::ApeMuxer::create);
    registry.register_muxer(FormatId::Wav, wav::WavMuxer::create);
}
