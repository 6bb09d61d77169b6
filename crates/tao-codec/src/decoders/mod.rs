//! 解码器实现模块.

pub mod ape;

use crate::codec_id::CodecId;
use crate::registry::CodecRegistry;

/// 注册所有内置解码器
pub fn register_all_decoders(registry: &mut CodecRegistry) {
    registry.register_decoder(CodecId::Ape, "ape", ape::ApeDecoder::create);
}
