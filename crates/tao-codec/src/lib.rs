//! # tao-codec
//!
//! Monkey's Audio (APE) 编解码器库, 提供帧级编解码核心与 Packet/Frame 抽象.
//!
//! ## 支持的编解码器
//!
//! - **解码器**: APE (3.93 ~ 3.97)
//! - **编码器**: APE
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_codec::{CodecRegistry, CodecId};
//!
//! let mut reg = CodecRegistry::new();
//! tao_codec::register_all(&mut reg);
//!
//! let decoder = reg.create_decoder(CodecId::Ape).unwrap();
//! let encoder = reg.create_encoder(CodecId::Ape).unwrap();
//! ```

pub mod ape;
pub mod codec_id;
pub mod codec_parameters;
pub mod decoder;
pub mod decoders;
pub mod encoder;
pub mod encoders;
pub mod frame;
pub mod packet;
pub mod registry;

// 重导出常用类型
pub use codec_id::CodecId;
pub use codec_parameters::{AudioCodecParams, CodecParameters};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use frame::AudioFrame;
pub use packet::Packet;
pub use registry::CodecRegistry;

/// 注册所有内置编解码器
pub fn register_all(registry: &mut CodecRegistry) {
    decoders::register_all_decoders(registry);
    encoders::register_all_encoders(registry);
}
