//! 编解码器注册表.
//!
//! 按 CodecId 保存工厂函数; 同一标识注册多次时先注册者优先.

use tao_core::{TaoError, TaoResult};

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::decoder::Decoder;
use crate::encoder::Encoder;

/// 解码器工厂函数类型
pub type DecoderFactory = fn() -> TaoResult<Box<dyn Decoder>>;

/// 编码器工厂函数类型
pub type EncoderFactory = fn() -> TaoResult<Box<dyn Encoder>>;

/// 注册条目
struct Entry<F> {
    codec_id: CodecId,
    name: &'static str,
    factory: F,
}

/// 编解码器注册表
#[derive(Default)]
pub struct CodecRegistry {
    decoders: Vec<Entry<DecoderFactory>>,
    encoders: Vec<Entry<EncoderFactory>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_decoder(
        &mut self,
        codec_id: CodecId,
        name: &'static str,
        factory: DecoderFactory,
    ) {
        self.decoders.push(Entry {
            codec_id,
            name,
            factory,
        });
    }

    pub fn register_encoder(
        &mut self,
        codec_id: CodecId,
        name: &'static str,
        factory: EncoderFactory,
    ) {
        self.encoders.push(Entry {
            codec_id,
            name,
            factory,
        });
    }

    /// 创建未打开的解码器
    pub fn create_decoder(&self, codec_id: CodecId) -> TaoResult<Box<dyn Decoder>> {
        let entry = self
            .decoders
            .iter()
            .find(|e| e.codec_id == codec_id)
            .ok_or_else(|| TaoError::CodecNotFound(format!("未找到 {codec_id} 的解码器")))?;
        (entry.factory)()
    }

    /// 创建未打开的编码器
    pub fn create_encoder(&self, codec_id: CodecId) -> TaoResult<Box<dyn Encoder>> {
        let entry = self
            .encoders
            .iter()
            .find(|e| e.codec_id == codec_id)
            .ok_or_else(|| TaoError::CodecNotFound(format!("未找到 {codec_id} 的编码器")))?;
        (entry.factory)()
    }

    /// 按流参数创建并打开解码器
    pub fn open_decoder(&self, params: &CodecParameters) -> TaoResult<Box<dyn Decoder>> {
        let mut decoder = self.create_decoder(params.codec_id)?;
        decoder.open(params)?;
        Ok(decoder)
    }

    /// 按注册顺序列出解码器
    pub fn list_decoders(&self) -> Vec<(CodecId, &'static str)> {
        self.decoders.iter().map(|e| (e.codec_id, e.name)).collect()
    }

    /// 按注册顺序列出编码器
    pub fn list_encoders(&self) -> Vec<(CodecId, &'static str)> {
        self.encoders.iter().map(|e| (e.codec_id, e.name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ape::{ApeStreamConfig, CompressionLevel, WaveFormat};

    #[test]
    fn test_注册所有编解码器() {
        let mut registry = CodecRegistry::new();
        crate::register_all(&mut registry);

        assert_eq!(registry.list_decoders(), vec![(CodecId::Ape, "ape")]);
        assert_eq!(registry.list_encoders(), vec![(CodecId::Ape, "ape")]);
        assert_eq!(registry.create_encoder(CodecId::Ape).unwrap().name(), "ape");
    }

    #[test]
    fn test_按参数打开解码器() {
        let mut registry = CodecRegistry::new();
        crate::register_all(&mut registry);

        let format = WaveFormat::new(2, 16, 44100).unwrap();
        let config = ApeStreamConfig {
            version: 3970,
            level: CompressionLevel::Normal,
            format_flags: 0,
        };
        let decoder = registry
            .open_decoder(&CodecParameters::ape(&format, Some(config)))
            .unwrap();
        assert_eq!(decoder.codec_id(), CodecId::Ape);

        // 缺少码流配置时打开失败
        assert!(registry.open_decoder(&CodecParameters::ape(&format, None)).is_err());
    }

    #[test]
    fn test_未注册的编解码器返回错误() {
        let registry = CodecRegistry::new();
        assert!(matches!(
            registry.create_decoder(CodecId::Ape),
            Err(TaoError::CodecNotFound(_))
        ));
        assert!(registry.create_encoder(CodecId::PcmS16le).is_err());
    }
}
