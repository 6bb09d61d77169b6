//! 编解码器参数.
//!
//! 由解封装器的流信息生成, 或由调用方按音频格式直接构造.

use tao_core::{ChannelLayout, SampleFormat, TaoResult};

use crate::ape::{ApeStreamConfig, WaveFormat};
use crate::codec_id::CodecId;

/// 编解码器参数
#[derive(Debug, Clone)]
pub struct CodecParameters {
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 额外数据 (APE: 版本号、压缩级别、格式标志, 各 2 字节小端)
    pub extra_data: Vec<u8>,
    /// 码率 (bits/s)
    pub bit_rate: u64,
    /// 音频参数
    pub audio: AudioCodecParams,
}

/// 音频编解码器参数
#[derive(Debug, Clone)]
pub struct AudioCodecParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道布局
    pub channel_layout: ChannelLayout,
    /// 采样格式
    pub sample_format: SampleFormat,
    /// 每帧块数 (0 表示由编解码器决定)
    pub frame_size: u32,
}

impl CodecParameters {
    /// 构造 APE 参数; `config` 为 `None` 时 `extra_data` 留空
    pub fn ape(format: &WaveFormat, config: Option<ApeStreamConfig>) -> Self {
        Self {
            codec_id: CodecId::Ape,
            extra_data: config.map(|c| c.to_extra_data()).unwrap_or_default(),
            bit_rate: 0,
            audio: AudioCodecParams {
                sample_rate: format.sample_rate,
                channel_layout: format.channel_layout(),
                sample_format: format.sample_format(),
                frame_size: 0,
            },
        }
    }

    /// 参数描述的 PCM 格式, 声道数或位深不受支持时报错
    pub fn wave_format(&self) -> TaoResult<WaveFormat> {
        WaveFormat::new(
            self.audio.channel_layout.channels as u16,
            self.audio.sample_format.bits_per_sample() as u16,
            self.audio.sample_rate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ape::CompressionLevel;

    #[test]
    fn test_ape_参数还原音频格式() {
        let format = WaveFormat::new(2, 24, 96000).unwrap();
        let config = ApeStreamConfig {
            version: 3970,
            level: CompressionLevel::High,
            format_flags: 0,
        };
        let params = CodecParameters::ape(&format, Some(config));
        assert_eq!(params.extra_data.len(), 6);
        assert_eq!(params.wave_format().unwrap(), format);
        assert!(CodecParameters::ape(&format, None).extra_data.is_empty());
    }
}
