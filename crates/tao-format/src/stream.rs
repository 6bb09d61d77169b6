//! 流信息定义.
//!
//! 本库只处理单条 PCM 音频流: 解封装器打开文件后给出, 封装器写头部前由调用方提供.

use tao_codec::ape::WaveFormat;
use tao_codec::{AudioCodecParams, CodecId, CodecParameters};
use tao_core::Rational;

/// 音频流信息
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (在容器中的位置, 从 0 开始)
    pub index: usize,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// PCM 格式
    pub format: WaveFormat,
    /// 时间基 (1 / 采样率)
    pub time_base: Rational,
    /// 总块数 (-1 表示未知)
    pub duration: i64,
    /// 总帧数 (0 表示未知)
    pub nb_frames: u64,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
    /// 每帧块数 (0 表示由编解码器决定)
    pub frame_size: u32,
    /// 编解码器私有数据 (APE 为版本、级别与格式标志)
    pub extra_data: Vec<u8>,
}

impl Stream {
    /// 以 `format` 创建一条时长未知的音频流
    pub fn new_audio(codec_id: CodecId, format: WaveFormat) -> Self {
        Self {
            index: 0,
            codec_id,
            format,
            time_base: Rational::new(1, format.sample_rate as i32),
            duration: -1,
            nb_frames: 0,
            bit_rate: 0,
            frame_size: 0,
            extra_data: Vec::new(),
        }
    }

    /// 转换为编解码器参数
    pub fn codec_parameters(&self) -> CodecParameters {
        CodecParameters {
            codec_id: self.codec_id,
            extra_data: self.extra_data.clone(),
            bit_rate: self.bit_rate,
            audio: AudioCodecParams {
                sample_rate: self.format.sample_rate,
                channel_layout: self.format.channel_layout(),
                sample_format: self.format.sample_format(),
                frame_size: self.frame_size,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_音频流转换为编解码器参数() {
        let format = WaveFormat::new(2, 16, 44100).unwrap();
        let mut stream = Stream::new_audio(CodecId::Ape, format);
        stream.extra_data = vec![0x82, 0x0f, 0xd0, 0x07, 0, 0];
        stream.frame_size = 73728;

        let params = stream.codec_parameters();
        assert_eq!(params.codec_id, CodecId::Ape);
        assert_eq!(params.extra_data, stream.extra_data);
        assert_eq!(params.audio.frame_size, 73728);
        assert_eq!(params.wave_format().unwrap(), format);
        assert_eq!(stream.time_base, Rational::new(1, 44100));
    }
}
