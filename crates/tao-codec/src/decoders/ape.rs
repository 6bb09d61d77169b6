//! APE 解码器.
//!
//! 每个数据包是一个完整的 APE 帧 (逻辑字节序), `duration` 字段给出帧内块数.
//! 码流配置 (版本、压缩级别) 通过 `extra_data` 传入, 见 [`ApeStreamConfig`].

use log::{debug, warn};
use tao_core::{TaoError, TaoResult};

use crate::ape::{ApeStreamConfig, FrameDecoder, FrameStatus, WaveFormat};
use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::decoder::Decoder;
use crate::frame::AudioFrame;
use crate::packet::Packet;

/// APE 解码器
pub struct ApeDecoder {
    /// 帧解码器 (open 之后可用)
    inner: Option<FrameDecoder>,
    /// 音频格式
    format: Option<WaveFormat>,
    /// 码流配置
    config: Option<ApeStreamConfig>,
    /// 已解码帧缓冲
    output_frame: Option<AudioFrame>,
    /// 已解码帧计数
    frames_decoded: u64,
    /// 校验失败的帧计数
    corrupt_frames: u64,
    /// 是否已收到刷新信号
    flushing: bool,
}

impl ApeDecoder {
    /// 创建 APE 解码器 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Decoder>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建未打开的解码器
    pub fn new() -> Self {
        Self {
            inner: None,
            format: None,
            config: None,
            output_frame: None,
            frames_decoded: 0,
            corrupt_frames: 0,
            flushing: false,
        }
    }

    /// 校验失败的帧数
    pub fn corrupt_frames(&self) -> u64 {
        self.corrupt_frames
    }
}

impl Default for ApeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ApeDecoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Ape
    }

    fn name(&self) -> &str {
        "ape"
    }

    fn open(&mut self, params: &CodecParameters) -> TaoResult<()> {
        let config = ApeStreamConfig::from_extra_data(&params.extra_data)?;
        let format = params.wave_format()?;

        self.inner = Some(FrameDecoder::new(format, config.version, config.level)?);
        self.format = Some(format);
        self.config = Some(config);
        self.output_frame = None;
        self.frames_decoded = 0;
        self.corrupt_frames = 0;
        self.flushing = false;

        debug!(
            "打开 APE 解码器: 版本 {}, 级别 {}, {}",
            config.version, config.level, format
        );
        Ok(())
    }

    fn send_packet(&mut self, packet: &Packet) -> TaoResult<()> {
        let (inner, format) = match (self.inner.as_mut(), self.format) {
            (Some(inner), Some(format)) => (inner, format),
            _ => return Err(TaoError::Codec("解码器未打开, 请先调用 open()".into())),
        };
        if self.output_frame.is_some() {
            return Err(TaoError::NeedMoreData);
        }

        // 空包 = flush
        if packet.is_empty() {
            self.flushing = true;
            return Ok(());
        }

        let blocks = u32::try_from(packet.duration)
            .ok()
            .filter(|&b| b > 0)
            .ok_or_else(|| {
                TaoError::InvalidArgument(format!("APE 数据包块数无效: {}", packet.duration))
            })?;

        let mut data = Vec::new();
        let status = inner.decode_frame(&packet.data, blocks, &mut data)?;
        let mut frame = AudioFrame::new(format, data);
        frame.pts = packet.pts;
        if let FrameStatus::Corrupt { reason } = status {
            warn!("APE 第 {} 帧损坏, 以静音代替: {}", self.frames_decoded, reason);
            frame.corrupt = true;
            self.corrupt_frames += 1;
        }
        self.frames_decoded += 1;

        self.output_frame = Some(frame);
        Ok(())
    }

    fn receive_frame(&mut self) -> TaoResult<AudioFrame> {
        if let Some(frame) = self.output_frame.take() {
            return Ok(frame);
        }
        if self.flushing {
            return Err(TaoError::Eof);
        }
        Err(TaoError::NeedMoreData)
    }

    fn flush(&mut self) {
        self.output_frame = None;
        self.flushing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ape::{CompressionLevel, FrameEncoder};

    fn make_params(format: &WaveFormat, version: u16, level: CompressionLevel) -> CodecParameters {
        let config = ApeStreamConfig {
            version,
            level,
            format_flags: 0,
        };
        CodecParameters::ape(format, Some(config))
    }

    fn make_pcm(blocks: usize) -> Vec<u8> {
        (0..blocks)
            .flat_map(|i| {
                let l = ((i as f64 * 0.05).sin() * 9000.0) as i16;
                let r = ((i as f64 * 0.031).cos() * 7000.0) as i16;
                let mut b = l.to_le_bytes().to_vec();
                b.extend_from_slice(&r.to_le_bytes());
                b
            })
            .collect()
    }

    #[test]
    fn test_解码数据包() {
        let fmt = WaveFormat::new(2, 16, 44100).unwrap();
        let pcm = make_pcm(2048);
        let mut enc = FrameEncoder::new(fmt, 3970, CompressionLevel::High).unwrap();
        let encoded = enc.encode_frame(&pcm).unwrap();

        let mut dec = ApeDecoder::create().unwrap();
        dec.open(&make_params(&fmt, 3970, CompressionLevel::High))
            .unwrap();
        let mut pkt = Packet::from_data(encoded.data);
        pkt.duration = i64::from(encoded.blocks);
        pkt.pts = 0;
        dec.send_packet(&pkt).unwrap();
        let frame = dec.receive_frame().unwrap();
        assert!(!frame.corrupt);
        assert_eq!(frame.nb_samples, 2048);
        assert_eq!(frame.data, pcm);
        assert!(matches!(dec.receive_frame(), Err(TaoError::NeedMoreData)));

        dec.send_packet(&Packet::empty()).unwrap();
        assert!(matches!(dec.receive_frame(), Err(TaoError::Eof)));
    }

    #[test]
    fn test_损坏帧标记() {
        let fmt = WaveFormat::new(2, 16, 44100).unwrap();
        let pcm = make_pcm(500);
        let mut enc = FrameEncoder::new(fmt, 3970, CompressionLevel::Normal).unwrap();
        let mut encoded = enc.encode_frame(&pcm).unwrap();
        encoded.data[2] ^= 0x40;

        let mut dec = ApeDecoder::new();
        dec.open(&make_params(&fmt, 3970, CompressionLevel::Normal))
            .unwrap();
        let mut pkt = Packet::from_data(encoded.data);
        pkt.duration = 500;
        dec.send_packet(&pkt).unwrap();
        let frame = dec.receive_frame().unwrap();
        assert!(frame.corrupt);
        assert_eq!(frame.data.len(), pcm.len());
        assert_eq!(dec.corrupt_frames(), 1);
    }

    #[test]
    fn test_未打开或缺少块数时报错() {
        let mut dec = ApeDecoder::new();
        assert!(dec.send_packet(&Packet::from_data(vec![0u8; 8])).is_err());

        let fmt = WaveFormat::new(1, 8, 8000).unwrap();
        dec.open(&make_params(&fmt, 3950, CompressionLevel::Fast))
            .unwrap();
        assert!(dec.send_packet(&Packet::from_data(vec![0u8; 8])).is_err());
    }

    #[test]
    fn test_缺少extra_data时打开失败() {
        let fmt = WaveFormat::new(1, 16, 8000).unwrap();
        let mut params = make_params(&fmt, 3970, CompressionLevel::Fast);
        params.extra_data.clear();
        assert!(ApeDecoder::new().open(&params).is_err());
    }
}
