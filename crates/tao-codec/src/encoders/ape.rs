//! APE 编码器.
//!
//! 输入交错 PCM, 凑满一帧 (版本决定的每帧块数) 即输出一个数据包;
//! 送入 `None` 后把剩余不足一帧的数据编码为最后一帧.

use std::collections::VecDeque;

use log::debug;
use tao_core::{TaoError, TaoResult};

use crate::ape::{ApeStreamConfig, CURRENT_VERSION, CompressionLevel, FrameEncoder, WaveFormat};
use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::encoder::Encoder;
use crate::frame::AudioFrame;
use crate::packet::Packet;

/// APE 编码器
pub struct ApeEncoder {
    /// 帧编码器 (open 之后可用)
    inner: Option<FrameEncoder>,
    /// 尚未凑满一帧的 PCM
    pending: Vec<u8>,
    /// 待取出的数据包
    packets: VecDeque<Packet>,
    /// 已编码的块数
    blocks_encoded: u64,
    /// 是否已收到刷新信号
    flushing: bool,
}

impl ApeEncoder {
    /// 创建 APE 编码器 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Encoder>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建未打开的编码器
    pub fn new() -> Self {
        Self {
            inner: None,
            pending: Vec::new(),
            packets: VecDeque::new(),
            blocks_encoded: 0,
            flushing: false,
        }
    }

    /// 直接以格式、版本与级别打开
    pub fn open_with(
        &mut self,
        format: WaveFormat,
        version: u16,
        level: CompressionLevel,
    ) -> TaoResult<()> {
        self.inner = Some(FrameEncoder::new(format, version, level)?);
        self.pending.clear();
        self.packets.clear();
        self.blocks_encoded = 0;
        self.flushing = false;
        debug!("打开 APE 编码器: 版本 {version}, 级别 {level}, {format}");
        Ok(())
    }

    /// 已编码数据的峰值
    pub fn peak_level(&self) -> i32 {
        self.inner.as_ref().map_or(0, FrameEncoder::peak_level)
    }

    /// 已编码的块数
    pub fn blocks_encoded(&self) -> u64 {
        self.blocks_encoded
    }

    /// 每帧块数
    pub fn blocks_per_frame(&self) -> Option<u32> {
        self.inner.as_ref().map(FrameEncoder::blocks_per_frame)
    }

    /// 编码 `pending` 开头的 `len` 字节为一个数据包
    fn emit(&mut self, len: usize) -> TaoResult<()> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| TaoError::Codec("编码器未打开, 请先调用 open()".into()))?;
        let encoded = inner.encode_frame(&self.pending[..len])?;
        self.pending.drain(..len);

        let pkt = Packet::audio(
            encoded.data,
            self.blocks_encoded,
            encoded.blocks,
            inner.format().sample_rate,
        );
        self.blocks_encoded += u64::from(encoded.blocks);
        self.packets.push_back(pkt);
        Ok(())
    }
}

impl Default for ApeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for ApeEncoder {
    fn codec_id(&self) -> CodecId {
        CodecId::Ape
    }

    fn name(&self) -> &str {
        "ape"
    }

    /// `extra_data` 为空时使用当前版本与 Normal 级别
    fn open(&mut self, params: &CodecParameters) -> TaoResult<()> {
        let (version, level) = if params.extra_data.is_empty() {
            (CURRENT_VERSION, CompressionLevel::default())
        } else {
            let config = ApeStreamConfig::from_extra_data(&params.extra_data)?;
            (config.version, config.level)
        };
        self.open_with(params.wave_format()?, version, level)
    }

    fn send_frame(&mut self, frame: Option<&AudioFrame>) -> TaoResult<()> {
        let (format, frame_bytes) = match &self.inner {
            Some(inner) => (
                *inner.format(),
                inner.blocks_per_frame() as usize * inner.format().block_align(),
            ),
            None => return Err(TaoError::Codec("编码器未打开, 请先调用 open()".into())),
        };

        let Some(frame) = frame else {
            if !self.pending.is_empty() {
                self.emit(self.pending.len())?;
            }
            self.flushing = true;
            return Ok(());
        };

        if frame.format != format {
            return Err(TaoError::InvalidArgument(format!(
                "输入格式 {} 与编码器 {} 不一致",
                frame.format, format
            )));
        }
        if frame.data.len() % format.block_align() != 0 {
            return Err(TaoError::InvalidArgument(format!(
                "PCM 长度 {} 不是块大小 {} 的整数倍",
                frame.data.len(),
                format.block_align()
            )));
        }

        self.pending.extend_from_slice(&frame.data);
        while self.pending.len() >= frame_bytes {
            self.emit(frame_bytes)?;
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> TaoResult<Packet> {
        if let Some(pkt) = self.packets.pop_front() {
            return Ok(pkt);
        }
        if self.flushing {
            return Err(TaoError::Eof);
        }
        Err(TaoError::NeedMoreData)
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.packets.clear();
        self.flushing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ape::{FrameDecoder, blocks_per_frame};

    fn mono16_params(config: Option<ApeStreamConfig>) -> CodecParameters {
        let format = WaveFormat::new(1, 16, 8000).unwrap();
        CodecParameters::ape(&format, config)
    }

    fn mono16_frame(blocks: usize, offset: usize) -> AudioFrame {
        let data = (0..blocks)
            .flat_map(|i| (((i + offset) as i32 % 700 - 350) as i16 * 40).to_le_bytes())
            .collect();
        AudioFrame::new(WaveFormat::new(1, 16, 8000).unwrap(), data)
    }

    #[test]
    fn test_按帧切分并在刷新时输出剩余() {
        let config = ApeStreamConfig {
            version: 3940,
            level: CompressionLevel::Fast,
            format_flags: 0,
        };
        let mut enc = ApeEncoder::new();
        enc.open(&mono16_params(Some(config))).unwrap();
        let bpf = blocks_per_frame(3940) as usize;
        assert_eq!(enc.blocks_per_frame(), Some(bpf as u32));

        let input = mono16_frame(bpf + 1000, 0);
        enc.send_frame(Some(&input)).unwrap();
        let first = enc.receive_packet().unwrap();
        assert_eq!(first.duration, bpf as i64);
        assert_eq!(first.pts, 0);
        assert!(matches!(enc.receive_packet(), Err(TaoError::NeedMoreData)));

        enc.send_frame(None).unwrap();
        let last = enc.receive_packet().unwrap();
        assert_eq!(last.duration, 1000);
        assert_eq!(last.pts, bpf as i64);
        assert!(matches!(enc.receive_packet(), Err(TaoError::Eof)));
        assert_eq!(enc.blocks_encoded(), (bpf + 1000) as u64);

        // 两个数据包拼接后与输入一致
        let fmt = WaveFormat::new(1, 16, 8000).unwrap();
        let mut dec = FrameDecoder::new(fmt, 3940, CompressionLevel::Fast).unwrap();
        let mut out = Vec::new();
        for pkt in [&first, &last] {
            let status = dec
                .decode_frame(&pkt.data, pkt.duration as u32, &mut out)
                .unwrap();
            assert!(!status.is_corrupt());
        }
        assert_eq!(out, input.data);
    }

    #[test]
    fn test_默认版本与峰值() {
        let mut enc = ApeEncoder::new();
        enc.open(&mono16_params(None)).unwrap();
        assert_eq!(enc.blocks_per_frame(), Some(blocks_per_frame(CURRENT_VERSION)));
        enc.send_frame(Some(&mono16_frame(700, 0))).unwrap();
        enc.send_frame(None).unwrap();
        assert_eq!(enc.peak_level(), 350 * 40);
    }

    #[test]
    fn test_格式不一致报错() {
        let mut enc = ApeEncoder::new();
        enc.open(&mono16_params(None)).unwrap();
        let frame = AudioFrame::new(WaveFormat::new(1, 8, 8000).unwrap(), vec![0x80; 4]);
        assert!(enc.send_frame(Some(&frame)).is_err());
    }
}
