//! WAV (RIFF WAVE) 封装器.
//!
//! 将 PCM 音频数据写入 WAV 文件.
//!
//! 写入流程:
//! 1. `write_header()` - 写入 RIFF 和 fmt 块, 预留 data 块大小
//! 2. `write_packet()` - 追加 PCM 数据
//! 3. `write_trailer()` - 写入尾部数据, 回填 RIFF 大小和 data 块大小
//!
//! 设置了原始头部 ([`WavMuxer::set_raw_header`]) 时头部按原样写出, 不做回填,
//! 用于把 APE 文件中保存的 WAV 头还原为字节一致的文件.

use log::debug;
use tao_codec::ape::WaveFormat;
use tao_codec::{CodecId, Packet};
use tao_core::{TaoError, TaoResult};

use crate::demuxers::wav::WAV_FORMAT_PCM;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::stream::Stream;

/// 标准 PCM WAV 头部长度
pub const CANONICAL_HEADER_SIZE: usize = 44;

/// RIFF 大小字段偏移
const RIFF_SIZE_OFFSET: u64 = 4;
/// data 块大小字段偏移
const DATA_SIZE_OFFSET: u64 = 40;

/// 生成 44 字节的标准 PCM WAV 头部
///
/// `data_bytes` 超出 u32 范围时按 u32 截断.
pub fn canonical_header(format: &WaveFormat, data_bytes: u64) -> Vec<u8> {
    let block_align = format.block_align() as u32;
    let data_size = data_bytes.min(u64::from(u32::MAX - 36)) as u32;
    let mut buf = Vec::with_capacity(CANONICAL_HEADER_SIZE);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(data_size + 36).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&WAV_FORMAT_PCM.to_le_bytes());
    buf.extend_from_slice(&format.channels.to_le_bytes());
    buf.extend_from_slice(&format.sample_rate.to_le_bytes());
    buf.extend_from_slice(&(format.sample_rate * block_align).to_le_bytes());
    buf.extend_from_slice(&(block_align as u16).to_le_bytes());
    buf.extend_from_slice(&format.bits_per_sample.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    buf
}

/// WAV 封装器
pub struct WavMuxer {
    /// 原样写出的头部
    raw_header: Option<Vec<u8>>,
    /// data 块之后的尾部字节
    terminating: Vec<u8>,
    /// 已写入的数据字节数
    data_written: u64,
}

impl WavMuxer {
    /// 创建 WAV 封装器实例 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Muxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建封装器
    pub fn new() -> Self {
        Self {
            raw_header: None,
            terminating: Vec::new(),
            data_written: 0,
        }
    }

    /// 设置原样写出的头部字节
    pub fn set_raw_header(&mut self, header: Vec<u8>) {
        self.raw_header = Some(header);
    }

    /// 设置 data 块之后写出的尾部字节
    pub fn set_terminating_data(&mut self, data: Vec<u8>) {
        self.terminating = data;
    }

    /// 校验流的编解码器与位深一致, 返回音频格式
    fn resolve_format(stream: &Stream) -> TaoResult<WaveFormat> {
        let expected = CodecId::pcm_from_bits(u32::from(stream.format.bits_per_sample));
        if expected != Some(stream.codec_id) {
            return Err(TaoError::Unsupported(format!(
                "WAV 不支持编解码器: {} ({} 位)",
                stream.codec_id, stream.format.bits_per_sample
            )));
        }
        Ok(stream.format)
    }
}

impl Default for WavMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer for WavMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Wav
    }

    fn name(&self) -> &str {
        "wav"
    }

    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> TaoResult<()> {
        let [stream] = streams else {
            return Err(TaoError::InvalidArgument("WAV 仅支持单个音频流".into()));
        };
        let format = Self::resolve_format(stream)?;

        match &self.raw_header {
            Some(header) => io.write_all(header)?,
            None => io.write_all(&canonical_header(&format, 0))?,
        }
        self.data_written = 0;

        debug!("WAV 写入头部: {format}");
        Ok(())
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> TaoResult<()> {
        io.write_all(&packet.data)?;
        self.data_written += packet.data.len() as u64;
        Ok(())
    }

    fn write_trailer(&mut self, io: &mut IoContext) -> TaoResult<()> {
        io.write_all(&self.terminating)?;
        if self.raw_header.is_some() {
            return Ok(());
        }
        let end = io.position()?;
        let data_size = self.data_written.min(u64::from(u32::MAX - 36)) as u32;
        let riff_size = (end - 8).min(u64::from(u32::MAX)) as u32;

        io.seek(std::io::SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        io.write_u32_le(riff_size)?;
        io.seek(std::io::SeekFrom::Start(DATA_SIZE_OFFSET))?;
        io.write_u32_le(data_size)?;
        io.seek(std::io::SeekFrom::Start(end))?;

        debug!("WAV 写入尾部: riff_size={riff_size}, data_size={data_size}");
        Ok(())
    }
}
