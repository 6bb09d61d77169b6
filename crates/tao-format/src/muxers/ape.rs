//! APE (Monkey's Audio) 封装器.
//!
//! 写入流程:
//! 1. `write_header()` - 写入占位文件头、WAV 头部和按最大音频字节数预留的跳转表
//! 2. `write_packet()` - 每个数据包是一帧, 记录跳转表并按小端字写出
//! 3. `write_trailer()` - 写出剩余字节与尾部数据, 回填文件头和跳转表

use std::io::SeekFrom;

use log::debug;
use tao_codec::ape::{ApeStreamConfig, CURRENT_VERSION, CompressionLevel, blocks_per_frame};
use tao_codec::{CodecId, Packet};
use tao_core::{TaoError, TaoResult};

use crate::ape::header::{ApeHeader, FormatFlags, max_frames_for};
use crate::ape::swap_word_bytes;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::stream::Stream;

/// APE 封装器
pub struct ApeMuxer {
    /// 文件头 (帧数等字段在 trailer 中回填)
    header: Option<ApeHeader>,
    /// 声明的最大音频字节数
    max_audio_bytes: Option<u64>,
    /// 保存的 WAV 头部, `None` 表示解压时生成
    wav_header: Option<Vec<u8>>,
    /// 帧数据之后的尾部数据
    terminating: Vec<u8>,
    /// 尾部数据中属于 WAV 的字节数
    wav_terminating_bytes: u32,
    /// 峰值
    peak_level: i32,
    /// "MAC " 的文件偏移
    header_start: u64,
    /// 跳转表容量
    max_frames: u32,
    /// 第一帧相对 "MAC " 的偏移
    first_frame_offset: u64,
    /// 跳转表 (相对 "MAC " 的偏移)
    seek_table: Vec<u32>,
    /// 已写入的帧数据字节数
    frame_bytes: u64,
    /// 尚未凑满一个字的字节
    pending: Vec<u8>,
    /// 上一帧是否不足一整帧
    short_frame_seen: bool,
}

impl ApeMuxer {
    /// 创建 APE 封装器实例 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Muxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建封装器
    pub fn new() -> Self {
        Self {
            header: None,
            max_audio_bytes: None,
            wav_header: None,
            terminating: Vec::new(),
            wav_terminating_bytes: 0,
            peak_level: -1,
            header_start: 0,
            max_frames: 0,
            first_frame_offset: 0,
            seek_table: Vec::new(),
            frame_bytes: 0,
            pending: Vec::new(),
            short_frame_seen: false,
        }
    }

    /// 声明最大音频字节数, 决定跳转表容量 (默认 2 GiB)
    pub fn set_max_audio_bytes(&mut self, bytes: Option<u64>) {
        self.max_audio_bytes = bytes;
    }

    /// 设置原始 WAV 头部; 不设置时文件带 CREATE_WAV_HEADER 标志
    pub fn set_wav_header(&mut self, header: Option<Vec<u8>>) {
        self.wav_header = header;
    }

    /// 设置帧数据之后的尾部数据, 其中前 `wav_bytes` 字节属于 WAV 文件
    pub fn set_terminating_data(&mut self, data: Vec<u8>, wav_bytes: u32) {
        self.wav_terminating_bytes = wav_bytes.min(data.len() as u32);
        self.terminating = data;
    }

    /// 设置峰值 (trailer 中写入)
    pub fn set_peak_level(&mut self, peak: i32) {
        self.peak_level = peak;
    }

    /// 已写入的帧数
    pub fn frames_written(&self) -> u32 {
        self.seek_table.len() as u32
    }

    /// 跳转表容量
    pub fn max_frames(&self) -> u32 {
        self.max_frames
    }

    /// 写出 `pending` 中完整的字
    fn flush_words(&mut self, io: &mut IoContext) -> TaoResult<()> {
        let full = self.pending.len() / 4 * 4;
        if full == 0 {
            return Ok(());
        }
        swap_word_bytes(&mut self.pending[..full]);
        io.write_all(&self.pending[..full])?;
        self.pending.drain(..full);
        Ok(())
    }

    /// 在 `header_start` 处写入文件头、扩展字段、WAV 头部与跳转表
    fn write_layout(&self, io: &mut IoContext, header: &ApeHeader) -> TaoResult<()> {
        io.seek(SeekFrom::Start(self.header_start))?;
        io.write_all(&header.to_bytes())?;
        io.write_i32_le(self.peak_level)?;
        io.write_u32_le(self.max_frames)?;
        if let Some(wav) = &self.wav_header {
            io.write_all(wav)?;
        }

        let mut table = Vec::new();
        table
            .try_reserve_exact(self.max_frames as usize * 4)
            .map_err(|e| TaoError::OutOfMemory(format!("跳转表分配失败: {e}")))?;
        for i in 0..self.max_frames as usize {
            let entry = self.seek_table.get(i).copied().unwrap_or(0);
            table.extend_from_slice(&entry.to_le_bytes());
        }
        io.write_all(&table)
    }
}

impl Default for ApeMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer for ApeMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Ape
    }

    fn name(&self) -> &str {
        "ape"
    }

    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> TaoResult<()> {
        let [stream] = streams else {
            return Err(TaoError::InvalidArgument("APE 仅支持单个音频流".into()));
        };
        if stream.codec_id != CodecId::Ape {
            return Err(TaoError::Unsupported(format!(
                "APE 不支持编解码器: {}",
                stream.codec_id
            )));
        }
        let (version, level) = if stream.extra_data.is_empty() {
            (CURRENT_VERSION, CompressionLevel::default())
        } else {
            let config = ApeStreamConfig::from_extra_data(&stream.extra_data)?;
            (config.version, config.level)
        };
        let format = stream.format;
        format.validate()?;

        let mut flags = FormatFlags::CRC
            | FormatFlags::HAS_PEAK_LEVEL
            | FormatFlags::HAS_SEEK_ELEMENTS
            | FormatFlags::for_bits(format.bits_per_sample);
        if self.wav_header.is_none() {
            flags |= FormatFlags::CREATE_WAV_HEADER;
        }
        let header = ApeHeader {
            version,
            level,
            flags,
            channels: format.channels,
            sample_rate: format.sample_rate,
            header_bytes: self.wav_header.as_ref().map_or(0, |h| h.len() as u32),
            terminating_bytes: 0,
            total_frames: 0,
            final_frame_blocks: 0,
        };

        self.header_start = io.position()?;
        self.max_frames = max_frames_for(&format, version, self.max_audio_bytes);
        self.seek_table.clear();
        self.seek_table
            .try_reserve(self.max_frames.min(4096) as usize)
            .map_err(|e| TaoError::OutOfMemory(format!("跳转表分配失败: {e}")))?;
        self.frame_bytes = 0;
        self.pending.clear();
        self.short_frame_seen = false;

        self.write_layout(io, &header)?;
        self.first_frame_offset = io.position()? - self.header_start;
        self.header = Some(header);

        debug!(
            "APE 写入头部: 版本 {version}, 级别 {level}, {format}, 跳转表 {} 项",
            self.max_frames
        );
        Ok(())
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> TaoResult<()> {
        let header = self
            .header
            .as_mut()
            .ok_or_else(|| TaoError::Format("APE 封装器未写入头部".into()))?;
        let bpf = blocks_per_frame(header.version);
        let blocks = u32::try_from(packet.duration)
            .ok()
            .filter(|&b| b > 0 && b <= bpf)
            .ok_or_else(|| {
                TaoError::InvalidArgument(format!("帧块数 {} 无效", packet.duration))
            })?;
        if self.short_frame_seen {
            return Err(TaoError::InvalidArgument(
                "只有最后一帧可以少于每帧块数".into(),
            ));
        }
        if self.seek_table.len() as u32 >= self.max_frames {
            return Err(TaoError::InvalidArgument(format!(
                "帧数超过跳转表容量 {}",
                self.max_frames
            )));
        }

        let offset = u32::try_from(self.first_frame_offset + self.frame_bytes)
            .map_err(|_| TaoError::Format("APE 文件超过 4 GiB".into()))?;
        self.seek_table.push(offset);
        header.total_frames += 1;
        header.final_frame_blocks = blocks;
        self.short_frame_seen = blocks < bpf;

        self.pending.extend_from_slice(&packet.data);
        self.frame_bytes += packet.data.len() as u64;
        self.flush_words(io)
    }

    fn write_trailer(&mut self, io: &mut IoContext) -> TaoResult<()> {
        let mut header = self
            .header
            .ok_or_else(|| TaoError::Format("APE 封装器未写入头部".into()))?;
        if header.total_frames == 0 {
            return Err(TaoError::InvalidArgument("没有音频数据可写入".into()));
        }

        if !self.pending.is_empty() {
            let padded = self.pending.len().div_ceil(4) * 4;
            self.pending.resize(padded, 0);
            self.flush_words(io)?;
        }
        io.write_all(&self.terminating)?;
        let end = io.position()?;

        header.terminating_bytes = self.wav_terminating_bytes;
        self.write_layout(io, &header)?;
        io.seek(SeekFrom::Start(end))?;
        io.flush()?;
        self.header = Some(header);

        debug!(
            "APE 写入尾部: {} 帧, 最后一帧 {} 块, 峰值 {}",
            header.total_frames, header.final_frame_blocks, self.peak_level
        );
        Ok(())
    }
}
