//! APE 解压句柄.
//!
//! 组合 [`ApeDemuxer`] 与 [`ApeDecoder`], 提供按块读取 PCM、按块定位和信息查询.
//! 解压范围可以是整个文件, 也可以是链接文件 (.apl) 指定的一段.

use std::path::Path;

use log::{debug, warn};
use tao_codec::ape::WaveFormat;
use tao_codec::decoders::ape::ApeDecoder;
use tao_codec::{Decoder, Packet};
use tao_core::{Rational, TaoError, TaoResult};

use super::header::ApeFileInfo;
use super::link::ApeLink;
use crate::demuxer::Demuxer;
use crate::demuxers::ape::ApeDemuxer;
use crate::io::IoContext;
use crate::muxers::wav::canonical_header;
use crate::tags::ApeTag;

/// 信息查询字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApeInfoField {
    FileVersion,
    CompressionLevel,
    FormatFlags,
    SampleRate,
    BitsPerSample,
    BytesPerSample,
    Channels,
    BlockAlign,
    BlocksPerFrame,
    FinalFrameBlocks,
    TotalFrames,
    WavHeaderBytes,
    WavTerminatingBytes,
    WavDataBytes,
    WavTotalBytes,
    ApeTotalBytes,
    /// 整个文件的总块数
    TotalBlocks,
    /// 整个文件的时长 (毫秒)
    LengthMs,
    /// 平均码率 (kbps)
    AverageBitrate,
    /// 解压后码率 (kbps)
    DecompressedBitrate,
    PeakLevel,
    /// 指定帧的起始偏移
    SeekByte(u32),
    /// 指定帧的块数
    FrameBlocks(u32),
    /// 解压范围内的当前块
    CurrentBlock,
    /// 解压范围内的当前时间 (毫秒)
    CurrentMs,
    /// 解压范围的总块数
    DecompressTotalBlocks,
    /// 解压范围的时长 (毫秒)
    DecompressLengthMs,
    /// 当前帧的码率 (kbps)
    CurrentBitrate,
}

/// 解压选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecompressOptions {
    /// 只解压 `[start, finish)` 范围的块, 通常来自链接文件
    pub block_range: Option<(u64, u64)>,
}

/// 已解码帧缓存
struct DecodedFrame {
    index: u32,
    first_block: u64,
    pcm: Vec<u8>,
}

/// APE 解压句柄
pub struct ApeDecompress {
    io: IoContext,
    demuxer: ApeDemuxer,
    decoder: ApeDecoder,
    info: ApeFileInfo,
    format: WaveFormat,
    /// 解压范围 (文件内的绝对块号)
    start_block: u64,
    finish_block: u64,
    /// 下一个要输出的块 (绝对块号)
    current_block: u64,
    /// 最近解码的一帧
    cache: Option<DecodedFrame>,
    /// 校验失败的帧号
    corrupt_frames: Vec<u32>,
}

impl ApeDecompress {
    /// 打开文件; 扩展名为 .apl 时按链接文件解析
    pub fn open(path: impl AsRef<Path>) -> TaoResult<Self> {
        let path = path.as_ref();
        if ApeLink::is_link_path(path) {
            let link = ApeLink::read(path)?;
            let io = IoContext::open_read(&link.image_file)?;
            return Self::open_with(
                io,
                DecompressOptions {
                    block_range: Some((link.start_block, link.finish_block)),
                },
            );
        }
        Self::open_io(IoContext::open_read(path)?)
    }

    /// 从字节流打开整个文件
    pub fn open_io(io: IoContext) -> TaoResult<Self> {
        Self::open_with(io, DecompressOptions::default())
    }

    /// 从字节流按选项打开
    pub fn open_with(mut io: IoContext, options: DecompressOptions) -> TaoResult<Self> {
        let mut demuxer = ApeDemuxer::new();
        demuxer.open(&mut io)?;
        let info = demuxer
            .info()
            .cloned()
            .ok_or_else(|| TaoError::Internal("解封装器打开后缺少文件信息".into()))?;

        let mut decoder = ApeDecoder::new();
        let params = demuxer.audio_stream()?.codec_parameters();
        decoder.open(&params)?;

        let (start_block, finish_block) = match options.block_range {
            Some((start, finish)) => {
                let finish = finish.min(info.total_blocks);
                let start = start.min(finish);
                (start, finish)
            }
            None => (0, info.total_blocks),
        };

        debug!(
            "打开 APE 解压: {}, 范围 [{start_block}, {finish_block})",
            io.name()
        );
        Ok(Self {
            io,
            demuxer,
            decoder,
            format: info.format,
            info,
            start_block,
            finish_block,
            current_block: start_block,
            cache: None,
            corrupt_frames: Vec::new(),
        })
    }

    /// 文件信息
    pub fn info(&self) -> &ApeFileInfo {
        &self.info
    }

    /// 音频格式
    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    /// 文件标签
    pub fn tag(&self) -> &ApeTag {
        self.demuxer.tag()
    }

    /// 解压范围的总块数
    pub fn total_blocks(&self) -> u64 {
        self.finish_block - self.start_block
    }

    /// 解压范围内的当前块
    pub fn current_block(&self) -> u64 {
        self.current_block - self.start_block
    }

    /// 是否只解压文件的一部分
    pub fn is_partial(&self) -> bool {
        self.start_block != 0 || self.finish_block != self.info.total_blocks
    }

    /// 已发现的校验失败帧
    pub fn corrupt_frames(&self) -> &[u32] {
        &self.corrupt_frames
    }

    /// 读取最多 `blocks` 块 PCM 到 `buf`, 返回实际读取的块数 (0 表示结束)
    pub fn get_data(&mut self, buf: &mut [u8], blocks: usize) -> TaoResult<usize> {
        let ba = self.format.block_align();
        let wanted = blocks
            .min(buf.len() / ba)
            .min((self.finish_block - self.current_block) as usize);

        let mut done = 0usize;
        while done < wanted {
            let frame = (self.current_block / u64::from(self.info.blocks_per_frame)) as u32;
            self.ensure_frame(frame)?;
            let Some(cache) = &self.cache else {
                return Err(TaoError::Internal("帧缓存为空".into()));
            };

            let offset = (self.current_block - cache.first_block) as usize;
            let available = cache.pcm.len() / ba - offset;
            let n = available.min(wanted - done);
            if n == 0 {
                break;
            }
            buf[done * ba..(done + n) * ba]
                .copy_from_slice(&cache.pcm[offset * ba..(offset + n) * ba]);
            done += n;
            self.current_block += n as u64;
        }
        Ok(done)
    }

    /// 定位到解压范围内的指定块
    pub fn seek(&mut self, block: u64) -> TaoResult<()> {
        if block > self.total_blocks() {
            return Err(TaoError::InvalidArgument(format!(
                "seek 目标 {block} 超出范围 0..={}",
                self.total_blocks()
            )));
        }
        self.current_block = self.start_block + block;
        Ok(())
    }

    /// 查询信息, 字段无效 (如帧号越界) 时返回 `None`
    pub fn get_info(&self, field: ApeInfoField) -> Option<i64> {
        let info = &self.info;
        let header = &info.header;
        let time_base = Rational::new(1, self.format.sample_rate as i32);
        let ms = |blocks: u64| time_base.to_millis(blocks as i64);
        let value = match field {
            ApeInfoField::FileVersion => i64::from(header.version),
            ApeInfoField::CompressionLevel => i64::from(header.level.as_u16()),
            ApeInfoField::FormatFlags => i64::from(header.flags.bits()),
            ApeInfoField::SampleRate => i64::from(self.format.sample_rate),
            ApeInfoField::BitsPerSample => i64::from(self.format.bits_per_sample),
            ApeInfoField::BytesPerSample => self.format.bytes_per_sample() as i64,
            ApeInfoField::Channels => i64::from(self.format.channels),
            ApeInfoField::BlockAlign => self.format.block_align() as i64,
            ApeInfoField::BlocksPerFrame => i64::from(info.blocks_per_frame),
            ApeInfoField::FinalFrameBlocks => i64::from(header.final_frame_blocks),
            ApeInfoField::TotalFrames => i64::from(header.total_frames),
            ApeInfoField::WavHeaderBytes => info.wav_header_bytes() as i64,
            ApeInfoField::WavTerminatingBytes => i64::from(header.terminating_bytes),
            ApeInfoField::WavDataBytes => info.wav_data_bytes() as i64,
            ApeInfoField::WavTotalBytes => info.wav_total_bytes() as i64,
            ApeInfoField::ApeTotalBytes => info.file_size as i64,
            ApeInfoField::TotalBlocks => info.total_blocks as i64,
            ApeInfoField::LengthMs => info.length_ms() as i64,
            ApeInfoField::AverageBitrate => i64::from(info.average_bitrate()),
            ApeInfoField::DecompressedBitrate => i64::from(info.decompressed_bitrate()),
            ApeInfoField::PeakLevel => i64::from(info.peak_level),
            ApeInfoField::SeekByte(frame) => info.seek_byte(frame)? as i64,
            ApeInfoField::FrameBlocks(frame) => i64::from(info.frame_blocks(frame)?),
            ApeInfoField::CurrentBlock => self.current_block() as i64,
            ApeInfoField::CurrentMs => ms(self.current_block()),
            ApeInfoField::DecompressTotalBlocks => self.total_blocks() as i64,
            ApeInfoField::DecompressLengthMs => ms(self.total_blocks()),
            ApeInfoField::CurrentBitrate => {
                let frame = (self.current_block / u64::from(info.blocks_per_frame))
                    .min(u64::from(header.total_frames.saturating_sub(1)))
                    as u32;
                let (start, end) = info.frame_byte_range(frame)?;
                match ms(u64::from(info.frame_blocks(frame)?)) {
                    0 => 0,
                    frame_ms => ((end - start) * 8) as i64 / frame_ms,
                }
            }
        };
        Some(value)
    }

    /// 解压结果的 WAV 头部
    ///
    /// 整个文件且保存了原始头部时原样返回, 否则按解压范围生成标准头部.
    pub fn wav_header(&self) -> Vec<u8> {
        if !self.is_partial() && !self.info.wav_header.is_empty() {
            return self.info.wav_header.clone();
        }
        let data_bytes = self.total_blocks() * self.format.block_align() as u64;
        canonical_header(&self.format, data_bytes)
    }

    /// 读取保存的 WAV 尾部数据, 部分解压时为空
    pub fn wav_terminating_data(&mut self) -> TaoResult<Vec<u8>> {
        let len = self.info.header.terminating_bytes as usize;
        if self.is_partial() || len == 0 {
            return Ok(Vec::new());
        }
        self.io.seek(std::io::SeekFrom::Start(self.info.data_end))?;
        self.io.read_bytes(len)
    }

    /// 确保缓存中是指定帧
    fn ensure_frame(&mut self, frame: u32) -> TaoResult<()> {
        if self.cache.as_ref().is_some_and(|c| c.index == frame) {
            return Ok(());
        }

        let bpf = u64::from(self.info.blocks_per_frame);
        let first_block = self.demuxer.seek(&mut self.io, u64::from(frame) * bpf)?;
        let packet = self.demuxer.read_packet(&mut self.io)?;
        let decoded = self.decode_packet(&packet)?;
        if decoded.corrupt {
            warn!("第 {frame} 帧校验失败, 输出静音");
            if !self.corrupt_frames.contains(&frame) {
                self.corrupt_frames.push(frame);
            }
        }
        self.cache = Some(DecodedFrame {
            index: frame,
            first_block,
            pcm: decoded.data,
        });
        Ok(())
    }

    fn decode_packet(&mut self, packet: &Packet) -> TaoResult<tao_codec::AudioFrame> {
        self.decoder.send_packet(packet)?;
        self.decoder.receive_frame()
    }
}
