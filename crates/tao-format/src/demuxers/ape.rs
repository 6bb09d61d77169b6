//! APE (Monkey's Audio) 解封装器.
//!
//! 每个帧输出一个数据包. 文件中的帧数据是小端 32 位字序列,
//! 读取时按字翻转为编解码器使用的高位在前字节流; 字对齐以第一帧的偏移为基准.

use std::io::SeekFrom;

use log::debug;
use tao_codec::ape::ApeStreamConfig;
use tao_codec::{CodecId, Packet};
use tao_core::{TaoError, TaoResult};

use crate::ape::header::{ApeFileInfo, MAC_MAGIC};
use crate::ape::swap_word_bytes;
use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_LIKELY, SCORE_MAX};
use crate::stream::Stream;
use crate::tags::ApeTag;
use crate::tags::id3v2::parse_id3v2_size;

/// APE 解封装器
pub struct ApeDemuxer {
    /// 文件信息
    info: Option<ApeFileInfo>,
    /// 文件标签
    tag: ApeTag,
    /// 流信息
    streams: Vec<Stream>,
    /// 下一个要读取的帧
    next_frame: u32,
    /// 元数据
    metadata: Vec<(String, String)>,
}

impl ApeDemuxer {
    /// 创建 APE 解封装器实例 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建未打开的解封装器
    pub fn new() -> Self {
        Self {
            info: None,
            tag: ApeTag::new(),
            streams: Vec::new(),
            next_frame: 0,
            metadata: Vec::new(),
        }
    }

    /// 文件信息 (open 之后可用)
    pub fn info(&self) -> Option<&ApeFileInfo> {
        self.info.as_ref()
    }

    /// 文件标签
    pub fn tag(&self) -> &ApeTag {
        &self.tag
    }

    /// 下一个要读取的帧
    pub fn next_frame(&self) -> u32 {
        self.next_frame
    }

    /// 读取指定帧的编解码数据 (高位在前)
    pub fn read_frame_data(&self, io: &mut IoContext, frame: u32) -> TaoResult<Vec<u8>> {
        let info = self
            .info
            .as_ref()
            .ok_or_else(|| TaoError::Format("APE 解封装器未打开".into()))?;
        let (start, end) = info
            .frame_byte_range(frame)
            .ok_or_else(|| TaoError::InvalidArgument(format!("帧号 {frame} 超出范围")))?;
        let base = info.seek_table[0];

        let skip = ((start - base) % 4) as usize;
        let aligned_start = start - skip as u64;
        let aligned_len = ((end - aligned_start) as usize).div_ceil(4) * 4;

        io.seek(SeekFrom::Start(aligned_start))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(aligned_len)
            .map_err(|e| TaoError::OutOfMemory(format!("帧缓冲分配失败: {e}")))?;
        buf.resize(aligned_len, 0);
        // 文件末尾不足一个字时以 0 补齐
        io.read_up_to(&mut buf)?;
        swap_word_bytes(&mut buf);

        buf.truncate(skip + (end - start) as usize);
        buf.drain(..skip);
        Ok(buf)
    }
}

impl Default for ApeDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for ApeDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Ape
    }

    fn name(&self) -> &str {
        "ape"
    }

    fn open(&mut self, io: &mut IoContext) -> TaoResult<()> {
        let info = ApeFileInfo::read(io)?;
        self.tag = ApeTag::analyze(io)?;
        self.metadata = self
            .tag
            .fields()
            .iter()
            .filter_map(|f| f.as_text().map(|v| (f.name().to_string(), v)))
            .collect();

        let config = ApeStreamConfig {
            version: info.header.version,
            level: info.header.level,
            format_flags: info.header.flags.bits(),
        };
        let length_ms = info.length_ms();
        let mut stream = Stream::new_audio(CodecId::Ape, info.format);
        stream.duration = info.total_blocks as i64;
        stream.nb_frames = u64::from(info.total_frames());
        stream.frame_size = info.blocks_per_frame;
        stream.extra_data = config.to_extra_data();
        if length_ms > 0 {
            stream.bit_rate = info.file_size * 8000 / length_ms;
        }
        self.streams = vec![stream];

        debug!(
            "APE 打开完成: {} 帧, {} 块, 标签 {} 字节",
            info.total_frames(),
            info.total_blocks,
            info.tag_bytes
        );
        self.info = Some(info);
        self.next_frame = 0;
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> TaoResult<Packet> {
        let (blocks, pos, sample_rate, bpf) = {
            let info = self
                .info
                .as_ref()
                .ok_or_else(|| TaoError::Format("APE 解封装器未打开".into()))?;
            let Some(blocks) = info.frame_blocks(self.next_frame) else {
                return Err(TaoError::Eof);
            };
            (
                blocks,
                info.seek_table[self.next_frame as usize],
                info.format.sample_rate,
                info.blocks_per_frame,
            )
        };

        let frame = self.next_frame;
        let data = self.read_frame_data(io, frame)?;
        let mut pkt = Packet::audio(data, u64::from(frame) * u64::from(bpf), blocks, sample_rate);
        pkt.pos = pos as i64;

        self.next_frame += 1;
        Ok(pkt)
    }

    fn seek(&mut self, _io: &mut IoContext, block: u64) -> TaoResult<u64> {
        let info = self
            .info
            .as_ref()
            .ok_or_else(|| TaoError::Format("APE 解封装器未打开".into()))?;
        if block > info.total_blocks {
            return Err(TaoError::InvalidArgument(format!(
                "seek 目标 {block} 超出范围 0..={}",
                info.total_blocks
            )));
        }
        let bpf = u64::from(info.blocks_per_frame);
        let frame = ((block / bpf) as u32).min(info.total_frames());
        self.next_frame = frame;
        debug!("APE seek: 目标块={block}, 帧={frame}");
        Ok(u64::from(frame) * bpf)
    }

    fn duration(&self) -> Option<f64> {
        self.info
            .as_ref()
            .map(|i| i.total_blocks as f64 / f64::from(i.format.sample_rate))
    }

    fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }
}

/// APE 格式探测器
pub struct ApeProbe;

impl FormatProbe for ApeProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 4 && &data[0..4] == MAC_MAGIC {
            return Some(SCORE_MAX);
        }
        if let Some(size) = parse_id3v2_size(data) {
            let rest = data.get(size as usize..).unwrap_or(&[]);
            let start = rest.iter().position(|&b| b != 0).unwrap_or(rest.len());
            if rest[start..].starts_with(MAC_MAGIC) {
                return Some(SCORE_LIKELY);
            }
        }

        filename
            .filter(|name| FormatId::Ape.matches_filename(name))
            .map(|_| SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Ape
    }
}
