//! APE 文件头与文件信息.
//!
//! 3.93 - 3.97 的文件布局:
//! ```text
//! [ID3v2 (可选)]
//! "MAC " version level flags channels sample_rate header_bytes
//!        terminating_bytes total_frames final_frame_blocks      (32 字节)
//! peak_level i32          (HAS_PEAK_LEVEL)
//! seek_elements i32       (HAS_SEEK_ELEMENTS)
//! WAV 头部 header_bytes 字节 (未设置 CREATE_WAV_HEADER 时)
//! 跳转表 seek_elements x u32
//! 帧数据 ...
//! WAV 尾部 terminating_bytes 字节
//! [APE 标签 / ID3v1 (可选)]
//! ```
//! 跳转表中的偏移相对于 "MAC " 所在位置.

use std::io::SeekFrom;

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use tao_codec::ape::{CompressionLevel, WaveFormat, blocks_per_frame, check_version};
use tao_core::{TaoError, TaoResult};

use crate::io::IoContext;
use crate::muxers::wav::CANONICAL_HEADER_SIZE;
use crate::tags::{ApeTag, skip_id3v2};

/// 文件标识
pub const MAC_MAGIC: &[u8; 4] = b"MAC ";
/// 固定文件头长度
pub const APE_HEADER_BYTES: usize = 32;
/// 查找文件标识的最大范围
const MAX_MAGIC_SCAN: u64 = 1024 * 1024;
/// 未声明最大音频字节数时按 2 GiB 预留跳转表
pub const DEFAULT_MAX_AUDIO_BYTES: u64 = 2 * 1024 * 1024 * 1024;

bitflags! {
    /// 文件头格式标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatFlags: u16 {
        /// 8 位采样
        const BITS_8 = 1;
        /// 帧带 CRC
        const CRC = 2;
        /// 文件头后有峰值
        const HAS_PEAK_LEVEL = 4;
        /// 24 位采样
        const BITS_24 = 8;
        /// 文件头后有跳转表长度
        const HAS_SEEK_ELEMENTS = 16;
        /// 未保存 WAV 头, 解压时生成
        const CREATE_WAV_HEADER = 32;
    }
}

impl FormatFlags {
    /// 由位深得到标志位
    pub fn for_bits(bits_per_sample: u16) -> Self {
        match bits_per_sample {
            8 => Self::BITS_8,
            24 => Self::BITS_24,
            _ => Self::empty(),
        }
    }

    /// 由标志位得到位深
    pub fn bits_per_sample(&self) -> u16 {
        if self.contains(Self::BITS_8) {
            8
        } else if self.contains(Self::BITS_24) {
            24
        } else {
            16
        }
    }
}

/// 32 字节固定文件头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApeHeader {
    pub version: u16,
    pub level: CompressionLevel,
    pub flags: FormatFlags,
    pub channels: u16,
    pub sample_rate: u32,
    /// 保存的 WAV 头部字节数
    pub header_bytes: u32,
    /// 保存的 WAV 尾部字节数
    pub terminating_bytes: u32,
    pub total_frames: u32,
    pub final_frame_blocks: u32,
}

impl ApeHeader {
    /// 从 32 字节解析 (含 "MAC " 标识)
    pub fn parse(buf: &[u8]) -> TaoResult<Self> {
        if buf.len() < APE_HEADER_BYTES || &buf[0..4] != MAC_MAGIC {
            return Err(TaoError::Format("缺少 \"MAC \" 文件标识".into()));
        }
        let version = LittleEndian::read_u16(&buf[4..6]);
        check_version(version)?;
        Ok(Self {
            version,
            level: CompressionLevel::from_u16(LittleEndian::read_u16(&buf[6..8]))?,
            flags: FormatFlags::from_bits_retain(LittleEndian::read_u16(&buf[8..10])),
            channels: LittleEndian::read_u16(&buf[10..12]),
            sample_rate: LittleEndian::read_u32(&buf[12..16]),
            header_bytes: LittleEndian::read_u32(&buf[16..20]),
            terminating_bytes: LittleEndian::read_u32(&buf[20..24]),
            total_frames: LittleEndian::read_u32(&buf[24..28]),
            final_frame_blocks: LittleEndian::read_u32(&buf[28..32]),
        })
    }

    /// 序列化为 32 字节
    pub fn to_bytes(&self) -> [u8; APE_HEADER_BYTES] {
        let mut buf = [0u8; APE_HEADER_BYTES];
        buf[0..4].copy_from_slice(MAC_MAGIC);
        LittleEndian::write_u16(&mut buf[4..6], self.version);
        LittleEndian::write_u16(&mut buf[6..8], self.level.as_u16());
        LittleEndian::write_u16(&mut buf[8..10], self.flags.bits());
        LittleEndian::write_u16(&mut buf[10..12], self.channels);
        LittleEndian::write_u32(&mut buf[12..16], self.sample_rate);
        LittleEndian::write_u32(&mut buf[16..20], self.header_bytes);
        LittleEndian::write_u32(&mut buf[20..24], self.terminating_bytes);
        LittleEndian::write_u32(&mut buf[24..28], self.total_frames);
        LittleEndian::write_u32(&mut buf[28..32], self.final_frame_blocks);
        buf
    }

    /// 音频格式
    pub fn wave_format(&self) -> TaoResult<WaveFormat> {
        WaveFormat::new(self.channels, self.flags.bits_per_sample(), self.sample_rate)
    }

    pub fn blocks_per_frame(&self) -> u32 {
        blocks_per_frame(self.version)
    }

    /// 总块数
    pub fn total_blocks(&self) -> u64 {
        match self.total_frames {
            0 => 0,
            n => u64::from(n - 1) * u64::from(self.blocks_per_frame())
                + u64::from(self.final_frame_blocks),
        }
    }

    /// 文件头之后的可选字段长度
    pub fn extension_bytes(&self) -> u64 {
        let mut n = 0;
        if self.flags.contains(FormatFlags::HAS_PEAK_LEVEL) {
            n += 4;
        }
        if self.flags.contains(FormatFlags::HAS_SEEK_ELEMENTS) {
            n += 4;
        }
        n
    }
}

/// 按最大音频字节数计算跳转表需要的帧数
pub fn max_frames_for(format: &WaveFormat, version: u16, max_audio_bytes: Option<u64>) -> u32 {
    let bytes = max_audio_bytes.unwrap_or(DEFAULT_MAX_AUDIO_BYTES);
    let blocks = bytes / format.block_align() as u64;
    blocks
        .div_ceil(u64::from(blocks_per_frame(version)))
        .clamp(1, u64::from(u32::MAX / 4)) as u32
}

/// 打开的 APE 文件的全部信息
#[derive(Debug, Clone)]
pub struct ApeFileInfo {
    pub header: ApeHeader,
    /// 音频格式
    pub format: WaveFormat,
    /// "MAC " 之前的字节数 (ID3v2 等)
    pub junk_bytes: u64,
    /// 峰值, 文件未记录时为 -1
    pub peak_level: i32,
    /// 跳转表长度
    pub seek_elements: u32,
    /// 保存的 WAV 头部
    pub wav_header: Vec<u8>,
    /// 每帧在文件中的起始偏移 (已加上 `junk_bytes`)
    pub seek_table: Vec<u64>,
    pub blocks_per_frame: u32,
    pub total_blocks: u64,
    /// 文件总字节数
    pub file_size: u64,
    /// 文件末尾标签的字节数
    pub tag_bytes: u64,
    /// 帧数据结束位置
    pub data_end: u64,
}

impl ApeFileInfo {
    /// 读取文件头、WAV 头部与跳转表
    pub fn read(io: &mut IoContext) -> TaoResult<Self> {
        let file_size = io
            .size()
            .ok_or_else(|| TaoError::Unsupported("APE 需要可确定大小的输入".into()))?;

        let junk_bytes = find_magic(io)?;
        io.seek(SeekFrom::Start(junk_bytes))?;
        let buf = io.read_bytes(APE_HEADER_BYTES)?;
        let header = ApeHeader::parse(&buf)?;
        if header.total_frames == 0 {
            return Err(TaoError::Format("APE 文件总帧数为 0 (未完成的文件)".into()));
        }
        let format = header.wave_format()?;
        let bpf = header.blocks_per_frame();
        if header.final_frame_blocks == 0 || header.final_frame_blocks > bpf {
            return Err(TaoError::Format(format!(
                "最后一帧块数 {} 无效",
                header.final_frame_blocks
            )));
        }

        let peak_level = if header.flags.contains(FormatFlags::HAS_PEAK_LEVEL) {
            io.read_i32_le()?
        } else {
            -1
        };
        let seek_elements = if header.flags.contains(FormatFlags::HAS_SEEK_ELEMENTS) {
            io.read_u32_le()?
        } else {
            header.total_frames
        };
        if seek_elements < header.total_frames {
            return Err(TaoError::Format(format!(
                "跳转表长度 {} 小于总帧数 {}",
                seek_elements, header.total_frames
            )));
        }

        let wav_header = if header.flags.contains(FormatFlags::CREATE_WAV_HEADER) {
            Vec::new()
        } else {
            io.read_bytes(header.header_bytes as usize)?
        };

        let table_bytes = seek_elements as usize * 4;
        if io.position()? + table_bytes as u64 > file_size {
            return Err(TaoError::Format("跳转表超出文件末尾".into()));
        }
        let raw = io.read_bytes(table_bytes)?;
        let mut seek_table = Vec::new();
        seek_table
            .try_reserve_exact(header.total_frames as usize)
            .map_err(|e| TaoError::OutOfMemory(format!("跳转表分配失败: {e}")))?;
        seek_table.extend(
            raw.chunks_exact(4)
                .take(header.total_frames as usize)
                .map(|c| u64::from(LittleEndian::read_u32(c)) + junk_bytes),
        );

        let tag_bytes = ApeTag::analyze(io)?.tag_bytes();
        let data_end = file_size
            .saturating_sub(tag_bytes)
            .saturating_sub(u64::from(header.terminating_bytes));
        let data_start = io.position()?;
        validate_seek_table(&seek_table, data_start, data_end)?;

        let info = Self {
            total_blocks: header.total_blocks(),
            header,
            format,
            junk_bytes,
            peak_level,
            seek_elements,
            wav_header,
            seek_table,
            blocks_per_frame: bpf,
            file_size,
            tag_bytes,
            data_end,
        };
        debug!(
            "APE 文件: 版本 {}, 级别 {}, {}, 帧数 {}, 总块数 {}",
            info.header.version,
            info.header.level,
            info.format,
            info.header.total_frames,
            info.total_blocks
        );
        Ok(info)
    }

    pub fn total_frames(&self) -> u32 {
        self.header.total_frames
    }

    /// 指定帧的块数
    pub fn frame_blocks(&self, frame: u32) -> Option<u32> {
        let total = self.header.total_frames;
        if frame >= total {
            None
        } else if frame + 1 == total {
            Some(self.header.final_frame_blocks)
        } else {
            Some(self.blocks_per_frame)
        }
    }

    /// 指定帧的起始偏移
    pub fn seek_byte(&self, frame: u32) -> Option<u64> {
        self.seek_table.get(frame as usize).copied()
    }

    /// 指定帧占用的文件字节范围
    pub fn frame_byte_range(&self, frame: u32) -> Option<(u64, u64)> {
        let start = self.seek_byte(frame)?;
        let end = self.seek_byte(frame + 1).unwrap_or(self.data_end);
        Some((start, end.max(start)))
    }

    /// 解压后的 WAV 头部字节数
    pub fn wav_header_bytes(&self) -> u64 {
        if self.header.flags.contains(FormatFlags::CREATE_WAV_HEADER) {
            CANONICAL_HEADER_SIZE as u64
        } else {
            u64::from(self.header.header_bytes)
        }
    }

    /// PCM 数据字节数
    pub fn wav_data_bytes(&self) -> u64 {
        self.total_blocks * self.format.block_align() as u64
    }

    /// 解压后的 WAV 文件总字节数
    pub fn wav_total_bytes(&self) -> u64 {
        self.wav_header_bytes()
            + self.wav_data_bytes()
            + u64::from(self.header.terminating_bytes)
    }

    /// 时长 (毫秒)
    pub fn length_ms(&self) -> u64 {
        self.total_blocks * 1000 / u64::from(self.format.sample_rate)
    }

    /// 平均码率 (kbps)
    pub fn average_bitrate(&self) -> u32 {
        match self.length_ms() {
            0 => 0,
            ms => (self.file_size * 8 / ms) as u32,
        }
    }

    /// 解压后的码率 (kbps)
    pub fn decompressed_bitrate(&self) -> u32 {
        (u64::from(self.format.sample_rate) * self.format.block_align() as u64 * 8 / 1000) as u32
    }
}

/// 找到 "MAC " 标识, 返回其偏移
///
/// 先跳过 ID3v2 标签; 标签声明的长度不可信时回退到从文件开头扫描.
fn find_magic(io: &mut IoContext) -> TaoResult<u64> {
    let skipped = skip_id3v2(io)?;
    if let Some(pos) = scan_magic(io, skipped)? {
        return Ok(pos);
    }
    if skipped > 0 {
        warn!("ID3v2 之后未找到 \"MAC \", 从文件开头重新扫描");
        if let Some(pos) = scan_magic(io, 0)? {
            return Ok(pos);
        }
    }
    Err(TaoError::Format("未找到 \"MAC \" 文件标识".into()))
}

fn scan_magic(io: &mut IoContext, from: u64) -> TaoResult<Option<u64>> {
    io.seek(SeekFrom::Start(from))?;
    let mut buf = vec![0u8; (MAX_MAGIC_SCAN + 3) as usize];
    let n = io.read_up_to(&mut buf)?;
    Ok(buf[..n]
        .windows(4)
        .position(|w| w == MAC_MAGIC)
        .map(|p| from + p as u64))
}

/// 跳转表必须非递减且位于帧数据区内
fn validate_seek_table(table: &[u64], data_start: u64, data_end: u64) -> TaoResult<()> {
    if let Some(&first) = table.first() {
        if first < data_start || first > data_end {
            return Err(TaoError::Format(format!(
                "第一帧偏移 {first} 不在帧数据区 {data_start}..{data_end} 内"
            )));
        }
    }
    if let Some(i) = table.windows(2).position(|w| w[1] < w[0]) {
        return Err(TaoError::Format(format!(
            "跳转表在第 {} 帧处递减",
            i + 1
        )));
    }
    if table.last().is_some_and(|&last| last > data_end) {
        return Err(TaoError::Format("跳转表超出帧数据区".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> ApeHeader {
        ApeHeader {
            version: 3970,
            level: CompressionLevel::High,
            flags: FormatFlags::CRC
                | FormatFlags::HAS_PEAK_LEVEL
                | FormatFlags::HAS_SEEK_ELEMENTS
                | FormatFlags::BITS_24,
            channels: 2,
            sample_rate: 48000,
            header_bytes: 44,
            terminating_bytes: 0,
            total_frames: 3,
            final_frame_blocks: 100,
        }
    }

    #[test]
    fn test_文件头往返() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"MAC ");
        assert_eq!(ApeHeader::parse(&bytes).unwrap(), header);
        assert_eq!(header.flags.bits_per_sample(), 24);
        assert_eq!(header.total_blocks(), 2 * 294_912 + 100);
        assert_eq!(header.extension_bytes(), 8);
    }

    #[test]
    fn test_拒绝不支持的版本() {
        let mut header = sample_header();
        header.version = 3990;
        assert!(matches!(
            ApeHeader::parse(&header.to_bytes()),
            Err(TaoError::Unsupported(_))
        ));
    }

    #[test]
    fn test_跳转表帧数() {
        let fmt = WaveFormat::new(2, 16, 44100).unwrap();
        // 2 GiB / 4 / 294912 = 1820.44 -> 1821
        assert_eq!(max_frames_for(&fmt, 3970, None), 1821);
        assert_eq!(max_frames_for(&fmt, 3970, Some(4 * 294_912)), 1);
        assert_eq!(max_frames_for(&fmt, 3970, Some(4 * 294_912 + 4)), 2);
        assert_eq!(max_frames_for(&fmt, 3970, Some(0)), 1);
    }

    fn minimal_file(junk: &[u8], total_frames: u32, table: &[u32]) -> Vec<u8> {
        let mut header = sample_header();
        header.total_frames = total_frames;
        header.flags |= FormatFlags::CREATE_WAV_HEADER;
        let mut data = junk.to_vec();
        data.extend_from_slice(&header.to_bytes());
        data.extend_from_slice(&1234i32.to_le_bytes());
        data.extend_from_slice(&(table.len() as u32).to_le_bytes());
        for t in table {
            data.extend_from_slice(&t.to_le_bytes());
        }
        data.resize(data.len() + 64, 0);
        data
    }

    #[test]
    fn test_读取文件信息() {
        // 32 + 8 + 3*4 = 52
        let data = minimal_file(&[], 3, &[52, 60, 70]);
        let mut io = IoContext::from_memory(data);
        let info = ApeFileInfo::read(&mut io).unwrap();
        assert_eq!(info.peak_level, 1234);
        assert_eq!(info.seek_table, vec![52, 60, 70]);
        assert_eq!(info.frame_blocks(2), Some(100));
        assert_eq!(info.frame_blocks(3), None);
        assert_eq!(info.frame_byte_range(2), Some((70, 116)));
        assert_eq!(info.wav_header_bytes(), 44);
        assert_eq!(info.wav_data_bytes(), info.total_blocks * 6);
    }

    #[test]
    fn test_跳过前导数据() {
        let mut junk = b"ID3\x04\x00\x00\x00\x00\x00\x02ab".to_vec();
        junk.extend_from_slice(&[0, 0]);
        let data = minimal_file(&junk, 1, &[52]);
        let mut io = IoContext::from_memory(data);
        let info = ApeFileInfo::read(&mut io).unwrap();
        assert_eq!(info.junk_bytes, 14);
        assert_eq!(info.seek_table, vec![66]);
    }

    #[test]
    fn test_拒绝未完成的文件() {
        let data = minimal_file(&[], 0, &[52]);
        let mut io = IoContext::from_memory(data);
        assert!(matches!(
            ApeFileInfo::read(&mut io),
            Err(TaoError::Format(_))
        ));
    }

    #[test]
    fn test_拒绝递减的跳转表() {
        let data = minimal_file(&[], 3, &[52, 80, 60]);
        let mut io = IoContext::from_memory(data);
        assert!(ApeFileInfo::read(&mut io).is_err());
    }

    #[test]
    fn test_缺少标识() {
        let mut io = IoContext::from_memory(vec![0u8; 100]);
        assert!(matches!(
            ApeFileInfo::read(&mut io),
            Err(TaoError::Format(_))
        ));
    }
}
