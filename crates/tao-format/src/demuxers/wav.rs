//! WAV (RIFF WAVE) 解封装器.
//!
//! 支持 8/16/24 位整数 PCM WAV 文件的读取, 并保留 data 块之前的原始头部字节
//! 与 data 块之后的尾部字节, 供 APE 压缩时原样存储.
//!
//! WAV 文件结构:
//! ```text
//! RIFF header:  "RIFF" + file_size-8 + "WAVE"
//! fmt  chunk:   "fmt " + chunk_size + audio_format + channels + sample_rate
//!              + byte_rate + block_align + bits_per_sample
//! data chunk:   "data" + data_size + PCM samples...
//! ```

use log::{debug, warn};
use tao_codec::CodecId;
use tao_codec::ape::{BLOCKS_PER_DECODE, WaveFormat};
use tao_core::{TaoError, TaoResult};

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_MAX};
use crate::stream::Stream;

/// WAV 音频格式码: PCM 整数
pub(crate) const WAV_FORMAT_PCM: u16 = 0x0001;
/// WAV 音频格式码: 扩展格式
const WAV_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// WAV 解封装器
pub struct WavDemuxer {
    /// 流信息
    streams: Vec<Stream>,
    /// 音频格式
    format: Option<WaveFormat>,
    /// data 块之前的全部原始字节
    header: Vec<u8>,
    /// data 块在文件中的起始偏移
    data_offset: u64,
    /// data 块的大小 (字节)
    data_size: u64,
    /// 当前读取位置 (相对于 data 块起始)
    data_pos: u64,
    /// 每次读取的数据包大小 (字节)
    packet_size: usize,
    /// 元数据
    metadata: Vec<(String, String)>,
}

impl WavDemuxer {
    /// 创建 WAV 解封装器实例 (工厂函数)
    pub fn create() -> TaoResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建未打开的解封装器
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            format: None,
            header: Vec::new(),
            data_offset: 0,
            data_size: 0,
            data_pos: 0,
            packet_size: 0,
            metadata: Vec::new(),
        }
    }

    /// 音频格式
    pub fn wave_format(&self) -> Option<WaveFormat> {
        self.format
    }

    /// data 块之前的原始头部字节
    pub fn header_bytes(&self) -> &[u8] {
        &self.header
    }

    /// data 块的大小 (字节)
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// 总块数
    pub fn total_blocks(&self) -> u64 {
        self.format
            .map_or(0, |f| self.data_size / f.block_align() as u64)
    }

    /// 读取 data 块之后的全部字节, 读取位置随之改变
    pub fn read_terminating_bytes(&mut self, io: &mut IoContext) -> TaoResult<Vec<u8>> {
        let end = self.data_offset + self.data_size;
        let size = io.size().unwrap_or(end);
        if size <= end {
            return Ok(Vec::new());
        }
        io.seek(std::io::SeekFrom::Start(end))?;
        let bytes = io.read_bytes((size - end) as usize)?;
        io.seek(std::io::SeekFrom::Start(self.data_offset + self.data_pos))?;
        Ok(bytes)
    }

    /// 解析 fmt 块
    fn parse_fmt(io: &mut IoContext, chunk_size: u64) -> TaoResult<WaveFormat> {
        if chunk_size < 16 {
            return Err(TaoError::InvalidData("fmt 块大小不足 16 字节".into()));
        }
        let mut audio_format = io.read_u16_le()?;
        let channels = io.read_u16_le()?;
        let sample_rate = io.read_u32_le()?;
        let _byte_rate = io.read_u32_le()?;
        let block_align = io.read_u16_le()?;
        let bits_per_sample = io.read_u16_le()?;
        let mut consumed = 16u64;

        // 扩展格式: cbSize + validBits + channelMask + SubFormat GUID
        if audio_format == WAV_FORMAT_EXTENSIBLE && chunk_size >= 40 {
            let mut ext = [0u8; 10];
            io.read_exact(&mut ext)?;
            audio_format = io.read_u16_le()?;
            consumed += 12;
        }
        if chunk_size > consumed {
            io.skip((chunk_size - consumed) as usize)?;
        }

        debug!(
            "fmt: format={}, channels={}, rate={}, block_align={}, bits={}",
            audio_format, channels, sample_rate, block_align, bits_per_sample,
        );

        if audio_format != WAV_FORMAT_PCM {
            return Err(TaoError::Unsupported(format!(
                "不支持的 WAV 格式码: 0x{audio_format:04X}"
            )));
        }
        let format = WaveFormat::new(channels, bits_per_sample, sample_rate)?;
        if usize::from(block_align) != format.block_align() {
            warn!(
                "fmt 块 block_align={} 与计算值 {} 不一致, 以计算值为准",
                block_align,
                format.block_align()
            );
        }
        Ok(format)
    }
}

impl Default for WavDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for WavDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Wav
    }

    fn name(&self) -> &str {
        "wav"
    }

    fn open(&mut self, io: &mut IoContext) -> TaoResult<()> {
        let start = io.position()?;
        let riff_tag = io.read_tag()?;
        if &riff_tag != b"RIFF" {
            return Err(TaoError::InvalidData("不是有效的 RIFF 文件".into()));
        }
        let _file_size = io.read_u32_le()?;
        let wave_tag = io.read_tag()?;
        if &wave_tag != b"WAVE" {
            return Err(TaoError::InvalidData("不是有效的 WAVE 文件".into()));
        }

        debug!("检测到 RIFF/WAVE 文件");

        let mut format = None;
        let mut data_found = false;
        while !data_found {
            let chunk_id = match io.read_tag() {
                Ok(tag) => tag,
                Err(e) if e.is_eof() => break,
                Err(e) => return Err(e),
            };
            let chunk_size = u64::from(io.read_u32_le()?);

            match &chunk_id {
                b"fmt " => format = Some(Self::parse_fmt(io, chunk_size)?),
                b"data" => {
                    if format.is_none() {
                        return Err(TaoError::InvalidData("data 块出现在 fmt 块之前".into()));
                    }
                    self.data_offset = io.position()?;
                    self.data_size = chunk_size;
                    data_found = true;
                }
                _ => {
                    debug!(
                        "跳过块: '{}', 大小={}",
                        String::from_utf8_lossy(&chunk_id),
                        chunk_size
                    );
                    io.skip(chunk_size as usize)?;
                }
            }

            // WAV 块要求偶数对齐, data 块之后的填充属于尾部数据
            if !data_found && chunk_size % 2 != 0 {
                io.skip(1)?;
            }
        }

        let format = format.ok_or_else(|| TaoError::InvalidData("未找到 fmt 块".into()))?;
        if !data_found {
            return Err(TaoError::InvalidData("未找到 data 块".into()));
        }

        // 流式写出的 WAV 常把 data 大小填成 0 或 0xFFFFFFFF
        if let Some(size) = io.size() {
            let available = size.saturating_sub(self.data_offset);
            if self.data_size > available || self.data_size == 0 {
                warn!(
                    "data 块声明 {} 字节, 文件仅剩 {} 字节, 按实际长度读取",
                    self.data_size, available
                );
                self.data_size = available;
            }
        }
        let ba = format.block_align() as u64;
        if self.data_size % ba != 0 {
            warn!("data 块大小 {} 不是块大小 {} 的整数倍", self.data_size, ba);
            self.data_size -= self.data_size % ba;
        }

        // 保存原始头部字节
        io.seek(std::io::SeekFrom::Start(start))?;
        self.header = io.read_bytes((self.data_offset - start) as usize)?;

        let total_blocks = self.data_size / ba;
        let codec_id =
            CodecId::pcm_from_bits(u32::from(format.bits_per_sample)).unwrap_or(CodecId::None);
        let mut stream = Stream::new_audio(codec_id, format);
        stream.duration = total_blocks as i64;
        stream.nb_frames = total_blocks;
        stream.bit_rate = u64::from(format.sample_rate) * ba * 8;
        self.streams = vec![stream];
        self.format = Some(format);
        self.data_pos = 0;
        self.packet_size = format.block_align() * BLOCKS_PER_DECODE;

        debug!("WAV 打开完成: {}, 总块数={}", format, total_blocks);
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> TaoResult<tao_codec::Packet> {
        let format = self
            .format
            .ok_or_else(|| TaoError::Format("WAV 解封装器未打开".into()))?;
        if self.data_pos >= self.data_size {
            return Err(TaoError::Eof);
        }

        let ba = format.block_align() as u64;
        let remaining = (self.data_size - self.data_pos) as usize;
        let read_size = self.packet_size.min(remaining);
        let data = io.read_bytes(read_size)?;

        let mut pkt = tao_codec::Packet::audio(
            data,
            self.data_pos / ba,
            (read_size as u64 / ba) as u32,
            format.sample_rate,
        );
        pkt.pos = (self.data_offset + self.data_pos) as i64;

        self.data_pos += read_size as u64;
        Ok(pkt)
    }

    fn seek(&mut self, io: &mut IoContext, block: u64) -> TaoResult<u64> {
        let format = self
            .format
            .ok_or_else(|| TaoError::Format("WAV 解封装器未打开".into()))?;
        // PCM 每个块都是边界, 直接换算
        let ba = format.block_align() as u64;
        let offset = block.saturating_mul(ba).min(self.data_size / ba * ba);
        io.seek(std::io::SeekFrom::Start(self.data_offset + offset))?;
        self.data_pos = offset;

        debug!("WAV seek: 目标块={block}, 字节偏移={offset}");
        Ok(offset / ba)
    }

    fn duration(&self) -> Option<f64> {
        self.format
            .map(|f| self.total_blocks() as f64 / f64::from(f.sample_rate))
    }

    fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }
}

/// WAV 格式探测器
pub struct WavProbe;

impl FormatProbe for WavProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            return Some(SCORE_MAX);
        }

        filename
            .filter(|name| FormatId::Wav.matches_filename(name))
            .map(|_| SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Wav
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muxers::wav::canonical_header;

    fn make_wav(format: &WaveFormat, pcm: &[u8], trailer: &[u8]) -> Vec<u8> {
        let mut buf = canonical_header(format, pcm.len() as u64);
        buf.extend_from_slice(pcm);
        buf.extend_from_slice(trailer);
        buf
    }

    #[test]
    fn test_探测_wav() {
        let fmt = WaveFormat::new(1, 16, 44100).unwrap();
        let wav = make_wav(&fmt, &[0; 4], &[]);
        assert_eq!(WavProbe.probe(&wav, None), Some(SCORE_MAX));
        assert_eq!(WavProbe.probe(&[], Some("test.wav")), Some(SCORE_EXTENSION));
        assert_eq!(WavProbe.probe(&[], Some("test.ape")), None);
    }

    #[test]
    fn test_解封装_头部与尾部字节() {
        let fmt = WaveFormat::new(2, 24, 48000).unwrap();
        let pcm: Vec<u8> = (0..60u8).collect();
        let trailer = b"LIST\x04\x00\x00\x00abcd".to_vec();
        let wav = make_wav(&fmt, &pcm, &trailer);

        let mut io = IoContext::from_memory(wav.clone());
        let mut demuxer = WavDemuxer::new();
        demuxer.open(&mut io).unwrap();

        assert_eq!(demuxer.wave_format(), Some(fmt));
        assert_eq!(demuxer.header_bytes(), &wav[..44]);
        assert_eq!(demuxer.total_blocks(), 10);
        assert_eq!(demuxer.streams()[0].codec_id, CodecId::PcmS24le);

        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(&pkt.data[..], &pcm[..]);
        assert_eq!(pkt.duration, 10);
        assert!(matches!(demuxer.read_packet(&mut io), Err(TaoError::Eof)));
        assert_eq!(demuxer.read_terminating_bytes(&mut io).unwrap(), trailer);
    }

    #[test]
    fn test_解封装_跳过未知块() {
        let fmt = WaveFormat::new(1, 8, 8000).unwrap();
        let full = make_wav(&fmt, &[1, 2, 3], &[]);
        // 在 fmt 与 data 之间插入一个奇数长度块
        let mut wav = full[..36].to_vec();
        wav.extend_from_slice(b"junk\x03\x00\x00\x00xyz\x00");
        wav.extend_from_slice(&full[36..]);

        let mut io = IoContext::from_memory(wav);
        let mut demuxer = WavDemuxer::new();
        demuxer.open(&mut io).unwrap();
        assert_eq!(demuxer.header_bytes().len(), 56);
        assert_eq!(&demuxer.read_packet(&mut io).unwrap().data[..], &[1, 2, 3]);
    }

    #[test]
    fn test_解封装_seek_与时长() {
        let fmt = WaveFormat::new(1, 16, 44100).unwrap();
        let pcm: Vec<u8> = (0..44100u32).flat_map(|i| (i as i16).to_le_bytes()).collect();
        let mut io = IoContext::from_memory(make_wav(&fmt, &pcm, &[]));
        let mut demuxer = WavDemuxer::new();
        demuxer.open(&mut io).unwrap();
        assert!((demuxer.duration().unwrap() - 1.0).abs() < 1e-9);

        assert_eq!(demuxer.seek(&mut io, 1000).unwrap(), 1000);
        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt.pts, 1000);
        assert_eq!(&pkt.data[..2], &1000i16.to_le_bytes());
    }

    #[test]
    fn test_非_riff_文件报错() {
        let mut io = IoContext::from_memory(b"NOT_RIFF_DATA_HERE".to_vec());
        let err = WavDemuxer::new().open(&mut io).unwrap_err();
        assert!(matches!(err, TaoError::InvalidData(_)));
    }

    #[test]
    fn test_浮点格式不支持() {
        let fmt = WaveFormat::new(1, 16, 8000).unwrap();
        let mut wav = make_wav(&fmt, &[0; 4], &[]);
        wav[20] = 3;
        let mut io = IoContext::from_memory(wav);
        assert!(matches!(
            WavDemuxer::new().open(&mut io),
            Err(TaoError::Unsupported(_))
        ));
    }
}
