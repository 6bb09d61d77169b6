//! APE 压缩句柄.
//!
//! 组合 [`ApeEncoder`] 与 [`ApeMuxer`]: 接收交错 PCM (任意字节数),
//! 按帧编码并写入文件, `finish` 时写出尾部数据并回填文件头.

use std::path::Path;

use log::{debug, warn};
use tao_codec::ape::{
    ApeStreamConfig, BLOCKS_PER_DECODE, CURRENT_VERSION, CompressionLevel, WaveFormat,
};
use tao_codec::encoders::ape::ApeEncoder;
use tao_codec::{AudioFrame, CodecId, Encoder};
use tao_core::{TaoError, TaoResult};

use crate::demuxer::Demuxer;
use crate::demuxers::wav::WavDemuxer;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::muxers::ape::ApeMuxer;
use crate::stream::Stream;

/// 压缩选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressOptions {
    /// 压缩级别
    pub level: CompressionLevel,
    /// 最大音频字节数, 决定跳转表大小; `None` 按 2 GiB 预留
    pub max_audio_bytes: Option<u64>,
    /// 原样保存的 WAV 头部; `None` 时解压生成标准头部
    pub wav_header: Option<Vec<u8>>,
    /// 写出的格式版本 (3930 ~ 3970)
    pub format_version: u16,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: CompressionLevel::default(),
            max_audio_bytes: None,
            wav_header: None,
            format_version: CURRENT_VERSION,
        }
    }
}

// ========================
// 输入源
// ========================

/// PCM 输入源
pub trait InputSource {
    /// 音频格式
    fn format(&self) -> WaveFormat;

    /// 总块数
    fn total_blocks(&self) -> u64;

    /// 需要原样保存的头部字节 (可为空)
    fn header_data(&self) -> &[u8];

    /// 读取最多 `blocks` 块并追加到 `buf`, 返回实际读取的块数 (0 表示结束)
    fn read_blocks(&mut self, buf: &mut Vec<u8>, blocks: usize) -> TaoResult<usize>;

    /// 音频数据之后需要原样保存的字节
    fn terminating_data(&mut self) -> TaoResult<Vec<u8>>;
}

/// WAV 文件输入源
pub struct WavInputSource {
    io: IoContext,
    demuxer: WavDemuxer,
    format: WaveFormat,
    /// 上一个数据包中未取走的字节
    leftover: Vec<u8>,
}

impl WavInputSource {
    /// 打开 WAV 文件
    pub fn open(path: impl AsRef<Path>) -> TaoResult<Self> {
        Self::from_io(IoContext::open_read(path)?)
    }

    /// 从字节流打开
    pub fn from_io(mut io: IoContext) -> TaoResult<Self> {
        let mut demuxer = WavDemuxer::new();
        demuxer.open(&mut io)?;
        let format = demuxer
            .wave_format()
            .ok_or_else(|| TaoError::Internal("WAV 打开后缺少音频格式".into()))?;
        Ok(Self {
            io,
            demuxer,
            format,
            leftover: Vec::new(),
        })
    }
}

impl InputSource for WavInputSource {
    fn format(&self) -> WaveFormat {
        self.format
    }

    fn total_blocks(&self) -> u64 {
        self.demuxer.total_blocks()
    }

    fn header_data(&self) -> &[u8] {
        self.demuxer.header_bytes()
    }

    fn read_blocks(&mut self, buf: &mut Vec<u8>, blocks: usize) -> TaoResult<usize> {
        let ba = self.format.block_align();
        let wanted = blocks * ba;
        while self.leftover.len() < wanted {
            match self.demuxer.read_packet(&mut self.io) {
                Ok(pkt) => self.leftover.extend_from_slice(&pkt.data),
                Err(e) if e.is_eof() => break,
                Err(e) => return Err(e),
            }
        }
        let n = self.leftover.len().min(wanted) / ba * ba;
        buf.extend_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n / ba)
    }

    fn terminating_data(&mut self) -> TaoResult<Vec<u8>> {
        self.demuxer.read_terminating_bytes(&mut self.io)
    }
}

// ========================
// 压缩句柄
// ========================

/// APE 压缩句柄
pub struct ApeCompress {
    io: IoContext,
    encoder: ApeEncoder,
    muxer: ApeMuxer,
    format: WaveFormat,
    /// 不足一个块的输入字节
    partial: Vec<u8>,
    /// 已送入编码器的块数
    blocks_added: u64,
    finished: bool,
}

impl ApeCompress {
    /// 创建输出文件并开始压缩, 开始失败时删除已创建的文件
    pub fn create(
        path: impl AsRef<Path>,
        format: WaveFormat,
        options: CompressOptions,
    ) -> TaoResult<Self> {
        let path = path.as_ref();
        Self::start(IoContext::open_write(path)?, format, options).inspect_err(|_| {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("删除输出文件 {} 失败: {e}", path.display());
            }
        })
    }

    /// 在字节流上开始压缩, 写入占位文件头
    pub fn start(
        mut io: IoContext,
        format: WaveFormat,
        options: CompressOptions,
    ) -> TaoResult<Self> {
        format.validate()?;
        let mut encoder = ApeEncoder::new();
        encoder.open_with(format, options.format_version, options.level)?;

        let mut stream = Stream::new_audio(CodecId::Ape, format);
        stream.frame_size = encoder.blocks_per_frame().unwrap_or(0);
        stream.extra_data = ApeStreamConfig {
            version: options.format_version,
            level: options.level,
            format_flags: 0,
        }
        .to_extra_data();

        let mut muxer = ApeMuxer::new();
        muxer.set_max_audio_bytes(options.max_audio_bytes);
        muxer.set_wav_header(options.wav_header);
        muxer.write_header(&mut io, &[stream])?;

        debug!(
            "开始 APE 压缩: {}, 版本 {}, 级别 {}",
            format, options.format_version, options.level
        );
        Ok(Self {
            io,
            encoder,
            muxer,
            format,
            partial: Vec::new(),
            blocks_added: 0,
            finished: false,
        })
    }

    /// 音频格式
    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    /// 已接收的块数
    pub fn blocks_added(&self) -> u64 {
        self.blocks_added
    }

    /// 追加交错 PCM, 不要求按块对齐
    pub fn add_data(&mut self, data: &[u8]) -> TaoResult<()> {
        if self.finished {
            return Err(TaoError::InvalidArgument("压缩已结束".into()));
        }
        let ba = self.format.block_align();
        self.partial.extend_from_slice(data);
        let whole = self.partial.len() / ba * ba;
        if whole == 0 {
            return Ok(());
        }

        let blocks = whole / ba;
        let frame = AudioFrame::new(self.format, self.partial.drain(..whole).collect());
        self.encoder.send_frame(Some(&frame))?;
        self.blocks_added += blocks as u64;
        self.drain_packets()
    }

    /// 从输入源读取最多 `max_blocks` 块并压缩, 返回实际处理的块数
    pub fn add_data_from_input_source(
        &mut self,
        source: &mut dyn InputSource,
        max_blocks: usize,
    ) -> TaoResult<usize> {
        if source.format() != self.format {
            return Err(TaoError::InvalidArgument(format!(
                "输入源格式 {} 与压缩格式 {} 不一致",
                source.format(),
                self.format
            )));
        }
        let ba = self.format.block_align();
        let mut buf = Vec::with_capacity(max_blocks.min(BLOCKS_PER_DECODE) * ba);
        let blocks = source.read_blocks(&mut buf, max_blocks)?;
        if blocks > 0 {
            self.add_data(&buf)?;
        }
        Ok(blocks)
    }

    /// 结束压缩: 编码剩余数据, 写出尾部数据, 回填文件头与跳转表
    ///
    /// `terminating` 写在帧数据之后, 其中前 `wav_terminating_bytes` 字节属于 WAV 文件.
    pub fn finish(&mut self, terminating: &[u8], wav_terminating_bytes: u32) -> TaoResult<()> {
        if self.finished {
            return Ok(());
        }
        if !self.partial.is_empty() {
            return Err(TaoError::InvalidData(format!(
                "输入末尾有 {} 字节不足一个块",
                self.partial.len()
            )));
        }
        self.encoder.send_frame(None)?;
        self.drain_packets()?;

        self.muxer.set_peak_level(self.encoder.peak_level());
        self.muxer
            .set_terminating_data(terminating.to_vec(), wav_terminating_bytes);
        self.muxer.write_trailer(&mut self.io)?;
        self.finished = true;

        debug!(
            "APE 压缩完成: {} 块, {} 帧",
            self.blocks_added,
            self.muxer.frames_written()
        );
        Ok(())
    }

    /// 取回输出字节流
    pub fn into_io(self) -> IoContext {
        self.io
    }

    /// 把编码器输出的数据包全部交给封装器
    fn drain_packets(&mut self) -> TaoResult<()> {
        loop {
            match self.encoder.receive_packet() {
                Ok(pkt) => self.muxer.write_packet(&mut self.io, &pkt)?,
                Err(TaoError::NeedMoreData) | Err(TaoError::Eof) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}
