//! 文件级压缩、解压、校验与转换.
//!
//! 每处理 [`BLOCKS_PER_DECODE`] 块报告一次进度, 并检查终止标志:
//! 暂停时在块之间等待, 停止时删除未完成的输出文件并返回 [`ProcessOutcome::Stopped`].
//! 处理出错时同样删除未完成的输出文件.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tao_codec::ape::BLOCKS_PER_DECODE;
use tao_codec::{CodecId, Packet};
use tao_core::{TaoError, TaoResult};

use super::compress::{ApeCompress, CompressOptions, InputSource, WavInputSource};
use super::decompress::ApeDecompress;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::muxers::wav::WavMuxer;
use crate::stream::Stream;
use crate::tags::ApeTag;

/// 暂停时的轮询间隔
const PAUSE_POLL: Duration = Duration::from_millis(50);

// ========================
// 终止标志与进度
// ========================

/// 终止标志的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KillState {
    Continue = 0,
    Pause = 1,
    Stop = 2,
}

/// 可跨线程共享的终止标志
#[derive(Debug, Clone, Default)]
pub struct KillFlag(Arc<AtomicU8>);

impl KillFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: KillState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub fn state(&self) -> KillState {
        match self.0.load(Ordering::SeqCst) {
            1 => KillState::Pause,
            2 => KillState::Stop,
            _ => KillState::Continue,
        }
    }
}

/// 处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// 全部处理完成
    Completed {
        /// 处理的块数
        blocks: u64,
        /// 校验失败的帧 (以静音代替)
        corrupt_frames: Vec<u32>,
    },
    /// 被终止标志停止
    Stopped,
}

impl ProcessOutcome {
    /// 完成且没有损坏的帧
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Completed { corrupt_frames, .. } if corrupt_frames.is_empty())
    }
}

/// 进度回调, 参数为 0 ~ 100 的百分比
pub type ProgressCallback<'a> = Box<dyn FnMut(u32) + 'a>;

/// 进度回调与终止标志
#[derive(Default)]
pub struct ProcessControl<'a> {
    progress: Option<ProgressCallback<'a>>,
    kill: KillFlag,
}

impl<'a> ProcessControl<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置进度回调
    pub fn with_progress(mut self, callback: impl FnMut(u32) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// 设置终止标志
    pub fn with_kill_flag(mut self, kill: KillFlag) -> Self {
        self.kill = kill;
        self
    }

    fn report(&mut self, done: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (done.min(total) * 100 / total) as u32
        };
        if let Some(cb) = self.progress.as_mut() {
            cb(percent);
        }
    }

    /// 检查终止标志, 暂停时阻塞; 返回是否应停止
    fn should_stop(&self) -> bool {
        loop {
            match self.kill.state() {
                KillState::Continue => return false,
                KillState::Stop => return true,
                KillState::Pause => std::thread::sleep(PAUSE_POLL),
            }
        }
    }
}

/// 删除未完成的输出文件
fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("删除未完成的输出文件 {} 失败: {e}", path.display());
    }
}

/// 出错或停止时删除输出文件
fn cleanup_on_failure(
    output: &Path,
    result: TaoResult<ProcessOutcome>,
) -> TaoResult<ProcessOutcome> {
    match &result {
        Ok(ProcessOutcome::Stopped) | Err(_) => remove_partial(output),
        Ok(ProcessOutcome::Completed { .. }) => {}
    }
    result
}

// ========================
// 压缩
// ========================

/// 把 WAV 文件压缩为 APE 文件
///
/// WAV 头部与 data 块之后的字节原样保存, 解压后得到完全相同的文件.
pub fn compress_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: CompressOptions,
    ctl: &mut ProcessControl<'_>,
) -> TaoResult<ProcessOutcome> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut source = WavInputSource::open(input)?;
    info!("压缩 {} -> {}", input.display(), output.display());

    let format = source.format();
    let options = CompressOptions {
        max_audio_bytes: Some(source.total_blocks() * format.block_align() as u64),
        wav_header: Some(source.header_data().to_vec()),
        ..options
    };
    let compress = ApeCompress::create(output, format, options)?;
    cleanup_on_failure(output, compress_source(compress, &mut source, ctl))
}

fn compress_source(
    mut compress: ApeCompress,
    source: &mut dyn InputSource,
    ctl: &mut ProcessControl<'_>,
) -> TaoResult<ProcessOutcome> {
    let total = source.total_blocks();
    let mut done = 0u64;
    loop {
        if ctl.should_stop() {
            debug!("压缩在第 {done} 块处停止");
            return Ok(ProcessOutcome::Stopped);
        }
        let n = compress.add_data_from_input_source(source, BLOCKS_PER_DECODE)?;
        if n == 0 {
            break;
        }
        done += n as u64;
        ctl.report(done, total);
    }

    let terminating = source.terminating_data()?;
    compress.finish(&terminating, terminating.len() as u32)?;
    ctl.report(total, total);
    Ok(ProcessOutcome::Completed {
        blocks: done,
        corrupt_frames: Vec::new(),
    })
}

// ========================
// 解压 / 校验
// ========================

/// 把 APE 文件 (或 .apl 链接文件) 解压为 WAV 文件
pub fn decompress_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    ctl: &mut ProcessControl<'_>,
) -> TaoResult<ProcessOutcome> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut decompress = ApeDecompress::open(input)?;
    info!("解压 {} -> {}", input.display(), output.display());

    let format = *decompress.format();
    let codec_id = CodecId::pcm_from_bits(u32::from(format.bits_per_sample))
        .ok_or_else(|| TaoError::Unsupported(format!("无法输出 {format}")))?;
    let mut stream = Stream::new_audio(codec_id, format);
    stream.duration = decompress.total_blocks() as i64;

    let mut muxer = WavMuxer::new();
    muxer.set_raw_header(decompress.wav_header());
    muxer.set_terminating_data(decompress.wav_terminating_data()?);

    let mut io = IoContext::open_write(output)?;
    let result = (|| {
        muxer.write_header(&mut io, &[stream])?;
        let outcome = decode_all(&mut decompress, ctl, |pcm| {
            muxer.write_packet(&mut io, &Packet::from_data(pcm.to_vec()))
        })?;
        if matches!(outcome, ProcessOutcome::Completed { .. }) {
            muxer.write_trailer(&mut io)?;
            io.flush()?;
        }
        Ok(outcome)
    })();
    drop(io);
    cleanup_on_failure(output, result)
}

/// 解码整个 APE 文件并检查每帧 CRC, 不产生输出
pub fn verify_file(
    input: impl AsRef<Path>,
    ctl: &mut ProcessControl<'_>,
) -> TaoResult<ProcessOutcome> {
    let input = input.as_ref();
    let mut decompress = ApeDecompress::open(input)?;
    info!("校验 {}", input.display());
    decode_all(&mut decompress, ctl, |_| Ok(()))
}

/// 按块解码全部数据, 每块交给 `sink`
fn decode_all(
    decompress: &mut ApeDecompress,
    ctl: &mut ProcessControl<'_>,
    mut sink: impl FnMut(&[u8]) -> TaoResult<()>,
) -> TaoResult<ProcessOutcome> {
    let ba = decompress.format().block_align();
    let total = decompress.total_blocks();
    let mut buf = vec![0u8; BLOCKS_PER_DECODE * ba];
    let mut done = 0u64;
    loop {
        if ctl.should_stop() {
            debug!("解码在第 {done} 块处停止");
            return Ok(ProcessOutcome::Stopped);
        }
        let n = decompress.get_data(&mut buf, BLOCKS_PER_DECODE)?;
        if n == 0 {
            break;
        }
        sink(&buf[..n * ba])?;
        done += n as u64;
        ctl.report(done, total);
    }
    if done == 0 {
        ctl.report(0, 0);
    }

    let corrupt_frames = decompress.corrupt_frames().to_vec();
    if !corrupt_frames.is_empty() {
        warn!("{} 个帧校验失败: {:?}", corrupt_frames.len(), corrupt_frames);
    }
    Ok(ProcessOutcome::Completed {
        blocks: done,
        corrupt_frames,
    })
}

// ========================
// 转换
// ========================

/// 以新的压缩级别重新压缩 APE 文件, 保留 WAV 头部、尾部数据与标签
pub fn convert_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: CompressOptions,
    ctl: &mut ProcessControl<'_>,
) -> TaoResult<ProcessOutcome> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let mut decompress = ApeDecompress::open(input)?;
    info!(
        "转换 {} -> {} (级别 {})",
        input.display(),
        output.display(),
        options.level
    );

    let format = *decompress.format();
    let source_tag = decompress.tag().clone();
    let keep_header = !decompress.is_partial() && !decompress.info().wav_header.is_empty();
    let terminating = decompress.wav_terminating_data()?;
    let options = CompressOptions {
        max_audio_bytes: Some(decompress.total_blocks() * format.block_align() as u64),
        wav_header: keep_header.then(|| decompress.wav_header()),
        ..options
    };
    let mut compress = ApeCompress::create(output, format, options)?;

    let result = (|| {
        let outcome = decode_all(&mut decompress, ctl, |pcm| compress.add_data(pcm))?;
        if let ProcessOutcome::Completed { .. } = outcome {
            compress.finish(&terminating, terminating.len() as u32)?;
        }
        Ok(outcome)
    })();
    drop(compress);
    let result = result.and_then(|outcome| {
        if matches!(outcome, ProcessOutcome::Completed { .. }) {
            copy_tag(&source_tag, output)?;
        }
        Ok(outcome)
    });
    cleanup_on_failure(output, result)
}

/// 把标签字段写到新文件末尾
fn copy_tag(source: &ApeTag, output: &Path) -> TaoResult<()> {
    if source.fields().is_empty() {
        return Ok(());
    }
    let mut io = IoContext::open_read_write(output)?;
    let mut tag = ApeTag::analyze(&mut io)?;
    tag.clear_fields();
    for field in source.fields() {
        tag.set_field(field.clone());
    }
    tag.save(&mut io, false)
}
