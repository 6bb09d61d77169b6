//! 解封装器 (Demuxer) trait 定义.
//!
//! APE 与 WAV 文件都只有一条音频流, 时间以块 (每声道一个采样) 为单位.

use tao_codec::Packet;
use tao_core::{TaoError, TaoResult};

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 使用流程: `open()` 解析文件头部, `audio_stream()` 取得流参数,
/// 然后循环 `read_packet()` 直到 `Err(TaoError::Eof)`. 可随时 `seek()`.
pub trait Demuxer: Send {
    fn format_id(&self) -> FormatId;

    fn name(&self) -> &str;

    /// 解析文件头部
    fn open(&mut self, io: &mut IoContext) -> TaoResult<()>;

    fn streams(&self) -> &[Stream];

    /// 唯一的音频流
    fn audio_stream(&self) -> TaoResult<&Stream> {
        self.streams().first().ok_or(TaoError::StreamNotFound(0))
    }

    /// 读取下一个数据包; APE 每包一帧, WAV 每包固定块数
    fn read_packet(&mut self, io: &mut IoContext) -> TaoResult<Packet>;

    /// 定位到包含目标块的包
    ///
    /// 之后读出的第一个包从返回的块号开始, 它不大于 `block`.
    fn seek(&mut self, io: &mut IoContext, block: u64) -> TaoResult<u64>;

    /// 时长 (秒), 未打开时为 `None`
    fn duration(&self) -> Option<f64>;

    /// 文本元数据 (APE 标签字段等)
    fn metadata(&self) -> &[(String, String)] {
        &[]
    }
}
