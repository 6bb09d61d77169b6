//! 封装器 (Muxer) trait 定义.

use tao_codec::Packet;
use tao_core::TaoResult;

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 封装器 trait
///
/// `write_header()` 写入占位头部, `write_packet()` 按顺序追加数据,
/// `write_trailer()` 写出尾部数据并回填头部中的长度字段.
/// 头部只有在 `write_trailer()` 成功后才是完整的.
pub trait Muxer: Send {
    fn format_id(&self) -> FormatId;

    fn name(&self) -> &str;

    /// 写入头部, `streams` 必须恰好包含一条音频流
    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> TaoResult<()>;

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> TaoResult<()>;

    /// 结束封装并回填头部
    fn write_trailer(&mut self, io: &mut IoContext) -> TaoResult<()>;
}
