//! 解码器接口.

use tao_core::TaoResult;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::frame::AudioFrame;
use crate::packet::Packet;

/// 解码器
///
/// 每个数据包解出一帧 PCM, 送入后必须先取出才能送下一个.
/// 校验失败的帧仍然返回, 数据为静音且 [`AudioFrame::corrupt`] 为真.
pub trait Decoder: Send {
    fn codec_id(&self) -> CodecId;

    fn name(&self) -> &str;

    /// 按流参数配置解码器, 重置所有状态
    fn open(&mut self, params: &CodecParameters) -> TaoResult<()>;

    /// 送入一个数据包, 空包表示输入结束
    ///
    /// 上一帧尚未取出时返回 `NeedMoreData`.
    fn send_packet(&mut self, packet: &Packet) -> TaoResult<()>;

    /// 取出解码结果
    ///
    /// 没有待取出的帧时返回 `NeedMoreData`, 输入结束后返回 `Eof`.
    fn receive_frame(&mut self) -> TaoResult<AudioFrame>;

    /// 丢弃待取出的帧, 定位后调用
    fn flush(&mut self);
}
