//! 编码器接口.

use tao_core::TaoResult;

use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::frame::AudioFrame;
use crate::packet::Packet;

/// 编码器
///
/// 输入任意长度的整块 PCM, 凑满一帧输出一个数据包; 送入 `None` 后把剩余数据编码为最后一帧.
pub trait Encoder: Send {
    fn codec_id(&self) -> CodecId;

    fn name(&self) -> &str;

    /// 按流参数配置编码器
    fn open(&mut self, params: &CodecParameters) -> TaoResult<()>;

    /// 送入 PCM, `None` 表示输入结束
    fn send_frame(&mut self, frame: Option<&AudioFrame>) -> TaoResult<()>;

    /// 取出一个数据包
    ///
    /// 暂无完整帧时返回 `NeedMoreData`, 结束后全部取出时返回 `Eof`.
    fn receive_packet(&mut self) -> TaoResult<Packet>;

    /// 丢弃未编码的输入与未取出的数据包
    fn flush(&mut self);
}
