//! 压缩数据包.
//!
//! 对 APE 而言一个数据包就是一个完整的帧; WAV 解封装器输出的数据包则是一段原始 PCM.

use bytes::Bytes;
use tao_core::{NOPTS_VALUE, Rational};

/// 数据包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 负载数据
    pub data: Bytes,
    /// 首块的时间戳 (以块为单位)
    pub pts: i64,
    /// 包含的块数
    pub duration: i64,
    /// 时间基 (1 / 采样率)
    pub time_base: Rational,
    /// 所属流的索引
    pub stream_index: usize,
    /// 在容器中的字节偏移 (-1 表示未知)
    pub pos: i64,
}

impl Packet {
    /// 创建空数据包, 送入编解码器表示刷新
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: NOPTS_VALUE,
            duration: 0,
            time_base: Rational::UNDEFINED,
            stream_index: 0,
            pos: -1,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 创建带时间信息的音频数据包
    pub fn audio(data: impl Into<Bytes>, first_block: u64, blocks: u32, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            pts: first_block as i64,
            duration: i64::from(blocks),
            time_base: Rational::new(1, sample_rate as i32),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
