//! 编解码器标识符.
//!
//! 为每种编解码算法分配唯一标识.

use std::fmt;

/// 编解码器标识符
///
/// 唯一标识一种编解码算法, 与容器格式无关.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,
    /// Monkey's Audio 无损压缩
    Ape,
    /// PCM 无符号 8 位
    PcmU8,
    /// PCM 有符号 16 位小端
    PcmS16le,
    /// PCM 有符号 24 位小端
    PcmS24le,
}

impl CodecId {
    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ape => "ape",
            Self::PcmU8 => "pcm_u8",
            Self::PcmS16le => "pcm_s16le",
            Self::PcmS24le => "pcm_s24le",
        }
    }

    /// 根据位深选择对应的 PCM 编解码器
    pub const fn pcm_from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::PcmU8),
            16 => Some(Self::PcmS16le),
            24 => Some(Self::PcmS24le),
            _ => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
