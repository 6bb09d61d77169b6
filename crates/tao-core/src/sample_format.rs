//! 音频采样格式定义.
//!
//! APE 只处理交错排列的整数 PCM, 因此这里只保留 8/16/24 位三种打包格式.

use std::fmt;

/// 音频采样格式 (交错, 小端打包)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SampleFormat {
    /// 未指定
    None,
    /// 无符号 8 位整数
    U8,
    /// 有符号 16 位整数, 小端
    S16,
    /// 有符号 24 位整数, 3 字节小端打包
    S24,
}

impl SampleFormat {
    /// 每个采样点占用的字节数
    pub const fn bytes_per_sample(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S24 => 3,
        }
    }

    /// 采样位深
    pub const fn bits_per_sample(&self) -> u32 {
        self.bytes_per_sample() * 8
    }

    /// 根据位深查找格式
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::U8),
            16 => Some(Self::S16),
            24 => Some(Self::S24),
            _ => None,
        }
    }

    /// 有符号采样值的合法范围 (8 位按去中心化后的值计算)
    pub const fn sample_range(&self) -> (i32, i32) {
        match self {
            Self::None => (0, 0),
            Self::U8 => (-128, 127),
            Self::S16 => (i16::MIN as i32, i16::MAX as i32),
            Self::S24 => (-(1 << 23), (1 << 23) - 1),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S24 => "s24",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_位深与字节数() {
        for bits in [8, 16, 24] {
            let fmt = SampleFormat::from_bits(bits).unwrap();
            assert_eq!(fmt.bits_per_sample(), bits);
        }
        assert!(SampleFormat::from_bits(32).is_none());
        assert_eq!(SampleFormat::S24.sample_range(), (-8_388_608, 8_388_607));
    }
}
