//! Monkey's Audio (APE) 编解码核心.
//!
//! 处理流程 (编码方向):
//! PCM -> [`prepare`] (X/Y 去相关, CRC, 特殊帧检测) -> [`predictor`] (一阶滤波 +
//! 自适应预测 + NN 滤波级联) -> [`range_coder`] (自适应区间编码) -> 帧数据.
//! 解码方向完全对称, 由 [`frame`] 模块按帧驱动.
//!
//! 支持 3.93 (3930) 至 3.97 (3970) 的单描述头码流, 最多 2 声道, 8/16/24 位.

pub mod bit_array;
pub mod frame;
pub mod nnfilter;
pub mod predictor;
pub mod prepare;
pub mod range_coder;
pub mod roll_buffer;

use std::fmt;

use bitflags::bitflags;
use tao_core::{ChannelLayout, SampleFormat, TaoError, TaoResult};

pub use frame::{EncodedFrame, FrameDecoder, FrameEncoder, FrameStatus};

/// 支持的最低格式版本 (3.93)
pub const MIN_VERSION: u16 = 3930;
/// 编码器默认写出的格式版本 (3.97)
pub const CURRENT_VERSION: u16 = 3970;
/// 支持的最高格式版本, 更新的版本使用描述符式文件头, 不在支持范围内
pub const MAX_VERSION: u16 = 3970;

/// 驱动层每次处理的块数
pub const BLOCKS_PER_DECODE: usize = 9216;

/// 根据格式版本计算每帧块数
pub const fn blocks_per_frame(version: u16) -> u32 {
    if version >= 3950 {
        73728 * 4
    } else {
        73728
    }
}

/// 检查格式版本是否受支持
pub fn check_version(version: u16) -> TaoResult<()> {
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return Err(TaoError::Unsupported(format!(
            "APE 格式版本 {version} 不受支持 (支持 {MIN_VERSION}..={MAX_VERSION})"
        )));
    }
    Ok(())
}

// ========================
// 压缩级别
// ========================

/// 压缩级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionLevel {
    /// 快速 (1000), 不使用 NN 滤波
    Fast,
    /// 普通 (2000)
    #[default]
    Normal,
    /// 高 (3000)
    High,
    /// 超高 (4000)
    ExtraHigh,
    /// 疯狂 (5000), 仅 3950 及以上版本
    Insane,
}

impl CompressionLevel {
    /// 全部级别, 由低到高
    pub const ALL: [Self; 5] = [
        Self::Fast,
        Self::Normal,
        Self::High,
        Self::ExtraHigh,
        Self::Insane,
    ];

    /// 文件头中的数值
    pub const fn as_u16(&self) -> u16 {
        match self {
            Self::Fast => 1000,
            Self::Normal => 2000,
            Self::High => 3000,
            Self::ExtraHigh => 4000,
            Self::Insane => 5000,
        }
    }

    /// 从文件头数值解析
    pub fn from_u16(value: u16) -> TaoResult<Self> {
        match value {
            1000 => Ok(Self::Fast),
            2000 => Ok(Self::Normal),
            3000 => Ok(Self::High),
            4000 => Ok(Self::ExtraHigh),
            5000 => Ok(Self::Insane),
            v => Err(TaoError::Unsupported(format!("未知的 APE 压缩级别: {v}"))),
        }
    }

    /// 该级别在指定版本下使用的 NN 滤波器 (阶数, 移位), 按压缩方向的级联顺序排列
    pub fn nn_filters(&self, version: u16) -> TaoResult<&'static [(usize, u32)]> {
        Ok(match self {
            Self::Fast => &[],
            Self::Normal => &[(16, 11)],
            Self::High => &[(64, 11)],
            Self::ExtraHigh => &[(256, 13), (32, 10)],
            Self::Insane if version >= 3950 => &[(1024 + 256, 15), (256, 13), (16, 11)],
            Self::Insane => {
                return Err(TaoError::Unsupported(format!(
                    "版本 {version} 不支持 insane 压缩级别"
                )));
            }
        })
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fast => "fast",
            Self::Normal => "normal",
            Self::High => "high",
            Self::ExtraHigh => "extra high",
            Self::Insane => "insane",
        };
        write!(f, "{name}")
    }
}

// ========================
// 特殊帧标志
// ========================

bitflags! {
    /// 帧级特殊编码标志, 非零时写在帧 CRC 之后
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SpecialFrame: u32 {
        /// 单声道全静音 (与 LEFT_SILENCE 同值, 按声道数区分)
        const MONO_SILENCE = 1;
        /// 左声道静音
        const LEFT_SILENCE = 1;
        /// 右声道静音
        const RIGHT_SILENCE = 2;
        /// 伪立体声 (两声道完全相同)
        const PSEUDO_STEREO = 4;
    }
}

// ========================
// 音频格式
// ========================

/// 音频格式, 开始压缩/解压后不再变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaveFormat {
    /// 声道数 (1 或 2)
    pub channels: u16,
    /// 位深 (8/16/24)
    pub bits_per_sample: u16,
    /// 采样率 (Hz)
    pub sample_rate: u32,
}

impl WaveFormat {
    /// 创建并校验音频格式
    pub fn new(channels: u16, bits_per_sample: u16, sample_rate: u32) -> TaoResult<Self> {
        let fmt = Self {
            channels,
            bits_per_sample,
            sample_rate,
        };
        fmt.validate()?;
        Ok(fmt)
    }

    /// 校验声道数、位深和采样率
    pub fn validate(&self) -> TaoResult<()> {
        if self.channels == 0 || self.channels > 2 {
            return Err(TaoError::Unsupported(format!(
                "APE 不支持 {} 声道",
                self.channels
            )));
        }
        if SampleFormat::from_bits(u32::from(self.bits_per_sample)).is_none() {
            return Err(TaoError::Unsupported(format!(
                "APE 不支持 {} 位采样",
                self.bits_per_sample
            )));
        }
        if self.sample_rate == 0 {
            return Err(TaoError::InvalidArgument("采样率不能为 0".into()));
        }
        Ok(())
    }

    /// 每个采样点的字节数
    pub const fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// 每个块的字节数
    pub const fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// 对应的采样格式
    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat::from_bits(u32::from(self.bits_per_sample)).unwrap_or(SampleFormat::None)
    }

    /// 对应的声道布局
    pub fn channel_layout(&self) -> ChannelLayout {
        ChannelLayout::from_channels(u32::from(self.channels)).unwrap_or(ChannelLayout::MONO)
    }

    /// 静音字节 (8 位无符号以 0x80 为零点)
    pub const fn silence_byte(&self) -> u8 {
        if self.bits_per_sample == 8 { 0x80 } else { 0 }
    }
}

impl fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} 声道, {} 位",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

// ========================
// 流配置 (extra_data)
// ========================

/// 解码所需的码流配置, 以 6 字节 extra_data 在容器与编解码器之间传递
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApeStreamConfig {
    /// 格式版本
    pub version: u16,
    /// 压缩级别
    pub level: CompressionLevel,
    /// 文件头格式标志
    pub format_flags: u16,
}

impl ApeStreamConfig {
    /// 序列化为 extra_data
    pub fn to_extra_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.level.as_u16().to_le_bytes());
        out.extend_from_slice(&self.format_flags.to_le_bytes());
        out
    }

    /// 从 extra_data 解析
    pub fn from_extra_data(data: &[u8]) -> TaoResult<Self> {
        if data.len() < 6 {
            return Err(TaoError::InvalidArgument(format!(
                "APE extra_data 长度不足: {} 字节",
                data.len()
            )));
        }
        let version = u16::from_le_bytes([data[0], data[1]]);
        check_version(version)?;
        Ok(Self {
            version,
            level: CompressionLevel::from_u16(u16::from_le_bytes([data[2], data[3]]))?,
            format_flags: u16::from_le_bytes([data[4], data[5]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_每帧块数() {
        assert_eq!(blocks_per_frame(3970), 294_912);
        assert_eq!(blocks_per_frame(3950), 294_912);
        assert_eq!(blocks_per_frame(3940), 73_728);
    }

    #[test]
    fn test_压缩级别_nn配置() {
        assert!(CompressionLevel::Fast.nn_filters(3970).unwrap().is_empty());
        assert_eq!(CompressionLevel::Normal.nn_filters(3970).unwrap(), &[(16, 11)]);
        assert_eq!(CompressionLevel::Insane.nn_filters(3970).unwrap().len(), 3);
        assert!(CompressionLevel::Insane.nn_filters(3930).is_err());
        for level in CompressionLevel::ALL {
            assert_eq!(CompressionLevel::from_u16(level.as_u16()).unwrap(), level);
        }
        assert!(CompressionLevel::from_u16(1500).is_err());
    }

    #[test]
    fn test_音频格式校验() {
        assert!(WaveFormat::new(2, 16, 44100).is_ok());
        assert!(WaveFormat::new(6, 16, 44100).is_err());
        assert!(WaveFormat::new(2, 32, 44100).is_err());
        assert!(WaveFormat::new(1, 8, 0).is_err());
        let fmt = WaveFormat::new(2, 24, 96000).unwrap();
        assert_eq!(fmt.block_align(), 6);
        assert_eq!(fmt.sample_format(), SampleFormat::S24);
    }

    #[test]
    fn test_流配置_extra_data() {
        let cfg = ApeStreamConfig {
            version: 3970,
            level: CompressionLevel::High,
            format_flags: 0x16,
        };
        let parsed = ApeStreamConfig::from_extra_data(&cfg.to_extra_data()).unwrap();
        assert_eq!(parsed, cfg);
        assert!(ApeStreamConfig::from_extra_data(&[0x9A, 0x0F]).is_err());
    }
}
