//! 格式探测.
//!
//! 根据文件开头的字节和扩展名判断是 APE 还是 WAV.

use crate::format_id::FormatId;

/// 探测置信度, 越高越可信
pub type ProbeScore = u32;

/// 只有扩展名匹配
pub const SCORE_EXTENSION: ProbeScore = 50;

/// 魔数位于 ID3v2 等前导数据之后
pub const SCORE_LIKELY: ProbeScore = 75;

/// 魔数位于文件开头
pub const SCORE_MAX: ProbeScore = 100;

/// 探测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub format_id: FormatId,
    pub score: ProbeScore,
}

/// 格式探测器
pub trait FormatProbe {
    /// 探测文件开头的 `data`; 不是此格式时返回 `None`
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore>;

    fn format_id(&self) -> FormatId;
}
