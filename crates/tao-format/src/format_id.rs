//! 容器格式标识符.

use std::fmt;

/// 容器格式标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// Monkey's Audio (APE)
    Ape,
    /// WAV (RIFF WAVE)
    Wav,
}

impl FormatId {
    /// 获取格式的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ape => "ape",
            Self::Wav => "wav",
        }
    }

    /// 常用扩展名 (小写, 不含 `.`)
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Ape => &["ape", "mac"],
            Self::Wav => &["wav", "wave"],
        }
    }

    /// 文件名的扩展名是否属于此格式 (不区分大小写)
    pub fn matches_filename(&self, filename: &str) -> bool {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return false;
        };
        self.extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
