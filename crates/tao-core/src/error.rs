//! 统一错误类型定义.
//!
//! 各 crate 共用 [`TaoError`]. 帧校验失败不是错误: 帧编解码器以 `FrameStatus::Corrupt`
//! 显式返回, 上层把该帧替换为静音后继续; 用户中止同样不是错误.

use thiserror::Error;

/// 统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 调用方传入的参数无效 (越界的块号、未知的压缩级别等)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 格式合法但不受支持 (文件版本、位深、声道数)
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 编解码器状态错误
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// 容器结构错误 (魔数、文件头、跳转表、RIFF 块)
    #[error("格式错误: {0}")]
    Format(String),

    /// 底层读写失败
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 跳转表或帧缓冲分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    #[error("未找到编解码器: {0}")]
    CodecNotFound(String),

    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 码流内容无效 (预测阶数、重建溢出、标签字段等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内部状态不一致
    #[error("内部错误: {0}")]
    Internal(String),
}

impl TaoError {
    /// 是否为流结束
    pub fn is_eof(&self) -> bool {
        match self {
            Self::Eof => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// 统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_错误转换与流结束判断() {
        let err: TaoError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, TaoError::Io(_)));
        assert!(err.is_eof());
        assert!(TaoError::Eof.is_eof());
        assert!(!TaoError::NeedMoreData.is_eof());
        assert_eq!(
            TaoError::Format("缺少 MAC 魔数".into()).to_string(),
            "格式错误: 缺少 MAC 魔数"
        );
    }
}
