//! 解码后的音频帧.
//!
//! 数据以交错、小端打包的 PCM 字节保存, 与 WAV 数据块的布局一致.

use tao_core::NOPTS_VALUE;

use crate::ape::WaveFormat;

/// 音频帧
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// 交错排列的 PCM 字节
    pub data: Vec<u8>,
    /// 块数 (每声道采样数)
    pub nb_samples: u32,
    pub format: WaveFormat,
    /// 首块的时间戳 (以块为单位)
    pub pts: i64,
    /// 校验失败, 数据已替换为静音
    pub corrupt: bool,
}

impl AudioFrame {
    /// 用整块的 PCM 字节创建帧, 末尾不足一块的字节不计入块数
    pub fn new(format: WaveFormat, data: Vec<u8>) -> Self {
        Self {
            nb_samples: (data.len() / format.block_align()) as u32,
            data,
            format,
            pts: NOPTS_VALUE,
            corrupt: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_按块对齐计算块数() {
        let format = WaveFormat::new(2, 24, 48000).unwrap();
        let frame = AudioFrame::new(format, vec![0u8; 6 * 10 + 2]);
        assert_eq!(frame.nb_samples, 10);
        assert_eq!(frame.pts, NOPTS_VALUE);
        assert!(!frame.corrupt);
    }
}
