//! 帧编解码.
//!
//! 帧结构 (逻辑字节序):
//! ```text
//! [CRC: u32][特殊标志: u32, 仅当 CRC 最高位为 1][区间编码数据...]
//! ```
//! CRC 为帧内 PCM 字节的 CRC-32 右移一位. 每帧开始时预测器、自适应状态和
//! 区间编码器全部重置, 因此任意帧都可以独立解码.

use tao_core::crc::crc32;
use tao_core::{TaoError, TaoResult};

use super::predictor::Predictor;
use super::prepare::{prepare, unprepare};
use super::range_coder::{BitArrayState, RangeDecoder, RangeEncoder};
use super::{CompressionLevel, SpecialFrame, WaveFormat, blocks_per_frame, check_version};

/// CRC 字中表示"后跟特殊标志"的位
const CRC_SPECIAL_FLAG: u32 = 1 << 31;

/// 一帧的编码结果
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// 帧数据 (逻辑字节序)
    pub data: Vec<u8>,
    /// 块数
    pub blocks: u32,
    /// 写入的 CRC 字 (不含特殊标志位)
    pub crc: u32,
    /// 特殊帧标志
    pub special: SpecialFrame,
}

/// 一帧的解码结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    /// 校验通过
    Clean,
    /// 校验失败或重建溢出, 输出已替换为静音
    Corrupt {
        /// 失败原因
        reason: String,
    },
}

impl FrameStatus {
    /// 是否为损坏帧
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

// ============================================================
// 编码
// ============================================================

/// 帧编码器
pub struct FrameEncoder {
    format: WaveFormat,
    version: u16,
    level: CompressionLevel,
    predictor_x: Predictor,
    predictor_y: Predictor,
    x: Vec<i32>,
    y: Vec<i32>,
    peak: i32,
}

impl FrameEncoder {
    /// 创建帧编码器
    pub fn new(format: WaveFormat, version: u16, level: CompressionLevel) -> TaoResult<Self> {
        format.validate()?;
        check_version(version)?;
        Ok(Self {
            format,
            version,
            level,
            predictor_x: Predictor::new(version, level)?,
            predictor_y: Predictor::new(version, level)?,
            x: Vec::new(),
            y: Vec::new(),
            peak: 0,
        })
    }

    /// 音频格式
    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    /// 格式版本
    pub fn version(&self) -> u16 {
        self.version
    }

    /// 压缩级别
    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// 每帧块数
    pub fn blocks_per_frame(&self) -> u32 {
        blocks_per_frame(self.version)
    }

    /// 已编码数据的峰值
    pub fn peak_level(&self) -> i32 {
        self.peak
    }

    /// 编码一帧 PCM (块数不超过每帧块数)
    pub fn encode_frame(&mut self, pcm: &[u8]) -> TaoResult<EncodedFrame> {
        let blocks = pcm.len() / self.format.block_align();
        if blocks == 0 || blocks > self.blocks_per_frame() as usize {
            return Err(TaoError::InvalidArgument(format!(
                "帧块数 {blocks} 超出范围 1..={}",
                self.blocks_per_frame()
            )));
        }

        let info = prepare(pcm, &self.format, &mut self.x, &mut self.y)?;
        self.peak = self.peak.max(info.peak);

        let crc = info.crc >> 1;
        let mut rc = RangeEncoder::new(Vec::with_capacity(pcm.len() / 2 + 16));
        if info.special.is_empty() {
            rc.encode_u32(crc)?;
        } else {
            rc.encode_u32(crc | CRC_SPECIAL_FLAG)?;
            rc.encode_u32(info.special.bits())?;
        }

        self.predictor_x.flush();
        self.predictor_y.flush();
        let mut state_x = BitArrayState::new();
        let mut state_y = BitArrayState::new();
        rc.flush_state();

        let special = info.special;
        if self.format.channels == 2 {
            let silent = special.contains(SpecialFrame::LEFT_SILENCE | SpecialFrame::RIGHT_SILENCE);
            if silent {
                // 两声道都静音, 不写任何采样
            } else if special.contains(SpecialFrame::PSEUDO_STEREO) {
                for &x in &self.x {
                    rc.encode_value(self.predictor_x.compress(x, 0), &mut state_x)?;
                }
            } else if self.version >= 3950 {
                let mut last_x = 0;
                for (&x, &y) in self.x.iter().zip(&self.y) {
                    rc.encode_value(self.predictor_y.compress(y, last_x), &mut state_y)?;
                    rc.encode_value(self.predictor_x.compress(x, y), &mut state_x)?;
                    last_x = x;
                }
            } else {
                for (&x, &y) in self.x.iter().zip(&self.y) {
                    rc.encode_value(self.predictor_x.compress(x, 0), &mut state_x)?;
                    rc.encode_value(self.predictor_y.compress(y, 0), &mut state_y)?;
                }
            }
        } else if !special.contains(SpecialFrame::MONO_SILENCE) {
            for &x in &self.x {
                rc.encode_value(self.predictor_x.compress(x, 0), &mut state_x)?;
            }
        }

        rc.finalize()?;
        let data = rc.finish()?;
        Ok(EncodedFrame {
            data,
            blocks: blocks as u32,
            crc,
            special,
        })
    }
}

// ============================================================
// 解码
// ============================================================

/// 帧解码器
pub struct FrameDecoder {
    format: WaveFormat,
    version: u16,
    predictor_x: Predictor,
    predictor_y: Predictor,
}

impl FrameDecoder {
    /// 创建帧解码器
    pub fn new(format: WaveFormat, version: u16, level: CompressionLevel) -> TaoResult<Self> {
        format.validate()?;
        check_version(version)?;
        Ok(Self {
            format,
            version,
            predictor_x: Predictor::new(version, level)?,
            predictor_y: Predictor::new(version, level)?,
        })
    }

    /// 音频格式
    pub fn format(&self) -> &WaveFormat {
        &self.format
    }

    /// 解码一帧, PCM 追加到 `out`
    ///
    /// 校验失败或重建溢出时输出 `blocks` 块静音并返回 [`FrameStatus::Corrupt`];
    /// 只有底层读取错误会以 `Err` 返回.
    pub fn decode_frame(
        &mut self,
        data: &[u8],
        blocks: u32,
        out: &mut Vec<u8>,
    ) -> TaoResult<FrameStatus> {
        let start = out.len();
        let bytes = blocks as usize * self.format.block_align();
        out.try_reserve(bytes)
            .map_err(|e| TaoError::OutOfMemory(format!("解码缓冲分配失败: {e}")))?;

        let reason = match self.decode_blocks(data, blocks, out) {
            Ok(stored) => {
                let computed = crc32(&out[start..]) >> 1;
                if computed == stored {
                    return Ok(FrameStatus::Clean);
                }
                format!("CRC 不匹配: 存储 {stored:08X}, 计算 {computed:08X}")
            }
            Err(TaoError::InvalidData(msg)) => msg,
            Err(e) => return Err(e),
        };

        out.truncate(start);
        out.resize(start + bytes, self.format.silence_byte());
        Ok(FrameStatus::Corrupt { reason })
    }

    /// 解码全部块, 返回帧头中存储的 CRC
    fn decode_blocks(&mut self, data: &[u8], blocks: u32, out: &mut Vec<u8>) -> TaoResult<u32> {
        let mut rc = RangeDecoder::new(data)?;
        let mut stored_crc = rc.decode_u32()?;
        let mut special = SpecialFrame::empty();
        if stored_crc & CRC_SPECIAL_FLAG != 0 {
            special = SpecialFrame::from_bits_retain(rc.decode_u32()?);
        }
        stored_crc &= !CRC_SPECIAL_FLAG;

        self.predictor_x.flush();
        self.predictor_y.flush();
        let mut state_x = BitArrayState::new();
        let mut state_y = BitArrayState::new();
        rc.flush_state()?;

        let fmt = self.format;
        if fmt.channels == 2 {
            if special.contains(SpecialFrame::LEFT_SILENCE | SpecialFrame::RIGHT_SILENCE) {
                for _ in 0..blocks {
                    unprepare(0, 0, &fmt, out)?;
                }
            } else if special.contains(SpecialFrame::PSEUDO_STEREO) {
                for _ in 0..blocks {
                    let x = self
                        .predictor_x
                        .decompress(rc.decode_value(&mut state_x)?, 0);
                    unprepare(x, 0, &fmt, out)?;
                }
            } else if self.version >= 3950 {
                let mut last_x = 0;
                for _ in 0..blocks {
                    let ny = rc.decode_value(&mut state_y)?;
                    let y = self.predictor_y.decompress(ny, last_x);
                    let nx = rc.decode_value(&mut state_x)?;
                    let x = self.predictor_x.decompress(nx, y);
                    last_x = x;
                    unprepare(x, y, &fmt, out)?;
                }
            } else {
                for _ in 0..blocks {
                    let x = self
                        .predictor_x
                        .decompress(rc.decode_value(&mut state_x)?, 0);
                    let y = self
                        .predictor_y
                        .decompress(rc.decode_value(&mut state_y)?, 0);
                    unprepare(x, y, &fmt, out)?;
                }
            }
        } else if special.contains(SpecialFrame::MONO_SILENCE) {
            for _ in 0..blocks {
                unprepare(0, 0, &fmt, out)?;
            }
        } else {
            for _ in 0..blocks {
                let x = self
                    .predictor_x
                    .decompress(rc.decode_value(&mut state_x)?, 0);
                unprepare(x, 0, &fmt, out)?;
            }
        }

        rc.finalize();
        Ok(stored_crc)
    }
}
