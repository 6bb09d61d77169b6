//! 立体声去相关 (Prepare / Unprepare).
//!
//! 交错 PCM 的第一个采样记为 R, 第二个记为 L:
//! - 正向: `Y = L - R`, `X = R + Y / 2`; 单声道 `X = R`.
//! - 反向: `R = X - Y / 2`, `L = R + Y`, 结果超出位深范围视为数据错误.
//!
//! 8 位采样以 128 为零点, 24 位采样为 3 字节小端并做符号扩展.

use tao_core::crc::Crc32;
use tao_core::{TaoError, TaoResult};

use super::{SpecialFrame, WaveFormat};

/// 正向变换的统计结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOutput {
    /// 原始 PCM 字节的 CRC-32
    pub crc: u32,
    /// 特殊帧标志
    pub special: SpecialFrame,
    /// 峰值 (绝对值最大的采样)
    pub peak: i32,
}

/// 读取一个有符号采样
#[inline]
fn read_sample(bytes: &[u8], bits: u16) -> i32 {
    match bits {
        8 => i32::from(bytes[0]) - 128,
        16 => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        _ => {
            let raw = i32::from(bytes[0]) | (i32::from(bytes[1]) << 8) | (i32::from(bytes[2]) << 16);
            (raw << 8) >> 8
        }
    }
}

/// 写入一个有符号采样, 超出范围返回错误
#[inline]
fn write_sample(value: i32, bits: u16, out: &mut Vec<u8>) -> TaoResult<()> {
    match bits {
        8 => {
            if !(-128..=127).contains(&value) {
                return Err(overflow(value, bits));
            }
            out.push((value + 128) as u8);
        }
        16 => {
            if !(i32::from(i16::MIN)..=i32::from(i16::MAX)).contains(&value) {
                return Err(overflow(value, bits));
            }
            out.extend_from_slice(&(value as i16).to_le_bytes());
        }
        _ => {
            if !(-(1 << 23)..(1 << 23)).contains(&value) {
                return Err(overflow(value, bits));
            }
            out.extend_from_slice(&value.to_le_bytes()[..3]);
        }
    }
    Ok(())
}

fn overflow(value: i32, bits: u16) -> TaoError {
    TaoError::InvalidData(format!("重建采样 {value} 超出 {bits} 位范围"))
}

/// 正向变换: PCM -> X/Y, 同时累计 CRC、峰值与特殊帧标志
///
/// `x`/`y` 会被清空后重新填充; 单声道时 `y` 为空.
pub fn prepare(
    pcm: &[u8],
    format: &WaveFormat,
    x: &mut Vec<i32>,
    y: &mut Vec<i32>,
) -> TaoResult<PrepareOutput> {
    let block_align = format.block_align();
    if pcm.len() % block_align != 0 {
        return Err(TaoError::InvalidArgument(format!(
            "PCM 长度 {} 不是块大小 {} 的整数倍",
            pcm.len(),
            block_align
        )));
    }

    let mut crc = Crc32::new();
    crc.update(pcm);

    let bits = format.bits_per_sample;
    let bps = format.bytes_per_sample();
    let blocks = pcm.len() / block_align;
    x.clear();
    y.clear();
    x.reserve(blocks);

    let mut special = SpecialFrame::empty();
    let peak;
    if format.channels == 2 {
        y.reserve(blocks);
        let mut peak_l = 0i32;
        let mut peak_r = 0i32;
        let mut all_y_zero = true;
        for block in pcm.chunks_exact(block_align) {
            let r = read_sample(&block[..bps], bits);
            let l = read_sample(&block[bps..], bits);
            let diff = l - r;
            x.push(r + diff / 2);
            y.push(diff);
            peak_r = peak_r.max(r.abs());
            peak_l = peak_l.max(l.abs());
            all_y_zero &= diff == 0;
        }
        if peak_l == 0 {
            special |= SpecialFrame::LEFT_SILENCE;
        }
        if peak_r == 0 {
            special |= SpecialFrame::RIGHT_SILENCE;
        }
        if all_y_zero {
            special |= SpecialFrame::PSEUDO_STEREO;
        }
        peak = peak_l.max(peak_r);
    } else {
        let mut peak_m = 0i32;
        for block in pcm.chunks_exact(block_align) {
            let r = read_sample(block, bits);
            x.push(r);
            peak_m = peak_m.max(r.abs());
        }
        if peak_m == 0 {
            special |= SpecialFrame::MONO_SILENCE;
        }
        peak = peak_m;
    }

    Ok(PrepareOutput {
        crc: crc.finish(),
        special,
        peak,
    })
}

/// 反向变换一个块并追加到输出
#[inline]
pub fn unprepare(x: i32, y: i32, format: &WaveFormat, out: &mut Vec<u8>) -> TaoResult<()> {
    let bits = format.bits_per_sample;
    if format.channels == 2 {
        let r = x.wrapping_sub(y / 2);
        let l = r.wrapping_add(y);
        write_sample(r, bits, out)?;
        write_sample(l, bits, out)
    } else {
        write_sample(x, bits, out)
    }
}
