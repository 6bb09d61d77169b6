//! 自适应区间编码器.
//!
//! 在 [`BitArray`]/[`UnBitArray`] 之上实现 32 位区间编码, 以及 APE 的
//! 类 Golomb-Rice 自适应数值编码 (溢出部分走 64 符号频率表, 低位部分直接编码).

use std::io::{Read, Write};

use tao_core::{TaoError, TaoResult};

use super::bit_array::{BitArray, UnBitArray};

const CODE_BITS: u32 = 32;
const TOP_VALUE: u32 = 1 << (CODE_BITS - 1);
const SHIFT_BITS: u32 = CODE_BITS - 9;
const EXTRA_BITS: u32 = (CODE_BITS - 2) % 8 + 1;
const BOTTOM_VALUE: u32 = TOP_VALUE >> 8;

/// 溢出符号的频率精度 (16 位)
const RANGE_OVERFLOW_SHIFT: u32 = 16;
/// 溢出符号数, 最后一个为转义符号
pub const MODEL_ELEMENTS: usize = 64;

/// 溢出符号累积频率表
pub const RANGE_TOTAL: [u32; MODEL_ELEMENTS + 1] = build_range_total();

/// 溢出符号宽度表
pub const RANGE_WIDTH: [u32; MODEL_ELEMENTS] = build_range_width();

/// k 调整的 kSum 下界表
pub const K_SUM_MIN_BOUNDARY: [u32; 32] = {
    let mut table = [0u32; 32];
    let mut i = 1;
    while i < 28 {
        table[i] = 1 << (i + 4);
        i += 1;
    }
    table
};

/// 频率表的前 22 个累积值, 之后每个符号宽度为 1
const RANGE_TOTAL_HEAD: [u32; 22] = [
    0, 14824, 28224, 39348, 47855, 53994, 58171, 60926, 62682, 63786, 64463, 64878, 65126,
    65276, 65365, 65419, 65450, 65469, 65480, 65487, 65491, 65493,
];

const fn build_range_total() -> [u32; MODEL_ELEMENTS + 1] {
    let mut table = [0u32; MODEL_ELEMENTS + 1];
    let mut i = 0;
    while i < MODEL_ELEMENTS + 1 {
        table[i] = if i < RANGE_TOTAL_HEAD.len() {
            RANGE_TOTAL_HEAD[i]
        } else {
            RANGE_TOTAL_HEAD[RANGE_TOTAL_HEAD.len() - 1] + (i - RANGE_TOTAL_HEAD.len() + 1) as u32
        };
        i += 1;
    }
    table
}

const fn build_range_width() -> [u32; MODEL_ELEMENTS] {
    let total = build_range_total();
    let mut table = [0u32; MODEL_ELEMENTS];
    let mut i = 0;
    while i < MODEL_ELEMENTS {
        table[i] = total[i + 1] - total[i];
        i += 1;
    }
    table
}

// ============================================================
// 自适应状态
// ============================================================

/// 每声道的自适应编码状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitArrayState {
    /// 当前 k
    pub k: u32,
    /// 运行和
    pub k_sum: u32,
}

impl BitArrayState {
    /// 帧开始时的初始状态
    pub const fn new() -> Self {
        Self {
            k: 10,
            k_sum: (1 << 10) * 16,
        }
    }

    /// 重置为初始状态
    pub fn flush(&mut self) {
        *self = Self::new();
    }

    /// 本次数值使用的工作 k
    #[inline]
    fn working_k(&self) -> u32 {
        self.k.saturating_sub(1)
    }

    /// 根据已编码的无符号值更新 kSum 与 k, 每次最多调整 1
    #[inline]
    fn update(&mut self, value: u32) {
        self.k_sum = self
            .k_sum
            .wrapping_add(value.wrapping_add(1) / 2)
            .wrapping_sub((self.k_sum.wrapping_add(16)) >> 5);

        let k = self.k as usize;
        if self.k_sum < K_SUM_MIN_BOUNDARY[k] {
            self.k -= 1;
        } else if k + 1 < K_SUM_MIN_BOUNDARY.len() && self.k_sum >= K_SUM_MIN_BOUNDARY[k + 1] {
            self.k += 1;
        }
    }
}

impl Default for BitArrayState {
    fn default() -> Self {
        Self::new()
    }
}

/// 有符号值映射为无符号: 正数 -> 奇数, 非正数 -> 偶数
#[inline]
fn to_unsigned(value: i32) -> u32 {
    if value > 0 {
        (value as u32).wrapping_mul(2).wrapping_sub(1)
    } else {
        (value as u32).wrapping_neg().wrapping_mul(2)
    }
}

/// 无符号值还原为有符号
#[inline]
fn to_signed(value: u32) -> i32 {
    if value & 1 != 0 {
        ((value >> 1) as i32).wrapping_add(1)
    } else {
        ((value >> 1) as i32).wrapping_neg()
    }
}

// ============================================================
// 编码器
// ============================================================

/// 区间编码器
pub struct RangeEncoder<W: Write> {
    bits: BitArray<W>,
    low: u32,
    range: u32,
    buffer: u32,
    help: u32,
}

impl<W: Write> RangeEncoder<W> {
    /// 创建编码器
    pub fn new(sink: W) -> Self {
        Self {
            bits: BitArray::new(sink),
            low: 0,
            range: TOP_VALUE,
            buffer: 0,
            help: 0,
        }
    }

    /// 底层位数组
    pub fn bit_array(&mut self) -> &mut BitArray<W> {
        &mut self.bits
    }

    /// 重置区间编码器状态 (帧开始时)
    pub fn flush_state(&mut self) {
        self.low = 0;
        self.range = TOP_VALUE;
        self.buffer = 0;
        self.help = 0;
    }

    fn normalize(&mut self) -> TaoResult<()> {
        while self.range <= BOTTOM_VALUE {
            if self.low < (0xFF << SHIFT_BITS) {
                self.bits.put_byte(self.buffer as u8)?;
                self.bits.put_repeated(0xFF, self.help)?;
                self.help = 0;
                self.buffer = self.low >> SHIFT_BITS;
            } else if self.low & TOP_VALUE != 0 {
                self.bits.put_byte(self.buffer.wrapping_add(1) as u8)?;
                self.bits.put_repeated(0x00, self.help)?;
                self.help = 0;
                self.buffer = self.low >> SHIFT_BITS;
            } else {
                self.help += 1;
            }
            self.low = (self.low << 8) & (TOP_VALUE - 1);
            self.range <<= 8;
        }
        Ok(())
    }

    /// 以 `2^shift` 的均匀分布编码 `value`
    pub fn encode_direct(&mut self, value: u32, shift: u32) -> TaoResult<()> {
        self.normalize()?;
        self.range >>= shift;
        self.low = self.low.wrapping_add(self.range.wrapping_mul(value));
        Ok(())
    }

    /// 按频率表编码一个符号
    fn encode_fast(&mut self, width: u32, total: u32, shift: u32) -> TaoResult<()> {
        self.normalize()?;
        let t = self.range >> shift;
        self.range = t.wrapping_mul(width);
        self.low = self.low.wrapping_add(t.wrapping_mul(total));
        Ok(())
    }

    /// 编码一个有符号残差并更新自适应状态
    pub fn encode_value(&mut self, value: i32, state: &mut BitArrayState) -> TaoResult<()> {
        self.bits.ensure_room()?;
        if value == i32::MIN {
            return Err(TaoError::InvalidData(format!("残差 {value} 超出可编码范围")));
        }

        let n = to_unsigned(value);
        let mut temp_k = state.working_k();
        state.update(n);

        let overflow = n >> temp_k;
        if (overflow as usize) < MODEL_ELEMENTS - 1 {
            let o = overflow as usize;
            self.encode_fast(RANGE_WIDTH[o], RANGE_TOTAL[o], RANGE_OVERFLOW_SHIFT)?;
        } else {
            let esc = MODEL_ELEMENTS - 1;
            self.encode_fast(RANGE_WIDTH[esc], RANGE_TOTAL[esc], RANGE_OVERFLOW_SHIFT)?;
            // 转义后直接编码完整数值所需的位数
            temp_k = 32 - n.leading_zeros();
            if temp_k > 31 {
                return Err(TaoError::InvalidData(format!("残差 {value} 超出可编码范围")));
            }
            self.encode_direct(temp_k, 5)?;
        }

        let base = n & ((1u32 << temp_k) - 1);
        if temp_k <= 16 {
            self.encode_direct(base, temp_k)?;
        } else {
            self.encode_direct(base & 0xFFFF, 16)?;
            self.encode_direct(base >> 16, temp_k - 16)?;
        }
        Ok(())
    }

    /// 写入 32 位原始值 (不经过区间编码)
    pub fn encode_u32(&mut self, value: u32) -> TaoResult<()> {
        self.bits.put_u32(value)
    }

    /// 结束区间编码, 输出剩余字节
    pub fn finalize(&mut self) -> TaoResult<()> {
        self.normalize()?;
        let temp = (self.low >> SHIFT_BITS) + 1;
        if temp > 0xFF {
            self.bits.put_byte(self.buffer.wrapping_add(1) as u8)?;
            self.bits.put_repeated(0x00, self.help)?;
        } else {
            self.bits.put_byte(self.buffer as u8)?;
            self.bits.put_repeated(0xFF, self.help)?;
        }
        self.help = 0;
        self.bits.put_byte((temp & 0xFF) as u8)?;
        // 解码端在帧尾会多读几个字节
        self.bits.put_repeated(0x00, 3)?;
        Ok(())
    }

    /// 刷出全部数据并取回后端
    pub fn finish(self) -> TaoResult<W> {
        self.bits.finish()
    }
}

// ============================================================
// 解码器
// ============================================================

/// 区间解码器
pub struct RangeDecoder<R: Read> {
    bits: UnBitArray<R>,
    low: u32,
    range: u32,
    buffer: u32,
}

impl<R: Read> RangeDecoder<R> {
    /// 创建解码器
    pub fn new(source: R) -> TaoResult<Self> {
        Ok(Self {
            bits: UnBitArray::new(source)?,
            low: 0,
            range: 0,
            buffer: 0,
        })
    }

    /// 读取 32 位原始值
    pub fn decode_u32(&mut self) -> TaoResult<u32> {
        self.bits.get_u32()
    }

    /// 开始区间解码: 跳过首字节, 载入初始状态
    pub fn flush_state(&mut self) -> TaoResult<()> {
        self.bits.align_to_byte();
        self.bits.get_byte()?;
        self.buffer = u32::from(self.bits.get_byte()?);
        self.low = self.buffer >> (8 - EXTRA_BITS);
        self.range = 1 << EXTRA_BITS;
        Ok(())
    }

    fn normalize(&mut self) -> TaoResult<()> {
        while self.range <= BOTTOM_VALUE {
            self.buffer = (self.buffer << 8) | u32::from(self.bits.get_byte()?);
            self.low = (self.low << 8) | ((self.buffer >> 1) & 0xFF);
            self.range <<= 8;
        }
        Ok(())
    }

    /// 读取 `2^shift` 范围内的频率值, 不更新状态
    fn decode_fast(&mut self, shift: u32) -> TaoResult<u32> {
        self.normalize()?;
        self.range >>= shift;
        Ok(self.low / self.range)
    }

    /// 解码 `shift` 位直接编码的值
    pub fn decode_direct(&mut self, shift: u32) -> TaoResult<u32> {
        let value = self.decode_fast(shift)?;
        self.low = self.low.wrapping_sub(self.range.wrapping_mul(value));
        Ok(value)
    }

    /// 解码一个有符号残差并更新自适应状态
    pub fn decode_value(&mut self, state: &mut BitArrayState) -> TaoResult<i32> {
        let freq = self.decode_fast(RANGE_OVERFLOW_SHIFT)?;
        let mut overflow = 0usize;
        while overflow < MODEL_ELEMENTS - 1 && freq >= RANGE_TOTAL[overflow + 1] {
            overflow += 1;
        }
        self.low = self
            .low
            .wrapping_sub(self.range.wrapping_mul(RANGE_TOTAL[overflow]));
        self.range = self.range.wrapping_mul(RANGE_WIDTH[overflow]);

        let temp_k = if overflow == MODEL_ELEMENTS - 1 {
            overflow = 0;
            let k = self.decode_direct(5)?;
            if k > 31 {
                return Err(TaoError::InvalidData(format!("无效的转义位数: {k}")));
            }
            k
        } else {
            state.working_k()
        };

        let mut value = if temp_k <= 16 {
            self.decode_direct(temp_k)?
        } else {
            let low = self.decode_direct(16)?;
            let high = self.decode_direct(temp_k - 16)?;
            low | (high << 16)
        };
        value = value.wrapping_add((overflow as u32).wrapping_shl(temp_k));

        state.update(value);
        Ok(to_signed(value))
    }

    /// 帧结束, 回到字节边界
    pub fn finalize(&mut self) {
        self.bits.align_to_byte();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(values: &[i32]) {
        let mut enc = RangeEncoder::new(Vec::new());
        let mut state = BitArrayState::new();
        enc.encode_u32(0xDEAD_BEEF).unwrap();
        enc.flush_state();
        for &v in values {
            enc.encode_value(v, &mut state).unwrap();
        }
        enc.finalize().unwrap();
        let data = enc.finish().unwrap();

        let mut dec = RangeDecoder::new(data.as_slice()).unwrap();
        let mut state = BitArrayState::new();
        assert_eq!(dec.decode_u32().unwrap(), 0xDEAD_BEEF);
        dec.flush_state().unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(dec.decode_value(&mut state).unwrap(), v, "第 {i} 个值");
        }
    }

    #[test]
    fn test_频率表() {
        assert_eq!(RANGE_TOTAL[0], 0);
        assert_eq!(RANGE_TOTAL[21], 65493);
        assert_eq!(RANGE_TOTAL[22], 65494);
        assert_eq!(RANGE_TOTAL[MODEL_ELEMENTS], 65536);
        assert_eq!(RANGE_WIDTH[0], 14824);
        assert_eq!(RANGE_WIDTH[MODEL_ELEMENTS - 1], 1);
        assert_eq!(RANGE_WIDTH.iter().sum::<u32>(), 65536);
        assert_eq!(K_SUM_MIN_BOUNDARY[1], 32);
        assert_eq!(K_SUM_MIN_BOUNDARY[27], 1 << 31);
        assert_eq!(K_SUM_MIN_BOUNDARY[28], 0);
    }

    #[test]
    fn test_有符号映射() {
        for v in [0, 1, -1, 2, -2, 12345, -12345, i32::MAX, i32::MIN + 1] {
            assert_eq!(to_signed(to_unsigned(v)), v);
        }
        assert_eq!(to_unsigned(1), 1);
        assert_eq!(to_unsigned(-1), 2);
        assert_eq!(to_unsigned(0), 0);
    }

    #[test]
    fn test_小残差往返() {
        let values: Vec<i32> = (0..5000).map(|i| ((i * 37) % 41) - 20).collect();
        roundtrip(&values);
    }

    #[test]
    fn test_大残差与转义往返() {
        // 从小值突然跳到大值会触发转义符号和 k > 16 的拆分
        let mut values = vec![0; 200];
        values.extend([1 << 20, -(1 << 22), 123_456_789, -987_654_321, 1 << 29, 7]);
        values.extend((0..3000).map(|i| (i * 7919) % 300_000 - 150_000));
        values.extend([0; 100]);
        roundtrip(&values);
    }

    #[test]
    fn test_k_自适应与状态一致() {
        let mut enc_state = BitArrayState::new();
        for _ in 0..1000 {
            enc_state.update(to_unsigned(1_000_000));
        }
        assert!(enc_state.k > 10);
        for _ in 0..5000 {
            enc_state.update(0);
        }
        assert_eq!(enc_state.k, 0);
    }

    #[test]
    fn test_k_更新已知序列() {
        let mut state = BitArrayState::new();
        state.update(0);
        assert_eq!((state.k, state.k_sum), (9, 15872));
        state.update(0);
        assert_eq!((state.k, state.k_sum), (9, 15376));
    }

    fn encode_single(value: i32) -> Vec<u8> {
        let mut enc = RangeEncoder::new(Vec::new());
        let mut state = BitArrayState::new();
        enc.flush_state();
        enc.encode_value(value, &mut state).unwrap();
        enc.finalize().unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_单个值的编码字节() {
        // 首字节为占位, 随后是区间低位与结束字节, 末尾补 3 个 0
        assert_eq!(encode_single(0), [0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(encode_single(5), [0x00, 0x01, 0x05, 0x00, 0x00, 0x00]);

        let data = encode_single(5);
        let mut dec = RangeDecoder::new(data.as_slice()).unwrap();
        let mut state = BitArrayState::new();
        dec.flush_state().unwrap();
        assert_eq!(dec.decode_value(&mut state).unwrap(), 5);
    }

    #[test]
    fn test_超大残差返回错误() {
        let mut enc = RangeEncoder::new(Vec::new());
        let mut state = BitArrayState::new();
        assert!(enc.encode_value(i32::MIN, &mut state).is_err());
    }

    #[test]
    fn test_空数据解码不崩溃() {
        let mut dec = RangeDecoder::new(&[][..]).unwrap();
        let mut state = BitArrayState::new();
        dec.flush_state().unwrap();
        for _ in 0..100 {
            dec.decode_value(&mut state).unwrap();
        }
    }
}
