//! 32 位字缓冲的位数组.
//!
//! 码流按"逻辑字节"顺序组织: 每个 32 位字从最高字节开始填充. 容器负责把逻辑字节
//! 与文件中的小端字相互转换, 这里只处理逻辑顺序.
//!
//! - [`BitArray`]: 写入端, 写游标超过 `总位数 - 128` 时把完整的字刷出到后端,
//!   未写满的最后一个字保留在缓冲区开头继续填充.
//! - [`UnBitArray`]: 读取端, 读游标距缓冲区末尾不足 512 位时从后端补充数据,
//!   后端耗尽后以 0 填充.

use std::io::{Read, Write};

use tao_core::TaoResult;

/// 缓冲区字数 (16 KB)
pub const BIT_ARRAY_WORDS: usize = 4096;
/// 缓冲区总位数
const BIT_ARRAY_BITS: usize = BIT_ARRAY_WORDS * 32;
/// 写入端刷新余量
const FLUSH_MARGIN_BITS: usize = 128;
/// 读取端补充余量
const REFILL_MARGIN_BITS: usize = 512;

// ============================================================
// 写入端
// ============================================================

/// 位数组写入端
pub struct BitArray<W: Write> {
    /// 字缓冲
    words: Vec<u32>,
    /// 当前写入位置 (位)
    bit_index: usize,
    /// 已刷出到后端的字节数
    flushed_bytes: u64,
    /// 后端
    sink: W,
}

impl<W: Write> BitArray<W> {
    /// 创建写入端
    pub fn new(sink: W) -> Self {
        Self {
            words: vec![0; BIT_ARRAY_WORDS],
            bit_index: 0,
            flushed_bytes: 0,
            sink,
        }
    }

    /// 当前逻辑字节位置 (含已刷出部分)
    pub fn byte_position(&self) -> u64 {
        self.flushed_bytes + (self.bit_index / 8) as u64
    }

    /// 写入一个字节
    #[inline]
    pub fn put_byte(&mut self, value: u8) -> TaoResult<()> {
        if self.bit_index + 8 > BIT_ARRAY_BITS {
            self.flush_words()?;
        }
        let idx = self.bit_index;
        self.words[idx >> 5] |= u32::from(value) << (24 - (idx & 31));
        self.bit_index += 8;
        Ok(())
    }

    /// 写入 n 个相同字节
    pub fn put_repeated(&mut self, value: u8, count: u32) -> TaoResult<()> {
        for _ in 0..count {
            self.put_byte(value)?;
        }
        Ok(())
    }

    /// 写入 32 位原始数据 (高位在前)
    pub fn put_u32(&mut self, value: u32) -> TaoResult<()> {
        if self.bit_index + 32 > BIT_ARRAY_BITS {
            self.flush_words()?;
        }
        let idx = self.bit_index >> 5;
        let shift = self.bit_index & 31;
        if shift == 0 {
            self.words[idx] = value;
        } else {
            self.words[idx] |= value >> shift;
            self.words[idx + 1] = value << (32 - shift);
        }
        self.bit_index += 32;
        Ok(())
    }

    /// 对齐到字节边界
    pub fn align_to_byte(&mut self) {
        self.bit_index = (self.bit_index + 7) & !7;
    }

    /// 写游标超过刷新阈值时把完整的字刷出到后端
    pub fn ensure_room(&mut self) -> TaoResult<()> {
        if self.bit_index > BIT_ARRAY_BITS - FLUSH_MARGIN_BITS {
            self.flush_words()?;
        }
        Ok(())
    }

    /// 刷出所有完整的字, 保留最后一个未写满的字
    fn flush_words(&mut self) -> TaoResult<()> {
        let full = self.bit_index >> 5;
        if full == 0 {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(full * 4);
        for word in &self.words[..full] {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        self.sink.write_all(&bytes)?;
        self.flushed_bytes += bytes.len() as u64;

        let partial = if full < self.words.len() {
            self.words[full]
        } else {
            0
        };
        self.words.fill(0);
        self.words[0] = partial;
        self.bit_index &= 31;
        Ok(())
    }

    /// 刷出全部已写入的完整字节并取回后端
    ///
    /// 调用前应保证游标位于字节边界, 未满字节的剩余位会被丢弃.
    pub fn finish(mut self) -> TaoResult<W> {
        self.flush_words()?;
        let tail_bytes = self.bit_index / 8;
        if tail_bytes > 0 {
            let word = self.words[0].to_be_bytes();
            self.sink.write_all(&word[..tail_bytes])?;
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}

// ============================================================
// 读取端
// ============================================================

/// 位数组读取端
pub struct UnBitArray<R: Read> {
    /// 字缓冲
    words: Vec<u32>,
    /// 当前读取位置 (位)
    bit_index: usize,
    /// 后端
    source: R,
    /// 后端是否已耗尽
    exhausted: bool,
}

impl<R: Read> UnBitArray<R> {
    /// 创建读取端并预读一个缓冲区
    pub fn new(source: R) -> TaoResult<Self> {
        let mut ub = Self {
            words: vec![0; BIT_ARRAY_WORDS],
            bit_index: 0,
            source,
            exhausted: false,
        };
        ub.fill_from(0)?;
        Ok(ub)
    }

    /// 读取一个字节, 越过数据末尾时返回 0
    #[inline]
    pub fn get_byte(&mut self) -> TaoResult<u8> {
        if self.bit_index + REFILL_MARGIN_BITS > BIT_ARRAY_BITS {
            self.refill()?;
        }
        let idx = self.bit_index;
        let value = (self.words[idx >> 5] >> (24 - (idx & 31))) as u8;
        self.bit_index += 8;
        Ok(value)
    }

    /// 读取 32 位原始数据 (高位在前)
    pub fn get_u32(&mut self) -> TaoResult<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | u32::from(self.get_byte()?);
        }
        Ok(value)
    }

    /// 对齐到字节边界
    pub fn align_to_byte(&mut self) {
        self.bit_index = (self.bit_index + 7) & !7;
    }

    /// 把未读部分移到缓冲区开头并补充新数据
    fn refill(&mut self) -> TaoResult<()> {
        let start = self.bit_index >> 5;
        self.words.copy_within(start.., 0);
        let kept = self.words.len() - start;
        self.bit_index &= 31;
        self.fill_from(kept)
    }

    /// 从后端读取数据填充 `words[first..]`
    fn fill_from(&mut self, first: usize) -> TaoResult<()> {
        let mut bytes = vec![0u8; (self.words.len() - first) * 4];
        let mut filled = 0;
        while !self.exhausted && filled < bytes.len() {
            let n = self.source.read(&mut bytes[filled..])?;
            if n == 0 {
                self.exhausted = true;
            }
            filled += n;
        }
        for (word, chunk) in self.words[first..].iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_写入读取_跨越刷新边界() {
        let total = BIT_ARRAY_WORDS * 4 * 3 + 7;
        let mut ba = BitArray::new(Vec::new());
        for i in 0..total {
            ba.ensure_room().unwrap();
            ba.put_byte((i * 31 % 251) as u8).unwrap();
        }
        assert_eq!(ba.byte_position(), total as u64);
        let out = ba.finish().unwrap();
        assert_eq!(out.len(), total);

        let mut ub = UnBitArray::new(out.as_slice()).unwrap();
        for i in 0..total {
            assert_eq!(ub.get_byte().unwrap(), (i * 31 % 251) as u8, "字节 {i}");
        }
        // 越过末尾返回 0
        assert_eq!(ub.get_u32().unwrap(), 0);
    }

    #[test]
    fn test_u32_非对齐写入() {
        let mut ba = BitArray::new(Vec::new());
        ba.put_byte(0xAB).unwrap();
        ba.put_u32(0x1234_5678).unwrap();
        ba.put_byte(0xCD).unwrap();
        let out = ba.finish().unwrap();
        assert_eq!(out, vec![0xAB, 0x12, 0x34, 0x56, 0x78, 0xCD]);

        let mut ub = UnBitArray::new(out.as_slice()).unwrap();
        assert_eq!(ub.get_byte().unwrap(), 0xAB);
        assert_eq!(ub.get_u32().unwrap(), 0x1234_5678);
        assert_eq!(ub.get_byte().unwrap(), 0xCD);
    }
}
