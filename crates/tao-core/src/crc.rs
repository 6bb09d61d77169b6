//! CRC 校验和计算.
//!
//! 提供 IEEE CRC-32 (反射多项式 0xEDB88320) 的查表实现, 用于 APE 帧校验.
//! 既可一次性计算, 也可通过 [`Crc32`] 增量累积.

/// CRC-32 查找表 (反射多项式 0xEDB88320)
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// 增量 CRC-32 累加器
///
/// 初始值 0xFFFFFFFF, 结束时取反, 与 zlib/PNG 的 CRC-32 一致.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    /// 创建新的累加器
    pub const fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    /// 累积一段字节
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &byte in data {
            crc = (crc >> 8) ^ CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize];
        }
        self.state = crc;
    }

    /// 累积单个字节
    #[inline]
    pub fn update_byte(&mut self, byte: u8) {
        self.state = (self.state >> 8) ^ CRC32_TABLE[((self.state ^ byte as u32) & 0xFF) as usize];
    }

    /// 获取最终 CRC 值 (不消耗累加器)
    pub const fn finish(&self) -> u32 {
        self.state ^ 0xFFFF_FFFF
    }

    /// 重置为初始状态
    pub fn reset(&mut self) {
        self.state = 0xFFFF_FFFF;
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// 计算 CRC-32
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty_data() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_crc32_known_value() {
        // 标准校验向量 "123456789"
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_crc32_增量与一次性一致() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 + 3) as u8).collect();
        let mut crc = Crc32::new();
        for chunk in data.chunks(37) {
            crc.update(chunk);
        }
        assert_eq!(crc.finish(), crc32(&data));

        let mut single = Crc32::new();
        for &b in &data {
            single.update_byte(b);
        }
        assert_eq!(single.finish(), crc32(&data));
    }

    #[test]
    fn test_crc32_reset() {
        let mut crc = Crc32::new();
        crc.update(b"abc");
        crc.reset();
        assert_eq!(crc, Crc32::new());
    }
}
