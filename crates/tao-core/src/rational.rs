//! 有理数类型, 用于时间基 (time_base).
//!
//! APE 流的时间基固定为 1/采样率, 时间戳以块 (block) 计数.

use std::fmt;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 有理数, 由分子和分母组成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 将以本时间基计数的值换算为毫秒 (向下取整)
    pub fn to_millis(self, value: i64) -> i64 {
        if self.den == 0 {
            return 0;
        }
        let ms = value as i128 * i128::from(self.num) * 1000 / i128::from(self.den);
        ms as i64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
