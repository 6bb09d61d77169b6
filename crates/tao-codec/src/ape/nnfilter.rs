//! NN 滤波器.
//!
//! 符号-符号 LMS 自适应 FIR 滤波: 以 16 位饱和历史输入与 16 位权重做 `order` 阶点积,
//! 按 `1 << (shift - 1)` 舍入后右移, 权重依据输出符号加减增量历史.
//! 增量按原始信号符号取 ±4, 第 4 与第 8 个历史增量随后减半.

use super::roll_buffer::RollBuffer;

/// 滚动窗口大小
const NN_WINDOW_ELEMENTS: usize = 512;

/// NN 滤波器
#[derive(Debug, Clone)]
pub struct NNFilter {
    order: usize,
    shift: u32,
    weights: Vec<i16>,
    input: RollBuffer<i16>,
    delta: RollBuffer<i16>,
}

impl NNFilter {
    /// 创建滤波器, `order` 必须是 16 的倍数
    pub fn new(order: usize, shift: u32) -> Self {
        debug_assert!(order >= 16 && order % 16 == 0);
        Self {
            order,
            shift,
            weights: vec![0; order],
            input: RollBuffer::new(NN_WINDOW_ELEMENTS, order),
            delta: RollBuffer::new(NN_WINDOW_ELEMENTS, order),
        }
    }

    /// 清零历史与权重
    pub fn flush(&mut self) {
        self.weights.fill(0);
        self.input.flush();
        self.delta.flush();
    }

    /// 压缩方向: 输出 = 输入 - 预测
    pub fn compress(&mut self, value: i32) -> i32 {
        self.input.set(saturate_i16(value));

        let dot = dot_product(self.input.history(self.order), &self.weights);
        let output = value.wrapping_sub(self.rounded(dot));

        adapt(&mut self.weights, self.delta.history(self.order), output);
        self.update_delta(value);
        output
    }

    /// 解压方向: 输出 = 输入 + 预测
    pub fn decompress(&mut self, value: i32) -> i32 {
        let dot = dot_product(self.input.history(self.order), &self.weights);
        adapt(&mut self.weights, self.delta.history(self.order), value);

        let output = value.wrapping_add(self.rounded(dot));
        self.input.set(saturate_i16(output));
        self.update_delta(output);
        output
    }

    #[inline]
    fn rounded(&self, dot: i32) -> i32 {
        dot.wrapping_add(1 << (self.shift - 1)) >> self.shift
    }

    /// 写入新的增量 (正数 -4, 负数 +4, 零为 0), 衰减较早的两个增量, 然后前进
    fn update_delta(&mut self, value: i32) {
        let delta = if value == 0 {
            0
        } else {
            ((value >> 28) & 8) - 4
        };
        self.delta.set(delta as i16);

        for back in [4, 8] {
            let d = self.delta.back(back);
            self.delta.set_back(back, d >> 1);
        }

        self.input.increment();
        self.delta.increment();
    }
}

/// 饱和转换为 16 位
#[inline]
fn saturate_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// 16 位点积, 32 位环绕累加
#[inline]
fn dot_product(input: &[i16], weights: &[i16]) -> i32 {
    input
        .iter()
        .zip(weights)
        .fold(0i32, |acc, (&a, &b)| acc.wrapping_add(i32::from(a) * i32::from(b)))
}

/// 符号-符号权重调整: 方向为负时加增量, 为正时减增量
#[inline]
fn adapt(weights: &mut [i16], deltas: &[i16], direction: i32) {
    if direction < 0 {
        for (w, &d) in weights.iter_mut().zip(deltas) {
            *w = w.wrapping_add(d);
        }
    } else if direction > 0 {
        for (w, &d) in weights.iter_mut().zip(deltas) {
            *w = w.wrapping_sub(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(n: usize) -> Vec<i32> {
        (0..n)
            .map(|i| {
                let t = i as f64 / 44100.0;
                ((t * 440.0 * std::f64::consts::TAU).sin() * 12000.0
                    + (t * 3100.0 * std::f64::consts::TAU).sin() * 3000.0) as i32
            })
            .collect()
    }

    #[test]
    fn test_压缩解压往返() {
        for &(order, shift) in &[(16, 11), (64, 11), (256, 13), (32, 10), (1280, 15)] {
            let mut enc = NNFilter::new(order, shift);
            let mut dec = NNFilter::new(order, shift);
            for (i, &x) in test_signal(3000).iter().enumerate() {
                let r = enc.compress(x);
                assert_eq!(dec.decompress(r), x, "order={order} 第 {i} 个采样");
            }
        }
    }

    #[test]
    fn test_16阶已知序列() {
        let inputs = [1000, 2000, 3000, 0, -1000];
        let mut f = NNFilter::new(16, 11);
        let outputs: Vec<i32> = inputs.iter().map(|&x| f.compress(x)).collect();
        assert_eq!(outputs, [1000, 2000, 2996, -16, -996]);
        assert_eq!(&f.weights[12..], &[-4, -8, -4, 4]);
        assert!(f.weights[..12].iter().all(|&w| w == 0));

        // 最新在前: 负数 +4, 零 0, 正数 -4; 第 1 个增量已在第 5 步减半
        let deltas: Vec<i16> = (1..=6).map(|back| f.delta.back(back)).collect();
        assert_eq!(deltas, [4, 0, -4, -4, -2, 0]);

        let mut dec = NNFilter::new(16, 11);
        let restored: Vec<i32> = outputs.iter().map(|&r| dec.decompress(r)).collect();
        assert_eq!(restored, inputs);
        assert_eq!(dec.weights, f.weights);
    }

    #[test]
    fn test_增量只取正负4() {
        let mut f = NNFilter::new(16, 11);
        f.compress(1000);
        assert_eq!(f.delta.back(1), -4);
        f.compress(-70000);
        assert_eq!(f.delta.back(1), 4);
        f.compress(0);
        assert_eq!(f.delta.back(1), 0);
    }

    #[test]
    fn test_超出16位范围的输入也可逆() {
        let mut enc = NNFilter::new(16, 11);
        let mut dec = NNFilter::new(16, 11);
        let values: Vec<i32> = (0..2000).map(|i| (i * 104_729 % 2_000_000) - 1_000_000).collect();
        for &x in &values {
            assert_eq!(dec.decompress(enc.compress(x)), x);
        }
    }

    #[test]
    fn test_flush_恢复初态() {
        let mut a = NNFilter::new(16, 11);
        for x in test_signal(100) {
            a.compress(x);
        }
        a.flush();
        let mut b = NNFilter::new(16, 11);
        for x in test_signal(50) {
            assert_eq!(a.compress(x), b.compress(x));
        }
    }
}
