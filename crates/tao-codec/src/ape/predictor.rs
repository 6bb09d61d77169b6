//! 预测器级联.
//!
//! 每个声道一个预测器, 压缩方向依次为:
//! 一阶定标滤波 (31/5) -> 自适应线性预测 -> NN 滤波级联.
//! 解压方向严格相反. 两个版本的差异以封闭枚举 [`Predictor`] 表达.

use tao_core::TaoResult;

use super::CompressionLevel;
use super::nnfilter::NNFilter;
use super::roll_buffer::RollBuffer;

/// 预测缓冲的滚动窗口
const WINDOW_BLOCKS: usize = 512;
/// 预测缓冲的历史长度
const HISTORY_ELEMENTS: usize = 8;

/// 自适应预测的初始权重
const INITIAL_WEIGHTS: [i32; 4] = [360, 317, -109, 98];

/// 按版本与压缩级别选择的预测器
#[derive(Debug, Clone)]
pub enum Predictor {
    /// 3930 ~ 3949: 单通道 4 阶预测, 无交叉项
    Legacy3930(Legacy3930),
    /// 3950 及以上: 4 阶自身预测 + 5 阶交叉预测
    Current3950(Current3950),
}

impl Predictor {
    /// 根据版本与级别创建预测器
    pub fn new(version: u16, level: CompressionLevel) -> TaoResult<Self> {
        let filters = level
            .nn_filters(version)?
            .iter()
            .map(|&(order, shift)| NNFilter::new(order, shift))
            .collect();
        Ok(if version >= 3950 {
            Self::Current3950(Current3950::new(filters))
        } else {
            Self::Legacy3930(Legacy3930::new(filters))
        })
    }

    /// 帧开始时重置全部状态
    pub fn flush(&mut self) {
        match self {
            Self::Legacy3930(p) => p.flush(),
            Self::Current3950(p) => p.flush(),
        }
    }

    /// 压缩一个值, `b` 为交叉通道输入 (旧版本忽略)
    #[inline]
    pub fn compress(&mut self, a: i32, b: i32) -> i32 {
        match self {
            Self::Legacy3930(p) => p.compress(a),
            Self::Current3950(p) => p.compress(a, b),
        }
    }

    /// 解压一个值, `b` 为交叉通道输入 (旧版本忽略)
    #[inline]
    pub fn decompress(&mut self, a: i32, b: i32) -> i32 {
        match self {
            Self::Legacy3930(p) => p.decompress(a),
            Self::Current3950(p) => p.decompress(a, b),
        }
    }
}

// ============================================================
// 一阶定标滤波
// ============================================================

/// `x - last * 31 / 32` 形式的一阶滤波
#[derive(Debug, Clone, Copy, Default)]
struct ScaledFirstOrderFilter {
    last: i32,
}

impl ScaledFirstOrderFilter {
    #[inline]
    fn compress(&mut self, value: i32) -> i32 {
        let out = value.wrapping_sub(self.last.wrapping_mul(31) >> 5);
        self.last = value;
        out
    }

    #[inline]
    fn decompress(&mut self, value: i32) -> i32 {
        self.last = value.wrapping_add(self.last.wrapping_mul(31) >> 5);
        self.last
    }
}

/// 非零值的符号权重: 负数 +1, 正数 -1, 零为 0
#[inline]
fn sign_adapt(value: i32) -> i32 {
    if value == 0 {
        0
    } else {
        ((value >> 30) & 2) - 1
    }
}

// ============================================================
// 3950 及以上
// ============================================================

/// 3950 及以上版本的预测器
#[derive(Debug, Clone)]
pub struct Current3950 {
    stage1_a: ScaledFirstOrderFilter,
    stage1_b: ScaledFirstOrderFilter,
    prediction_a: RollBuffer<i32>,
    prediction_b: RollBuffer<i32>,
    adapt_a: RollBuffer<i32>,
    adapt_b: RollBuffer<i32>,
    weights_a: [i32; 4],
    weights_b: [i32; 5],
    last_value_a: i32,
    filters: Vec<NNFilter>,
}

impl Current3950 {
    fn new(filters: Vec<NNFilter>) -> Self {
        let mut p = Self {
            stage1_a: ScaledFirstOrderFilter::default(),
            stage1_b: ScaledFirstOrderFilter::default(),
            prediction_a: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            prediction_b: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            adapt_a: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            adapt_b: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            weights_a: INITIAL_WEIGHTS,
            weights_b: [0; 5],
            last_value_a: 0,
            filters,
        };
        p.flush();
        p
    }

    fn flush(&mut self) {
        self.stage1_a = ScaledFirstOrderFilter::default();
        self.stage1_b = ScaledFirstOrderFilter::default();
        self.prediction_a.flush();
        self.prediction_b.flush();
        self.adapt_a.flush();
        self.adapt_b.flush();
        self.weights_a = INITIAL_WEIGHTS;
        self.weights_b = [0; 5];
        self.last_value_a = 0;
        for f in &mut self.filters {
            f.flush();
        }
    }

    /// 载入本次的预测历史, 返回 `(pred_a + pred_b / 2) >> 10`
    #[inline]
    fn predict(&mut self, b: i32) -> i32 {
        let pa = &mut self.prediction_a;
        pa.set(self.last_value_a);
        pa.set_back(1, pa.get().wrapping_sub(pa.back(1)));

        let pb = &mut self.prediction_b;
        pb.set(self.stage1_b.compress(b));
        pb.set_back(1, pb.get().wrapping_sub(pb.back(1)));

        let mut prediction_a = 0i32;
        for (i, &w) in self.weights_a.iter().enumerate() {
            prediction_a = prediction_a.wrapping_add(self.prediction_a.back(i).wrapping_mul(w));
        }
        let mut prediction_b = 0i32;
        for (i, &w) in self.weights_b.iter().enumerate() {
            prediction_b = prediction_b.wrapping_add(self.prediction_b.back(i).wrapping_mul(w));
        }
        prediction_a.wrapping_add(prediction_b >> 1) >> 10
    }

    /// 依据残差符号调整权重并前进
    #[inline]
    fn adapt(&mut self, residual: i32) {
        self.adapt_a.set(sign_adapt(self.prediction_a.get()));
        self.adapt_a.set_back(1, sign_adapt(self.prediction_a.back(1)));
        self.adapt_b.set(sign_adapt(self.prediction_b.get()));
        self.adapt_b.set_back(1, sign_adapt(self.prediction_b.back(1)));

        if residual > 0 {
            for (i, w) in self.weights_a.iter_mut().enumerate() {
                *w = w.wrapping_sub(self.adapt_a.back(i));
            }
            for (i, w) in self.weights_b.iter_mut().enumerate() {
                *w = w.wrapping_sub(self.adapt_b.back(i));
            }
        } else if residual < 0 {
            for (i, w) in self.weights_a.iter_mut().enumerate() {
                *w = w.wrapping_add(self.adapt_a.back(i));
            }
            for (i, w) in self.weights_b.iter_mut().enumerate() {
                *w = w.wrapping_add(self.adapt_b.back(i));
            }
        }

        self.prediction_a.increment();
        self.prediction_b.increment();
        self.adapt_a.increment();
        self.adapt_b.increment();
    }

    fn compress(&mut self, a: i32, b: i32) -> i32 {
        let current = self.stage1_a.compress(a);
        let residual = current.wrapping_sub(self.predict(b));
        self.adapt(residual);
        self.last_value_a = current;

        self.filters
            .iter_mut()
            .fold(residual, |value, f| f.compress(value))
    }

    fn decompress(&mut self, a: i32, b: i32) -> i32 {
        let residual = self
            .filters
            .iter_mut()
            .rev()
            .fold(a, |value, f| f.decompress(value));

        let current = residual.wrapping_add(self.predict(b));
        self.adapt(residual);
        self.last_value_a = current;
        self.stage1_a.decompress(current)
    }
}

// ============================================================
// 3930 ~ 3949
// ============================================================

/// 3930 ~ 3949 版本的预测器
#[derive(Debug, Clone)]
pub struct Legacy3930 {
    buffer: RollBuffer<i32>,
    weights: [i32; 4],
    last_value: i32,
    filters: Vec<NNFilter>,
}

impl Legacy3930 {
    fn new(filters: Vec<NNFilter>) -> Self {
        Self {
            buffer: RollBuffer::new(WINDOW_BLOCKS, HISTORY_ELEMENTS),
            weights: INITIAL_WEIGHTS,
            last_value: 0,
            filters,
        }
    }

    fn flush(&mut self) {
        self.buffer.flush();
        self.weights = INITIAL_WEIGHTS;
        self.last_value = 0;
        for f in &mut self.filters {
            f.flush();
        }
    }

    /// 计算预测值, 返回 `(预测, [p1, p2, p3, p4])`
    #[inline]
    fn predict(&self) -> (i32, [i32; 4]) {
        let b = &self.buffer;
        let p = [
            b.back(1),
            b.back(1).wrapping_sub(b.back(2)),
            b.back(2).wrapping_sub(b.back(3)),
            b.back(3).wrapping_sub(b.back(4)),
        ];
        let mut sum = 0i32;
        for (&v, &w) in p.iter().zip(&self.weights) {
            sum = sum.wrapping_add(v.wrapping_mul(w));
        }
        (sum >> 9, p)
    }

    #[inline]
    fn adapt(&mut self, residual: i32, p: [i32; 4]) {
        let steps = [
            ((p[0] >> 30) & 2) - 1,
            ((p[1] >> 28) & 8) - 4,
            ((p[2] >> 28) & 8) - 4,
            ((p[3] >> 28) & 8) - 4,
        ];
        if residual > 0 {
            for (w, s) in self.weights.iter_mut().zip(steps) {
                *w = w.wrapping_sub(s);
            }
        } else if residual < 0 {
            for (w, s) in self.weights.iter_mut().zip(steps) {
                *w = w.wrapping_add(s);
            }
        }
    }

    fn compress(&mut self, a: i32) -> i32 {
        let current = a.wrapping_sub(self.last_value.wrapping_mul(31) >> 5);
        self.last_value = a;

        let (prediction, p) = self.predict();
        let residual = current.wrapping_sub(prediction);
        self.buffer.set(current);
        self.adapt(residual, p);
        self.buffer.increment();

        self.filters
            .iter_mut()
            .fold(residual, |value, f| f.compress(value))
    }

    fn decompress(&mut self, a: i32) -> i32 {
        let residual = self
            .filters
            .iter_mut()
            .rev()
            .fold(a, |value, f| f.decompress(value));

        let (prediction, p) = self.predict();
        let current = residual.wrapping_add(prediction);
        self.buffer.set(current);
        self.adapt(residual, p);
        self.buffer.increment();

        let out = current.wrapping_add(self.last_value.wrapping_mul(31) >> 5);
        self.last_value = out;
        out
    }
}
