//! 滚动缓冲区.
//!
//! 固定窗口 + 历史区的线性缓冲, 游标到达末尾时把最近的历史元素复制回开头,
//! 对使用者而言等价于一段无限长、初值为 0 的历史.

/// 滚动缓冲区
#[derive(Debug, Clone)]
pub struct RollBuffer<T: Copy + Default> {
    data: Vec<T>,
    history: usize,
    current: usize,
}

impl<T: Copy + Default> RollBuffer<T> {
    /// 创建缓冲区, `window` 为滚动间隔, `history` 为可回看的元素数
    pub fn new(window: usize, history: usize) -> Self {
        Self {
            data: vec![T::default(); window + history],
            history,
            current: history,
        }
    }

    /// 清零并回到起点
    pub fn flush(&mut self) {
        self.data.fill(T::default());
        self.current = self.history;
    }

    /// 读取相对当前位置 `-back` 处的元素
    #[inline]
    pub fn back(&self, back: usize) -> T {
        self.data[self.current - back]
    }

    /// 当前位置的元素
    #[inline]
    pub fn get(&self) -> T {
        self.data[self.current]
    }

    /// 写入当前位置
    #[inline]
    pub fn set(&mut self, value: T) {
        self.data[self.current] = value;
    }

    /// 写入相对当前位置 `-back` 处
    #[inline]
    pub fn set_back(&mut self, back: usize, value: T) {
        self.data[self.current - back] = value;
    }

    /// 以当前位置结尾的最近 `len` 个历史元素 (不含当前位置)
    #[inline]
    pub fn history(&self, len: usize) -> &[T] {
        &self.data[self.current - len..self.current]
    }

    /// 前进一个元素, 到达末尾时滚动
    #[inline]
    pub fn increment(&mut self) {
        self.current += 1;
        if self.current == self.data.len() {
            let from = self.current - self.history;
            self.data.copy_within(from..self.current, 0);
            self.current = self.history;
        }
    }
}
