//! Monkey's Audio 文件层.
//!
//! - [`header`]: 文件描述结构与 seek 表
//! - [`link`]: `.apl` 链接文件
//! - [`compress`] / [`decompress`]: 流式压缩与按块解压
//! - [`driver`]: 文件到文件的压缩、解压、校验与转换

pub mod compress;
pub mod decompress;
pub mod driver;
pub mod header;
pub mod link;

pub use compress::{ApeCompress, CompressOptions, InputSource, WavInputSource};
pub use decompress::{ApeDecompress, ApeInfoField, DecompressOptions};
pub use driver::{
    KillFlag, KillState, ProcessControl, ProcessOutcome, ProgressCallback, compress_file,
    convert_file, decompress_file, verify_file,
};
pub use header::{ApeFileInfo, ApeHeader, FormatFlags};
pub use link::ApeLink;

/// 逐个 32 位字翻转字节序 (文件中的小端字 <-> 编解码器的高位在前字节流)
///
/// 末尾不足 4 字节的部分保持不变.
pub(crate) fn swap_word_bytes(buf: &mut [u8]) {
    for word in buf.chunks_exact_mut(4) {
        word.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_按字翻转() {
        let mut buf = vec![1, 2, 3, 4, 5, 6, 7, 8, 9];
        swap_word_bytes(&mut buf);
        assert_eq!(buf, vec![4, 3, 2, 1, 8, 7, 6, 5, 9]);
    }
}
