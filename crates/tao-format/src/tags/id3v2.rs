//! ID3v2 标签跳过.
//!
//! 只计算文件开头 ID3v2 标签占用的字节数, 不解析其内容.

use std::io::SeekFrom;

use log::debug;
use tao_core::TaoResult;

use crate::io::IoContext;

/// ID3v2 标签头长度
pub const ID3V2_HEADER_SIZE: usize = 10;

/// 标签头中的 footer 标志
const FLAG_FOOTER_PRESENT: u8 = 0x10;

/// 从 10 字节标签头计算整个标签的长度 (含头部与可选 footer)
///
/// 不是 ID3v2 头部或大小字段不是合法的 syncsafe 整数时返回 `None`.
pub fn parse_id3v2_size(header: &[u8]) -> Option<u64> {
    if header.len() < ID3V2_HEADER_SIZE || &header[0..3] != b"ID3" {
        return None;
    }
    let size_bytes = &header[6..10];
    if size_bytes.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    let size = size_bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 7) | u64::from(b));
    let footer = if header[5] & FLAG_FOOTER_PRESENT != 0 {
        ID3V2_HEADER_SIZE as u64
    } else {
        0
    };
    Some(ID3V2_HEADER_SIZE as u64 + size + footer)
}

/// 跳过文件开头的 ID3v2 标签及其后的零填充
///
/// 返回跳过的总字节数, 读取位置停在其后. 没有标签时位置回到 0 并返回 0.
pub fn skip_id3v2(io: &mut IoContext) -> TaoResult<u64> {
    io.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; ID3V2_HEADER_SIZE];
    let read = io.read_up_to(&mut header)?;
    let Some(tag_size) = parse_id3v2_size(&header[..read]) else {
        io.seek(SeekFrom::Start(0))?;
        return Ok(0);
    };

    if io.size().is_some_and(|size| tag_size > size) {
        debug!("ID3v2 声明长度 {tag_size} 超出文件大小, 视为无标签");
        io.seek(SeekFrom::Start(0))?;
        return Ok(0);
    }

    io.seek(SeekFrom::Start(tag_size))?;
    let mut skipped = tag_size;
    loop {
        match io.read_u8() {
            Ok(0) => skipped += 1,
            Ok(_) => break,
            Err(e) if e.is_eof() => break,
            Err(e) => return Err(e),
        }
    }
    io.seek(SeekFrom::Start(skipped))?;

    debug!("跳过 ID3v2 标签: {skipped} 字节 (标签 {tag_size} 字节)");
    Ok(skipped)
}
