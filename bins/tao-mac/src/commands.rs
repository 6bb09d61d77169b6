//! 子命令实现.
//!
//! 每个命令返回 `Ok(true)` 表示成功, `Ok(false)` 表示完成但结果有问题
//! (被停止或存在损坏的帧).

use std::io::Write;
use std::path::Path;

use tao_codec::ape::CompressionLevel;
use tao_core::{TaoError, TaoResult};
use tao_format::IoContext;
use tao_format::ape::{
    ApeDecompress, ApeInfoField, CompressOptions, ProcessControl, ProcessOutcome, compress_file,
    convert_file, decompress_file, verify_file,
};
use tao_format::tags::ApeTag;

/// 输出文件存在且未指定覆盖时报错
fn check_output(output: &Path, overwrite: bool) -> TaoResult<()> {
    if !overwrite && output.exists() {
        return Err(TaoError::InvalidArgument(format!(
            "输出文件已存在 '{}', 使用 -y 覆盖",
            output.display()
        )));
    }
    Ok(())
}

/// 在 stderr 同一行刷新百分比
fn progress_printer(label: &'static str) -> ProcessControl<'static> {
    let mut last = None;
    ProcessControl::new().with_progress(move |percent| {
        if last != Some(percent) {
            last = Some(percent);
            eprint!("\r{label}: {percent:3}%");
            std::io::stderr().flush().ok();
        }
    })
}

/// 打印处理结果并换算为退出状态
fn report(outcome: &ProcessOutcome) -> bool {
    eprintln!();
    match outcome {
        ProcessOutcome::Completed {
            blocks,
            corrupt_frames,
        } => {
            if corrupt_frames.is_empty() {
                eprintln!("完成: {blocks} 块");
                true
            } else {
                eprintln!(
                    "完成: {blocks} 块, {} 个帧校验失败: {corrupt_frames:?}",
                    corrupt_frames.len()
                );
                false
            }
        }
        ProcessOutcome::Stopped => {
            eprintln!("已停止");
            false
        }
    }
}

pub fn compress(
    input: &Path,
    output: &Path,
    level: CompressionLevel,
    overwrite: bool,
) -> TaoResult<bool> {
    check_output(output, overwrite)?;
    let options = CompressOptions {
        level,
        ..Default::default()
    };
    let outcome = compress_file(input, output, options, &mut progress_printer("压缩"))?;
    Ok(report(&outcome))
}

pub fn decompress(input: &Path, output: &Path, overwrite: bool) -> TaoResult<bool> {
    check_output(output, overwrite)?;
    let outcome = decompress_file(input, output, &mut progress_printer("解压"))?;
    Ok(report(&outcome))
}

pub fn verify(input: &Path) -> TaoResult<bool> {
    let outcome = verify_file(input, &mut progress_printer("校验"))?;
    Ok(report(&outcome))
}

pub fn convert(
    input: &Path,
    output: &Path,
    level: CompressionLevel,
    overwrite: bool,
) -> TaoResult<bool> {
    check_output(output, overwrite)?;
    if input == output {
        return Err(TaoError::InvalidArgument("输入与输出不能是同一个文件".into()));
    }
    let options = CompressOptions {
        level,
        ..Default::default()
    };
    let outcome = convert_file(input, output, options, &mut progress_printer("转换"))?;
    Ok(report(&outcome))
}

pub fn info(input: &Path) -> TaoResult<bool> {
    let dec = ApeDecompress::open(input)?;
    let get = |field| dec.get_info(field).unwrap_or(0);
    let level = CompressionLevel::from_u16(get(ApeInfoField::CompressionLevel) as u16)?;

    println!("文件: {}", input.display());
    println!(
        "版本: {:.2}",
        get(ApeInfoField::FileVersion) as f64 / 1000.0
    );
    println!("压缩级别: {level}");
    println!("格式: {}", dec.format());
    println!(
        "时长: {}.{:03} 秒 ({} 块)",
        get(ApeInfoField::DecompressLengthMs) / 1000,
        get(ApeInfoField::DecompressLengthMs) % 1000,
        get(ApeInfoField::DecompressTotalBlocks)
    );
    println!(
        "帧: {} x {} 块, 末帧 {} 块",
        get(ApeInfoField::TotalFrames),
        get(ApeInfoField::BlocksPerFrame),
        get(ApeInfoField::FinalFrameBlocks)
    );
    println!(
        "WAV: 头部 {} 字节, 数据 {} 字节, 尾部 {} 字节",
        get(ApeInfoField::WavHeaderBytes),
        get(ApeInfoField::WavDataBytes),
        get(ApeInfoField::WavTerminatingBytes)
    );
    let ape_bytes = get(ApeInfoField::ApeTotalBytes);
    let wav_bytes = get(ApeInfoField::WavTotalBytes);
    if wav_bytes > 0 {
        println!(
            "APE: {ape_bytes} 字节 ({:.2}%), 平均码率 {} kbps",
            ape_bytes as f64 * 100.0 / wav_bytes as f64,
            get(ApeInfoField::AverageBitrate)
        );
    }
    println!("峰值: {}", get(ApeInfoField::PeakLevel));
    print_tag(dec.tag());
    Ok(true)
}

fn print_tag(tag: &ApeTag) {
    if tag.fields().is_empty() {
        return;
    }
    let source = if tag.version() == 0 { "ID3v1" } else { "APE" };
    println!("标签 ({source}):");
    for field in tag.fields() {
        match field.as_text() {
            Some(text) => println!("  {}: {text}", field.name()),
            None => println!("  {}: <{} 字节>", field.name(), field.value().len()),
        }
    }
}

pub fn tag(input: &Path, set: &[String], clear: bool, id3v1: bool) -> TaoResult<bool> {
    let mut io = IoContext::open_read_write(input)?;
    let mut tag = ApeTag::analyze(&mut io)?;
    if set.is_empty() && !clear && !id3v1 {
        print_tag(&tag);
        return Ok(true);
    }

    if clear {
        tag.clear_fields();
    }
    for item in set {
        let (name, value) = item
            .split_once('=')
            .ok_or_else(|| TaoError::InvalidArgument(format!("无效的字段设置: {item}")))?;
        tag.set_text(name.trim(), value);
    }
    tag.save(&mut io, id3v1)?;
    io.flush()?;
    print_tag(&tag);
    Ok(true)
}
