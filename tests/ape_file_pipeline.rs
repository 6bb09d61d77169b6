//! 端到端集成测试: 文件级压缩、解压、校验、转换、标签与链接文件.
//!
//! 测试流程: 生成 WAV 文件 → compress_file → decompress_file → 与原文件逐字节比较

use std::path::{Path, PathBuf};

use tao_ape::codec::ape::{CompressionLevel, WaveFormat};
use tao_ape::format::IoContext;
use tao_ape::format::ape::{
    ApeDecompress, ApeInfoField, ApeLink, CompressOptions, KillFlag, KillState, ProcessControl,
    ProcessOutcome, compress_file, convert_file, decompress_file, verify_file,
};
use tao_ape::format::muxers::wav::canonical_header;
use tao_ape::format::tags::{ApeTag, Id3v1Tag};

/// 生成 16 位立体声锯齿波
fn generate_pcm(blocks: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(blocks * 4);
    for i in 0..blocks as i32 {
        let l = ((i * 37) % 20000 - 10000) as i16;
        let r = ((i * 11) % 9000 - 4500) as i16;
        out.extend_from_slice(&l.to_le_bytes());
        out.extend_from_slice(&r.to_le_bytes());
    }
    out
}

/// 写出一个带 LIST 块和尾部块的 WAV 文件, 返回其完整内容
fn write_wav(path: &Path, pcm: &[u8]) -> Vec<u8> {
    let format = WaveFormat::new(2, 16, 44100).unwrap();
    let canonical = canonical_header(&format, pcm.len() as u64);
    let list = b"LIST\x0c\x00\x00\x00INFOtest1234";
    let trailer = b"id3 \x04\x00\x00\x00abcd";

    let mut wav = Vec::new();
    wav.extend_from_slice(&canonical[..36]);
    wav.extend_from_slice(list);
    wav.extend_from_slice(&canonical[36..]);
    wav.extend_from_slice(pcm);
    wav.extend_from_slice(trailer);
    let riff = (wav.len() - 8) as u32;
    wav[4..8].copy_from_slice(&riff.to_le_bytes());

    std::fs::write(path, &wav).unwrap();
    wav
}

fn options(level: CompressionLevel) -> CompressOptions {
    CompressOptions {
        level,
        ..Default::default()
    }
}

fn paths(dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    (dir.join("in.wav"), dir.join("out.ape"), dir.join("back.wav"))
}

#[test]
fn test_wav_file_reproduced_byte_for_byte() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let (wav_path, ape_path, back_path) = paths(dir.path());
    let wav = write_wav(&wav_path, &generate_pcm(30_000));

    let mut percents = Vec::new();
    let mut ctl = ProcessControl::new().with_progress(|p| percents.push(p));
    let outcome = compress_file(&wav_path, &ape_path, options(CompressionLevel::High), &mut ctl)
        .unwrap();
    drop(ctl);
    assert!(outcome.is_clean());
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));

    let dec = ApeDecompress::open(&ape_path).unwrap();
    assert_eq!(dec.get_info(ApeInfoField::WavHeaderBytes), Some(44 + 20));
    assert_eq!(dec.get_info(ApeInfoField::WavTerminatingBytes), Some(12));
    assert_eq!(
        dec.get_info(ApeInfoField::WavTotalBytes),
        Some(wav.len() as i64)
    );
    drop(dec);

    let outcome = decompress_file(&ape_path, &back_path, &mut ProcessControl::new()).unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Completed {
            blocks: 30_000,
            corrupt_frames: Vec::new()
        }
    );
    assert_eq!(std::fs::read(&back_path).unwrap(), wav);
}

#[test]
fn test_verify_and_convert_keep_audio_and_tag() {
    let dir = tempfile::tempdir().unwrap();
    let (wav_path, ape_path, back_path) = paths(dir.path());
    let wav = write_wav(&wav_path, &generate_pcm(12_345));
    compress_file(
        &wav_path,
        &ape_path,
        options(CompressionLevel::Fast),
        &mut ProcessControl::new(),
    )
    .unwrap();

    // 写入标签
    let mut io = IoContext::open_read_write(&ape_path).unwrap();
    let mut tag = ApeTag::analyze(&mut io).unwrap();
    tag.set_text("Title", "Song");
    tag.set_text("Artist", "Band");
    tag.save(&mut io, false).unwrap();
    drop(io);

    assert!(verify_file(&ape_path, &mut ProcessControl::new())
        .unwrap()
        .is_clean());

    let converted = dir.path().join("converted.ape");
    let outcome = convert_file(
        &ape_path,
        &converted,
        options(CompressionLevel::ExtraHigh),
        &mut ProcessControl::new(),
    )
    .unwrap();
    assert!(outcome.is_clean());

    let dec = ApeDecompress::open(&converted).unwrap();
    assert_eq!(
        dec.get_info(ApeInfoField::CompressionLevel),
        Some(i64::from(CompressionLevel::ExtraHigh.as_u16()))
    );
    assert_eq!(dec.tag().title().as_deref(), Some("Song"));
    assert_eq!(dec.tag().artist().as_deref(), Some("Band"));
    drop(dec);

    decompress_file(&converted, &back_path, &mut ProcessControl::new()).unwrap();
    assert_eq!(std::fs::read(&back_path).unwrap(), wav);
}

#[test]
fn test_tag_save_then_analyze_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (wav_path, ape_path, _) = paths(dir.path());
    write_wav(&wav_path, &generate_pcm(2000));
    compress_file(
        &wav_path,
        &ape_path,
        options(CompressionLevel::Normal),
        &mut ProcessControl::new(),
    )
    .unwrap();
    let audio_len = std::fs::metadata(&ape_path).unwrap().len();

    let mut io = IoContext::open_read_write(&ape_path).unwrap();
    let mut tag = ApeTag::analyze(&mut io).unwrap();
    tag.set_text("Title", "Первая песня");
    tag.set_text("Album", "专辑");
    tag.set_text("Track", "3");
    tag.save(&mut io, false).unwrap();
    let fields = tag.fields().to_vec();
    drop(io);

    // 读回后再次保存, 字段与文件都不变
    let mut io = IoContext::open_read_write(&ape_path).unwrap();
    let mut again = ApeTag::analyze(&mut io).unwrap();
    assert_eq!(again.fields(), fields.as_slice());
    let size_before = std::fs::metadata(&ape_path).unwrap().len();
    again.save(&mut io, false).unwrap();
    drop(io);
    assert_eq!(std::fs::metadata(&ape_path).unwrap().len(), size_before);

    // 改存为 ID3v1 后 APE 标签被替换
    let mut io = IoContext::open_read_write(&ape_path).unwrap();
    let mut tag = ApeTag::analyze(&mut io).unwrap();
    tag.set_text("Title", "Plain");
    tag.save(&mut io, true).unwrap();
    drop(io);
    let bytes = std::fs::read(&ape_path).unwrap();
    assert_eq!(bytes.len() as u64, audio_len + 128);
    let id3 = Id3v1Tag::parse(&bytes[bytes.len() - 128..]).unwrap();
    assert_eq!(id3.title, "Plain");

    // 标签不影响音频
    let mut ctl = ProcessControl::new();
    assert!(verify_file(&ape_path, &mut ctl).unwrap().is_clean());
}

#[test]
fn test_link_file_decompresses_block_range() {
    let dir = tempfile::tempdir().unwrap();
    let (wav_path, ape_path, back_path) = paths(dir.path());
    let pcm = generate_pcm(50_000);
    write_wav(&wav_path, &pcm);
    compress_file(
        &wav_path,
        &ape_path,
        options(CompressionLevel::Normal),
        &mut ProcessControl::new(),
    )
    .unwrap();

    let link_path = dir.path().join("track 2.apl");
    let link = ApeLink {
        image_file: PathBuf::from("out.ape"),
        start_block: 10_000,
        finish_block: 25_000,
    };
    link.write(&link_path).unwrap();

    let dec = ApeDecompress::open(&link_path).unwrap();
    assert!(dec.is_partial());
    assert_eq!(dec.total_blocks(), 15_000);
    assert_eq!(dec.get_info(ApeInfoField::TotalBlocks), Some(50_000));
    drop(dec);

    decompress_file(&link_path, &back_path, &mut ProcessControl::new()).unwrap();
    let out = std::fs::read(&back_path).unwrap();
    let format = WaveFormat::new(2, 16, 44100).unwrap();
    assert_eq!(out[..44], canonical_header(&format, 15_000 * 4)[..]);
    assert_eq!(out[44..], pcm[10_000 * 4..25_000 * 4]);
}

#[test]
fn test_stop_flag_removes_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let (wav_path, ape_path, back_path) = paths(dir.path());
    write_wav(&wav_path, &generate_pcm(40_000));

    let kill = KillFlag::new();
    let stopper = kill.clone();
    let mut calls = 0;
    let mut ctl = ProcessControl::new()
        .with_kill_flag(kill)
        .with_progress(|_| {
            calls += 1;
            stopper.set(KillState::Stop);
        });
    let outcome = compress_file(
        &wav_path,
        &ape_path,
        options(CompressionLevel::Normal),
        &mut ctl,
    )
    .unwrap();
    drop(ctl);
    assert_eq!(outcome, ProcessOutcome::Stopped);
    assert_eq!(calls, 1);
    assert!(!ape_path.exists());

    // 完整压缩后, 解压前就停止
    compress_file(
        &wav_path,
        &ape_path,
        options(CompressionLevel::Fast),
        &mut ProcessControl::new(),
    )
    .unwrap();
    let kill = KillFlag::new();
    kill.set(KillState::Stop);
    let mut ctl = ProcessControl::new().with_kill_flag(kill);
    let outcome = decompress_file(&ape_path, &back_path, &mut ctl).unwrap();
    assert_eq!(outcome, ProcessOutcome::Stopped);
    assert!(!back_path.exists());
}

#[test]
fn test_invalid_inputs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.ape");
    std::fs::write(&bogus, vec![0u8; 4096]).unwrap();
    assert!(ApeDecompress::open(&bogus).is_err());

    // 没有任何音频的 WAV 不能生成 APE 文件, 也不留下输出
    let (wav_path, ape_path, _) = paths(dir.path());
    let format = WaveFormat::new(2, 16, 44100).unwrap();
    std::fs::write(&wav_path, canonical_header(&format, 0)).unwrap();
    let result = compress_file(
        &wav_path,
        &ape_path,
        options(CompressionLevel::Normal),
        &mut ProcessControl::new(),
    );
    assert!(result.is_err());
    assert!(!ape_path.exists());
}
