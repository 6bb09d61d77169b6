//! APE 帧编解码性能基准测试.
//!
//! 覆盖各压缩级别的单帧编码与解码, 以及经由文件层的整段解压.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tao_ape::codec::ape::{CompressionLevel, FrameDecoder, FrameEncoder, WaveFormat};
use tao_ape::format::IoContext;
use tao_ape::format::ape::{ApeCompress, ApeDecompress, CompressOptions};

const VERSION: u16 = 3970;
const BLOCKS: usize = 44100;

/// 1 秒 16 位立体声测试信号
fn make_pcm() -> Vec<u8> {
    let mut data = Vec::with_capacity(BLOCKS * 4);
    for i in 0..BLOCKS {
        let t = i as f64 / 44100.0;
        let l = ((t * 440.0 * std::f64::consts::TAU).sin() * 20000.0) as i16;
        let r = ((t * 660.0 * std::f64::consts::TAU).sin() * 15000.0) as i16;
        data.extend_from_slice(&l.to_le_bytes());
        data.extend_from_slice(&r.to_le_bytes());
    }
    data
}

fn format() -> WaveFormat {
    WaveFormat {
        channels: 2,
        bits_per_sample: 16,
        sample_rate: 44100,
    }
}

fn bench_frame_encode(c: &mut Criterion) {
    let pcm = make_pcm();
    let mut group = c.benchmark_group("ape_frame_encode");
    group.throughput(Throughput::Bytes(pcm.len() as u64));
    group.sample_size(10);
    for level in CompressionLevel::ALL {
        group.bench_with_input(BenchmarkId::from_parameter(level), &level, |b, &level| {
            let mut enc = FrameEncoder::new(format(), VERSION, level).unwrap();
            b.iter(|| enc.encode_frame(black_box(&pcm)).unwrap());
        });
    }
    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let pcm = make_pcm();
    let mut group = c.benchmark_group("ape_frame_decode");
    group.throughput(Throughput::Bytes(pcm.len() as u64));
    group.sample_size(10);
    for level in CompressionLevel::ALL {
        let frame = FrameEncoder::new(format(), VERSION, level)
            .unwrap()
            .encode_frame(&pcm)
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(level), &frame, |b, frame| {
            let mut dec = FrameDecoder::new(format(), VERSION, level).unwrap();
            let mut out = Vec::with_capacity(pcm.len());
            b.iter(|| {
                out.clear();
                dec.decode_frame(black_box(&frame.data), frame.blocks, &mut out)
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_file_decompress(c: &mut Criterion) {
    let pcm = make_pcm();
    let mut comp = ApeCompress::start(
        IoContext::from_memory(Vec::new()),
        format(),
        CompressOptions {
            max_audio_bytes: Some(pcm.len() as u64),
            ..Default::default()
        },
    )
    .unwrap();
    comp.add_data(&pcm).unwrap();
    comp.finish(&[], 0).unwrap();
    let file = comp.into_io().memory_data().unwrap().to_vec();

    c.bench_function("ape_decompress_1s_normal", |b| {
        let mut buf = vec![0u8; pcm.len()];
        b.iter(|| {
            let mut dec = ApeDecompress::open_io(IoContext::from_memory(file.clone())).unwrap();
            dec.get_data(black_box(&mut buf), BLOCKS).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_frame_encode,
    bench_frame_decode,
    bench_file_decompress
);
criterion_main!(benches);
