//! tao-mac - Monkey's Audio 命令行工具
//!
//! 提供 WAV <-> APE 的压缩与解压、完整性校验、压缩级别转换、文件信息与标签编辑.

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use tao_codec::ape::CompressionLevel;

#[derive(Parser, Debug)]
#[command(name = "tao-mac", version, about = "纯 Rust Monkey's Audio 工具")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 覆盖已存在的输出文件
    #[arg(short = 'y', long, global = true)]
    overwrite: bool,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 把 WAV 文件压缩为 APE
    Compress {
        input: PathBuf,
        output: PathBuf,
        /// 压缩级别 (fast/normal/high/extra-high/insane 或 1000~5000)
        #[arg(short, long, default_value = "normal", value_parser = parse_level)]
        level: CompressionLevel,
    },
    /// 把 APE (或 .apl 链接) 解压为 WAV
    Decompress { input: PathBuf, output: PathBuf },
    /// 解码整个文件并检查帧校验
    Verify { input: PathBuf },
    /// 以新的压缩级别重新压缩 APE 文件
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long, value_parser = parse_level)]
        level: CompressionLevel,
    },
    /// 显示文件信息
    Info { input: PathBuf },
    /// 显示或修改 APE 标签
    Tag {
        input: PathBuf,
        /// 设置字段, 形如 Title=Foo; 值为空时删除该字段
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
        /// 删除全部字段
        #[arg(long)]
        clear: bool,
        /// 以 ID3v1 标签保存 (替换 APE 标签)
        #[arg(long)]
        id3v1: bool,
    },
}

/// 解析压缩级别名称或数值
fn parse_level(s: &str) -> Result<CompressionLevel, String> {
    let lower = s.to_ascii_lowercase();
    let level = match lower.trim_start_matches('c') {
        "fast" | "1000" | "1" => CompressionLevel::Fast,
        "normal" | "2000" | "2" => CompressionLevel::Normal,
        "high" | "3000" | "3" => CompressionLevel::High,
        "extra-high" | "extrahigh" | "4000" | "4" => CompressionLevel::ExtraHigh,
        "insane" | "5000" | "5" => CompressionLevel::Insane,
        _ => return Err(format!("未知的压缩级别: {s}")),
    };
    Ok(level)
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("tao-mac", cli.verbose) {
        eprintln!("警告: {e}");
    }

    let result = match cli.command {
        Command::Compress {
            input,
            output,
            level,
        } => commands::compress(&input, &output, level, cli.overwrite),
        Command::Decompress { input, output } => {
            commands::decompress(&input, &output, cli.overwrite)
        }
        Command::Verify { input } => commands::verify(&input),
        Command::Convert {
            input,
            output,
            level,
        } => commands::convert(&input, &output, level, cli.overwrite),
        Command::Info { input } => commands::info(&input),
        Command::Tag {
            input,
            set,
            clear,
            id3v1,
        } => commands::tag(&input, &set, clear, id3v1),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("错误: {e}");
            process::exit(1);
        }
    }
}
