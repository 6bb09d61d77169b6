//! APE 链接文件 (.apl).
//!
//! 链接文件是一个小文本文件, 指向一个 APE 镜像文件中的一段块范围,
//! 使一个物理文件可以被拆成多个虚拟音轨:
//! ```text
//! [Monkey's Audio Image Link File]
//! Image File=album.ape
//! Start Block=0
//! Finish Block=1234567
//! ```

use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1252;
use log::debug;
use tao_core::{TaoError, TaoResult};

use crate::io::IoContext;

const LINK_HEADER: &str = "[Monkey's Audio Image Link File]";
const KEY_IMAGE_FILE: &str = "Image File=";
const KEY_START_BLOCK: &str = "Start Block=";
const KEY_FINISH_BLOCK: &str = "Finish Block=";

/// 链接文件大小上限
const MAX_LINK_BYTES: usize = 64 * 1024;

/// 链接文件内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApeLink {
    /// 镜像文件路径 (读取时已按链接文件所在目录解析)
    pub image_file: PathBuf,
    /// 起始块 (含)
    pub start_block: u64,
    /// 结束块 (不含)
    pub finish_block: u64,
}

impl ApeLink {
    /// 判断路径是否为链接文件 (按扩展名)
    pub fn is_link_path(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("apl"))
    }

    /// 解析链接文件文本
    ///
    /// 相对的镜像路径以 `base_dir` 为基准.
    pub fn parse(text: &str, base_dir: Option<&Path>) -> TaoResult<Self> {
        if !text.contains(LINK_HEADER) {
            return Err(TaoError::Format("不是 APE 链接文件".into()));
        }

        let mut image = None;
        let mut start = None;
        let mut finish = None;
        for line in text.lines().map(str::trim) {
            if let Some(v) = line.strip_prefix(KEY_IMAGE_FILE) {
                image = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix(KEY_START_BLOCK) {
                start = Some(parse_block(v)?);
            } else if let Some(v) = line.strip_prefix(KEY_FINISH_BLOCK) {
                finish = Some(parse_block(v)?);
            }
        }

        let image = image
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TaoError::Format("链接文件缺少 Image File".into()))?;
        let start_block =
            start.ok_or_else(|| TaoError::Format("链接文件缺少 Start Block".into()))?;
        let finish_block =
            finish.ok_or_else(|| TaoError::Format("链接文件缺少 Finish Block".into()))?;
        if finish_block < start_block {
            return Err(TaoError::Format(format!(
                "链接文件块范围无效: {start_block}..{finish_block}"
            )));
        }

        let mut image_file = PathBuf::from(image.replace('\\', "/"));
        if image_file.is_relative() {
            if let Some(dir) = base_dir {
                image_file = dir.join(image_file);
            }
        }
        Ok(Self {
            image_file,
            start_block,
            finish_block,
        })
    }

    /// 读取链接文件
    pub fn read(path: impl AsRef<Path>) -> TaoResult<Self> {
        let path = path.as_ref();
        let mut io = IoContext::open_read(path)?;
        let mut buf = vec![0u8; MAX_LINK_BYTES];
        let n = io.read_up_to(&mut buf)?;
        buf.truncate(n);

        let text = match String::from_utf8(buf) {
            Ok(s) => s,
            Err(e) => {
                let (text, _) = WINDOWS_1252.decode_without_bom_handling(e.as_bytes());
                text.into_owned()
            }
        };
        let link = Self::parse(text.trim_start_matches('\u{FEFF}'), path.parent())?;
        debug!(
            "链接文件 {}: {} [{}, {})",
            path.display(),
            link.image_file.display(),
            link.start_block,
            link.finish_block
        );
        Ok(link)
    }

    /// 生成链接文件文本
    pub fn to_text(&self) -> String {
        format!(
            "{LINK_HEADER}\r\n{KEY_IMAGE_FILE}{}\r\n{KEY_START_BLOCK}{}\r\n{KEY_FINISH_BLOCK}{}\r\n",
            self.image_file.display(),
            self.start_block,
            self.finish_block
        )
    }

    /// 写入链接文件
    pub fn write(&self, path: impl AsRef<Path>) -> TaoResult<()> {
        let mut io = IoContext::open_write(path)?;
        io.write_all(self.to_text().as_bytes())?;
        io.flush()
    }

    /// 块数
    pub fn blocks(&self) -> u64 {
        self.finish_block - self.start_block
    }
}

fn parse_block(value: &str) -> TaoResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| TaoError::Format(format!("链接文件块号无效: '{}'", value.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[Monkey's Audio Image Link File]\r\n\
                          Image File=album.ape\r\n\
                          Start Block=1000\r\n\
                          Finish Block=5000\r\n";

    #[test]
    fn test_解析链接文件() {
        let link = ApeLink::parse(SAMPLE, Some(Path::new("/music"))).unwrap();
        assert_eq!(link.image_file, Path::new("/music/album.ape"));
        assert_eq!(link.start_block, 1000);
        assert_eq!(link.finish_block, 5000);
        assert_eq!(link.blocks(), 4000);
    }

    #[test]
    fn test_绝对路径不变() {
        let text = SAMPLE.replace("album.ape", "/data/x.ape");
        let link = ApeLink::parse(&text, Some(Path::new("/music"))).unwrap();
        assert_eq!(link.image_file, Path::new("/data/x.ape"));
    }

    #[test]
    fn test_无效链接文件() {
        assert!(ApeLink::parse("Image File=a.ape", None).is_err());
        let reversed = SAMPLE.replace("Finish Block=5000", "Finish Block=10");
        assert!(ApeLink::parse(&reversed, None).is_err());
        let missing = SAMPLE.replace("Start Block=1000\r\n", "");
        assert!(ApeLink::parse(&missing, None).is_err());
        let bad = SAMPLE.replace("1000", "abc");
        assert!(ApeLink::parse(&bad, None).is_err());
    }

    #[test]
    fn test_写入后读取() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track01.apl");
        let link = ApeLink {
            image_file: dir.path().join("image.ape"),
            start_block: 0,
            finish_block: 44100,
        };
        link.write(&path).unwrap();
        assert!(ApeLink::is_link_path(&path));
        assert_eq!(ApeLink::read(&path).unwrap(), link);
    }
}
