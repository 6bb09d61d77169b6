//! ID3v1.1 标签.
//!
//! 文件末尾固定 128 字节:
//! ```text
//! "TAG" + title[30] + artist[30] + album[30] + year[4] + comment[29] + track + genre
//! ```
//! 文本字段按 Windows-1252 编解码, 不足部分以 0 填充.

use encoding_rs::WINDOWS_1252;

use super::genres::{genre_index, genre_name};

/// ID3v1 标签长度
pub const ID3V1_TAG_SIZE: usize = 128;

/// 未定义流派
pub const GENRE_UNDEFINED: u8 = 255;

/// ID3v1.1 标签
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Id3v1Tag {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub comment: String,
    /// 音轨号, 0 表示无
    pub track: u8,
    /// 流派编号, 255 表示未定义
    pub genre: u8,
}

fn decode_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(&raw[..end]);
    text.trim_end().to_string()
}

fn encode_text(text: &str, out: &mut [u8]) {
    let (bytes, _, _) = WINDOWS_1252.encode(text);
    let n = bytes.len().min(out.len());
    out[..n].copy_from_slice(&bytes[..n]);
}

impl Id3v1Tag {
    /// 解析 128 字节的标签, 标识不是 "TAG" 时返回 `None`
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ID3V1_TAG_SIZE || &data[0..3] != b"TAG" {
            return None;
        }
        // ID3v1.1: comment 第 29 字节为 0 时最后一字节是音轨号
        let (comment, track) = if data[125] == 0 && data[126] != 0 {
            (&data[97..125], data[126])
        } else {
            (&data[97..127], 0)
        };
        Some(Self {
            title: decode_text(&data[3..33]),
            artist: decode_text(&data[33..63]),
            album: decode_text(&data[63..93]),
            year: decode_text(&data[93..97]),
            comment: decode_text(comment),
            track,
            genre: data[127],
        })
    }

    /// 序列化为 128 字节
    pub fn to_bytes(&self) -> [u8; ID3V1_TAG_SIZE] {
        let mut out = [0u8; ID3V1_TAG_SIZE];
        out[0..3].copy_from_slice(b"TAG");
        encode_text(&self.title, &mut out[3..33]);
        encode_text(&self.artist, &mut out[33..63]);
        encode_text(&self.album, &mut out[63..93]);
        encode_text(&self.year, &mut out[93..97]);
        if self.track != 0 {
            encode_text(&self.comment, &mut out[97..125]);
            out[126] = self.track;
        } else {
            encode_text(&self.comment, &mut out[97..127]);
        }
        out[127] = self.genre;
        out
    }

    /// 流派名称
    pub fn genre_name(&self) -> Option<&'static str> {
        genre_name(self.genre)
    }

    /// 按名称设置流派, 未知名称设为未定义
    pub fn set_genre_name(&mut self, name: &str) {
        self.genre = genre_index(name).unwrap_or(GENRE_UNDEFINED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id3v1_往返() {
        let mut tag = Id3v1Tag {
            title: "Café del Mar".into(),
            artist: "Artist".into(),
            album: "Album".into(),
            year: "1999".into(),
            comment: "hello".into(),
            track: 7,
            genre: 0,
        };
        tag.set_genre_name("Ambient");
        let bytes = tag.to_bytes();
        // é 在 Windows-1252 中为单字节 0xE9
        assert_eq!(bytes[6], 0xE9);
        let parsed = Id3v1Tag::parse(&bytes).unwrap();
        assert_eq!(parsed, tag);
        assert_eq!(parsed.genre_name(), Some("Ambient"));
    }

    #[test]
    fn test_id3v1_0_无音轨时注释占满_30_字节() {
        let tag = Id3v1Tag {
            comment: "c".repeat(40),
            genre: GENRE_UNDEFINED,
            ..Default::default()
        };
        let parsed = Id3v1Tag::parse(&tag.to_bytes()).unwrap();
        assert_eq!(parsed.comment.len(), 30);
        assert_eq!(parsed.track, 0);
        assert_eq!(parsed.genre_name(), None);
    }

    #[test]
    fn test_非_tag_标识() {
        assert!(Id3v1Tag::parse(&[0u8; 128]).is_none());
        assert!(Id3v1Tag::parse(b"TAG").is_none());
    }
}
