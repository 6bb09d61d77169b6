//! 音频文件标签.
//!
//! - [`ape_tag`]: 文件末尾的 APE 标签 (读写)
//! - [`id3v1`]: 文件末尾的 ID3v1.1 标签 (读写)
//! - [`id3v2`]: 文件开头的 ID3v2 标签 (仅跳过)

pub mod ape_tag;
pub mod genres;
pub mod id3v1;
pub mod id3v2;

pub use ape_tag::{ApeTag, FieldKind, TagField};
pub use id3v1::Id3v1Tag;
pub use id3v2::skip_id3v2;
