//! APE 标签 (APEv1 / APEv2).
//!
//! 标签位于文件末尾 (在可选的 ID3v1 之前), 结构:
//! ```text
//! [header 32 字节 (可选)] [字段...] [footer 32 字节]
//! 字段: value_size u32 + flags u32 + name (以 0 结尾) + value
//! footer: "APETAGEX" + version u32 + size u32 (含 footer, 不含 header)
//!         + field_count u32 + flags u32 + 8 字节保留
//! ```
//! 读取支持版本 1000 与 2000; 写入只写版本 2000 的 footer.
//! 文件只带 ID3v1 时, 其内容转换为同名的 APE 字段.

use std::io::SeekFrom;

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use encoding_rs::WINDOWS_1252;
use log::{debug, warn};
use tao_core::{TaoError, TaoResult};

use super::genres::genre_name;
use super::id3v1::{GENRE_UNDEFINED, ID3V1_TAG_SIZE, Id3v1Tag};
use crate::io::IoContext;

/// 标签 header/footer 长度
pub const APE_TAG_FOOTER_BYTES: usize = 32;
/// 写入时使用的标签版本
pub const CURRENT_APE_TAG_VERSION: u32 = 2000;

/// 标签总大小上限
const MAX_TAG_BYTES: u32 = 16 * 1024 * 1024;

// ========================
// 标准字段名
// ========================

pub const FIELD_TITLE: &str = "Title";
pub const FIELD_ARTIST: &str = "Artist";
pub const FIELD_ALBUM: &str = "Album";
pub const FIELD_COMMENT: &str = "Comment";
pub const FIELD_YEAR: &str = "Year";
pub const FIELD_TRACK: &str = "Track";
pub const FIELD_GENRE: &str = "Genre";
pub const FIELD_COMPOSER: &str = "Composer";
pub const FIELD_COPYRIGHT: &str = "Copyright";
pub const FIELD_PUBLISHER: &str = "Publisher";
pub const FIELD_FILE: &str = "File";
pub const FIELD_RELATED_URL: &str = "Related";
pub const FIELD_ISRC: &str = "ISRC";
pub const FIELD_TOOL_NAME: &str = "Tool Name";
pub const FIELD_TOOL_VERSION: &str = "Tool Version";

bitflags! {
    /// 标签 header/footer 标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TagFlags: u32 {
        const HAS_HEADER = 1 << 31;
        const HAS_NO_FOOTER = 1 << 30;
        const IS_HEADER = 1 << 29;
    }
}

bitflags! {
    /// 字段标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldFlags: u32 {
        /// 只读
        const READ_ONLY = 1;
        /// 内容类型位 (2 位)
        const KIND_MASK = 0b110;
    }
}

/// 字段内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 文本
    Text,
    /// 二进制
    Binary,
    /// 外部资源定位 (UTF-8 URL)
    Locator,
    /// 保留值
    Reserved,
}

impl FieldKind {
    fn from_flags(flags: FieldFlags) -> Self {
        match (flags & FieldFlags::KIND_MASK).bits() >> 1 {
            0 => Self::Text,
            1 => Self::Binary,
            2 => Self::Locator,
            _ => Self::Reserved,
        }
    }

    fn to_flags(self) -> FieldFlags {
        let bits = match self {
            Self::Text => 0,
            Self::Binary => 1,
            Self::Locator => 2,
            Self::Reserved => 3,
        };
        FieldFlags::from_bits_retain(bits << 1)
    }
}

/// 标签字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagField {
    name: String,
    value: Vec<u8>,
    flags: FieldFlags,
}

impl TagField {
    /// 创建文本字段
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.as_bytes().to_vec(),
            flags: FieldFlags::empty(),
        }
    }

    /// 创建二进制字段
    pub fn binary(name: &str, value: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            value,
            flags: FieldKind::Binary.to_flags(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 原始值
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn flags(&self) -> FieldFlags {
        self.flags
    }

    pub fn kind(&self) -> FieldKind {
        FieldKind::from_flags(self.flags)
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(FieldFlags::READ_ONLY)
    }

    /// 设置只读标志
    pub fn set_read_only(&mut self, read_only: bool) {
        self.flags.set(FieldFlags::READ_ONLY, read_only);
    }

    /// 文本内容, 二进制字段返回 `None`
    pub fn as_text(&self) -> Option<String> {
        match self.kind() {
            FieldKind::Text | FieldKind::Locator => {
                Some(String::from_utf8_lossy(&self.value).into_owned())
            }
            _ => None,
        }
    }

    /// 序列化后的字节数
    fn encoded_len(&self) -> usize {
        8 + self.name.len() + 1 + self.value.len()
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.flags.bits().to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        out.extend_from_slice(&self.value);
    }
}

/// 解析后的 footer
#[derive(Debug, Clone, Copy)]
struct Footer {
    version: u32,
    size: u32,
    field_count: u32,
    flags: TagFlags,
}

impl Footer {
    fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < APE_TAG_FOOTER_BYTES || &buf[0..8] != b"APETAGEX" {
            return None;
        }
        Some(Self {
            version: LittleEndian::read_u32(&buf[8..12]),
            size: LittleEndian::read_u32(&buf[12..16]),
            field_count: LittleEndian::read_u32(&buf[16..20]),
            flags: TagFlags::from_bits_retain(LittleEndian::read_u32(&buf[20..24])),
        })
    }

    fn is_valid(&self) -> bool {
        self.version <= CURRENT_APE_TAG_VERSION
            && self.size as usize >= APE_TAG_FOOTER_BYTES
            && self.size <= MAX_TAG_BYTES
            && !self.flags.contains(TagFlags::IS_HEADER)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"APETAGEX");
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.field_count.to_le_bytes());
        out.extend_from_slice(&self.flags.bits().to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
    }
}

/// APE 标签
#[derive(Debug, Clone, Default)]
pub struct ApeTag {
    /// 字段列表, 按读取或插入顺序
    fields: Vec<TagField>,
    /// 读取到的 APE 标签版本 (0 表示没有 APE 标签)
    version: u32,
    /// 文件末尾 APE 标签占用的字节数 (含 header)
    ape_tag_bytes: u64,
    /// 文件末尾是否有 ID3v1 标签
    has_id3v1: bool,
}

impl ApeTag {
    /// 创建空标签
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取文件末尾的 APE 标签与 ID3v1 标签
    ///
    /// 读取位置在返回后恢复.
    pub fn analyze(io: &mut IoContext) -> TaoResult<Self> {
        let saved = io.position()?;
        let result = Self::analyze_at_end(io);
        io.seek(SeekFrom::Start(saved))?;
        result
    }

    fn analyze_at_end(io: &mut IoContext) -> TaoResult<Self> {
        let mut tag = Self::new();
        let Some(file_size) = io.size() else {
            return Ok(tag);
        };

        // ID3v1
        let mut id3v1 = None;
        if file_size >= ID3V1_TAG_SIZE as u64 {
            io.seek(SeekFrom::Start(file_size - ID3V1_TAG_SIZE as u64))?;
            let buf = io.read_bytes(ID3V1_TAG_SIZE)?;
            id3v1 = Id3v1Tag::parse(&buf);
            tag.has_id3v1 = id3v1.is_some();
        }
        let id3_bytes = if tag.has_id3v1 {
            ID3V1_TAG_SIZE as u64
        } else {
            0
        };

        // APE 标签 footer
        let end = file_size - id3_bytes;
        if end >= APE_TAG_FOOTER_BYTES as u64 {
            io.seek(SeekFrom::Start(end - APE_TAG_FOOTER_BYTES as u64))?;
            let buf = io.read_bytes(APE_TAG_FOOTER_BYTES)?;
            if let Some(footer) = Footer::parse(&buf) {
                tag.read_fields(io, &footer, end)?;
            }
        }

        if tag.version == 0 {
            if let Some(id3) = id3v1 {
                tag.import_id3v1(&id3);
            }
        }
        debug!(
            "分析标签: APE 版本={}, APE 字节={}, ID3v1={}, 字段数={}",
            tag.version,
            tag.ape_tag_bytes,
            tag.has_id3v1,
            tag.fields.len()
        );
        Ok(tag)
    }

    /// 读取 footer 之前的字段区
    fn read_fields(&mut self, io: &mut IoContext, footer: &Footer, end: u64) -> TaoResult<()> {
        if !footer.is_valid() || u64::from(footer.size) > end {
            warn!(
                "忽略无效的 APE 标签: 版本={}, 大小={}",
                footer.version, footer.size
            );
            return Ok(());
        }

        let body_len = footer.size as usize - APE_TAG_FOOTER_BYTES;
        io.seek(SeekFrom::Start(end - u64::from(footer.size)))?;
        let body = io.read_bytes(body_len)?;

        let mut header_bytes = 0u64;
        if footer.flags.contains(TagFlags::HAS_HEADER) {
            let header_start = end - u64::from(footer.size);
            if header_start >= APE_TAG_FOOTER_BYTES as u64 {
                io.seek(SeekFrom::Start(header_start - APE_TAG_FOOTER_BYTES as u64))?;
                let buf = io.read_bytes(APE_TAG_FOOTER_BYTES)?;
                if Footer::parse(&buf).is_some() {
                    header_bytes = APE_TAG_FOOTER_BYTES as u64;
                } else {
                    warn!("APE 标签声明有 header, 但未找到");
                }
            }
        }

        self.fields = parse_fields(&body, footer.field_count, footer.version);
        self.version = footer.version;
        self.ape_tag_bytes = u64::from(footer.size) + header_bytes;
        Ok(())
    }

    /// 把 ID3v1 内容转换为 APE 字段
    fn import_id3v1(&mut self, id3: &Id3v1Tag) {
        self.set_text(FIELD_TITLE, &id3.title);
        self.set_text(FIELD_ARTIST, &id3.artist);
        self.set_text(FIELD_ALBUM, &id3.album);
        self.set_text(FIELD_YEAR, &id3.year);
        self.set_text(FIELD_COMMENT, &id3.comment);
        if id3.track != 0 {
            self.set_text(FIELD_TRACK, &id3.track.to_string());
        }
        if let Some(genre) = genre_name(id3.genre) {
            self.set_text(FIELD_GENRE, genre);
        }
    }

    /// 由字段生成 ID3v1 标签
    pub fn to_id3v1(&self) -> Id3v1Tag {
        let text = |name: &str| self.text(name).unwrap_or_default();
        let mut id3 = Id3v1Tag {
            title: text(FIELD_TITLE),
            artist: text(FIELD_ARTIST),
            album: text(FIELD_ALBUM),
            year: text(FIELD_YEAR),
            comment: text(FIELD_COMMENT),
            track: text(FIELD_TRACK)
                .split('/')
                .next()
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(0),
            genre: GENRE_UNDEFINED,
        };
        id3.set_genre_name(&text(FIELD_GENRE));
        id3
    }

    // ========================
    // 字段访问
    // ========================

    pub fn fields(&self) -> &[TagField] {
        &self.fields
    }

    /// 按名称查找字段 (区分大小写)
    pub fn field(&self, name: &str) -> Option<&TagField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 文本字段内容
    pub fn text(&self, name: &str) -> Option<String> {
        self.field(name).and_then(TagField::as_text)
    }

    /// 设置字段, 同名字段被替换; 空值删除字段
    pub fn set_field(&mut self, field: TagField) {
        if field.value.is_empty() {
            self.remove_field(&field.name);
            return;
        }
        match self
            .fields
            .iter_mut()
            .find(|f| f.name == field.name)
        {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// 设置文本字段
    pub fn set_text(&mut self, name: &str, value: &str) {
        self.set_field(TagField::text(name, value.trim_end()));
    }

    /// 删除字段, 返回是否存在
    pub fn remove_field(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.name != name);
        self.fields.len() != before
    }

    /// 删除全部字段
    pub fn clear_fields(&mut self) {
        self.fields.clear();
    }

    pub fn title(&self) -> Option<String> {
        self.text(FIELD_TITLE)
    }

    pub fn artist(&self) -> Option<String> {
        self.text(FIELD_ARTIST)
    }

    pub fn album(&self) -> Option<String> {
        self.text(FIELD_ALBUM)
    }

    pub fn comment(&self) -> Option<String> {
        self.text(FIELD_COMMENT)
    }

    pub fn year(&self) -> Option<String> {
        self.text(FIELD_YEAR)
    }

    pub fn track(&self) -> Option<String> {
        self.text(FIELD_TRACK)
    }

    pub fn genre(&self) -> Option<String> {
        self.text(FIELD_GENRE)
    }

    // ========================
    // 文件上的标签
    // ========================

    /// 读取到的 APE 标签版本, 0 表示没有
    pub fn version(&self) -> u32 {
        self.version
    }

    /// 文件末尾是否有 ID3v1 标签
    pub fn has_id3v1(&self) -> bool {
        self.has_id3v1
    }

    /// 文件末尾所有标签占用的字节数
    pub fn tag_bytes(&self) -> u64 {
        self.ape_tag_bytes
            + if self.has_id3v1 {
                ID3V1_TAG_SIZE as u64
            } else {
                0
            }
    }

    /// 序列化为版本 2000 的标签 (字段 + footer)
    pub fn to_bytes(&self) -> Vec<u8> {
        let body: usize = self.fields.iter().map(TagField::encoded_len).sum();
        let mut out = Vec::with_capacity(body + APE_TAG_FOOTER_BYTES);
        for field in &self.fields {
            field.write_to(&mut out);
        }
        Footer {
            version: CURRENT_APE_TAG_VERSION,
            size: (body + APE_TAG_FOOTER_BYTES) as u32,
            field_count: self.fields.len() as u32,
            flags: TagFlags::empty(),
        }
        .write_to(&mut out);
        out
    }

    /// 从文件末尾删除已有的标签
    pub fn remove(&mut self, io: &mut IoContext) -> TaoResult<()> {
        let size = io
            .size()
            .ok_or_else(|| TaoError::Unsupported("无法在非文件流上删除标签".into()))?;
        let tag_bytes = self.tag_bytes();
        if tag_bytes > 0 {
            io.set_len(size.saturating_sub(tag_bytes))?;
            debug!("删除标签: {tag_bytes} 字节");
        }
        self.ape_tag_bytes = 0;
        self.version = 0;
        self.has_id3v1 = false;
        Ok(())
    }

    /// 写入标签: 先删除已有标签, 再在末尾追加
    ///
    /// `use_id3v1` 为真时写入 ID3v1 标签代替 APE 标签.
    /// 没有字段时只删除已有标签.
    pub fn save(&mut self, io: &mut IoContext, use_id3v1: bool) -> TaoResult<()> {
        self.remove(io)?;
        if self.fields.is_empty() {
            return Ok(());
        }

        let size = io
            .size()
            .ok_or_else(|| TaoError::Unsupported("无法在非文件流上写入标签".into()))?;
        io.seek(SeekFrom::Start(size))?;
        if use_id3v1 {
            io.write_all(&self.to_id3v1().to_bytes())?;
            self.has_id3v1 = true;
        } else {
            let bytes = self.to_bytes();
            io.write_all(&bytes)?;
            self.ape_tag_bytes = bytes.len() as u64;
            self.version = CURRENT_APE_TAG_VERSION;
        }
        io.flush()?;
        debug!("写入标签: {} 字节, ID3v1={}", self.tag_bytes(), use_id3v1);
        Ok(())
    }
}

/// 解析字段区, 越界时停止并保留已解析的字段
fn parse_fields(body: &[u8], field_count: u32, version: u32) -> Vec<TagField> {
    let mut fields = Vec::new();
    let mut pos = 0usize;
    for index in 0..field_count {
        if pos + 8 > body.len() {
            warn!("APE 标签字段 {index} 越界, 停止解析");
            break;
        }
        let value_size = LittleEndian::read_u32(&body[pos..pos + 4]) as usize;
        let flags = FieldFlags::from_bits_retain(LittleEndian::read_u32(&body[pos + 4..pos + 8]));
        pos += 8;

        let Some(name_len) = body[pos..].iter().position(|&b| b == 0) else {
            warn!("APE 标签字段 {index} 名称未结束, 停止解析");
            break;
        };
        let name = String::from_utf8_lossy(&body[pos..pos + name_len]).into_owned();
        pos += name_len + 1;

        if value_size > body.len() - pos {
            warn!("APE 标签字段 '{name}' 值越界, 停止解析");
            break;
        }
        let raw = &body[pos..pos + value_size];
        pos += value_size;

        // 版本 1000 的文本为本地编码
        let value = if version < CURRENT_APE_TAG_VERSION
            && FieldKind::from_flags(flags) == FieldKind::Text
        {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(raw);
            text.into_owned().into_bytes()
        } else {
            raw.to_vec()
        };
        fields.push(TagField { name, value, flags });
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with_tag(audio: &[u8], tag: &ApeTag) -> IoContext {
        let mut data = audio.to_vec();
        data.extend_from_slice(&tag.to_bytes());
        IoContext::from_memory(data)
    }

    #[test]
    fn test_保存后分析字段一致() {
        let mut tag = ApeTag::new();
        tag.set_text(FIELD_TITLE, "标题");
        tag.set_text(FIELD_ARTIST, "Artist");
        tag.set_text(FIELD_TRACK, "3/12");
        let mut cover = TagField::binary("Cover Art (front)", vec![0, 1, 2, 255]);
        cover.set_read_only(true);
        tag.set_field(cover);

        let mut io = IoContext::from_memory(b"audio data".to_vec());
        tag.save(&mut io, false).unwrap();
        assert_eq!(io.size(), Some(10 + tag.tag_bytes()));

        let analyzed = ApeTag::analyze(&mut io).unwrap();
        assert_eq!(analyzed.fields(), tag.fields());
        assert_eq!(analyzed.version(), CURRENT_APE_TAG_VERSION);
        assert_eq!(analyzed.tag_bytes(), tag.tag_bytes());
        assert!(analyzed.field("cover art (FRONT)").is_none());
        let cover = analyzed.field("Cover Art (front)").unwrap();
        assert_eq!(cover.kind(), FieldKind::Binary);
        assert!(cover.is_read_only());
        assert_eq!(cover.as_text(), None);
        assert_eq!(analyzed.title().as_deref(), Some("标题"));
    }

    #[test]
    fn test_字段名区分大小写() {
        let mut tag = ApeTag::new();
        tag.set_text("Artist", "Upper");
        tag.set_text("artist", "lower");
        assert_eq!(tag.fields().len(), 2);
        assert_eq!(tag.text("Artist").as_deref(), Some("Upper"));
        assert_eq!(tag.text("artist").as_deref(), Some("lower"));
        assert!(tag.text("ARTIST").is_none());

        // 同名替换保留原位置
        tag.set_text("Artist", "Again");
        assert_eq!(tag.fields()[0].name(), "Artist");
        assert_eq!(tag.text("Artist").as_deref(), Some("Again"));

        assert!(tag.remove_field("artist"));
        assert_eq!(tag.fields().len(), 1);
        assert_eq!(tag.artist().as_deref(), Some("Again"));
        assert!(!tag.remove_field("ARTIST"));

        let mut io = IoContext::from_memory(Vec::new());
        tag.set_text("artist", "lower");
        tag.save(&mut io, false).unwrap();
        let analyzed = ApeTag::analyze(&mut io).unwrap();
        assert_eq!(analyzed.text("Artist").as_deref(), Some("Again"));
        assert_eq!(analyzed.text("artist").as_deref(), Some("lower"));
    }

    #[test]
    fn test_再次保存替换旧标签() {
        let mut tag = ApeTag::new();
        tag.set_text(FIELD_ALBUM, "A very long album name");
        let mut io = IoContext::from_memory(vec![7u8; 100]);
        tag.save(&mut io, false).unwrap();

        let mut tag = ApeTag::analyze(&mut io).unwrap();
        tag.set_text(FIELD_ALBUM, "B");
        tag.save(&mut io, false).unwrap();

        let analyzed = ApeTag::analyze(&mut io).unwrap();
        assert_eq!(analyzed.album().as_deref(), Some("B"));
        assert_eq!(analyzed.fields().len(), 1);
        assert_eq!(io.size(), Some(100 + analyzed.tag_bytes()));
    }

    #[test]
    fn test_删除标签() {
        let mut tag = ApeTag::new();
        tag.set_text(FIELD_TITLE, "x");
        let mut io = file_with_tag(&[1, 2, 3], &tag);
        let mut analyzed = ApeTag::analyze(&mut io).unwrap();
        analyzed.remove(&mut io).unwrap();
        assert_eq!(io.memory_data().unwrap(), &[1, 2, 3]);
        assert_eq!(ApeTag::analyze(&mut io).unwrap().tag_bytes(), 0);
    }

    #[test]
    fn test_空值删除字段() {
        let mut tag = ApeTag::new();
        tag.set_text(FIELD_GENRE, "Rock");
        assert!(tag.genre().is_some());
        tag.set_text(FIELD_GENRE, "");
        assert!(tag.genre().is_none());
        assert!(!tag.remove_field(FIELD_GENRE));
    }

    #[test]
    fn test_id3v1_保存与读取() {
        let mut tag = ApeTag::new();
        tag.set_text(FIELD_TITLE, "Song");
        tag.set_text(FIELD_TRACK, "5/10");
        tag.set_text(FIELD_GENRE, "jazz");
        let mut io = IoContext::from_memory(vec![0u8; 50]);
        tag.save(&mut io, true).unwrap();
        assert_eq!(io.size(), Some(50 + 128));

        let analyzed = ApeTag::analyze(&mut io).unwrap();
        assert!(analyzed.has_id3v1());
        assert_eq!(analyzed.version(), 0);
        assert_eq!(analyzed.title().as_deref(), Some("Song"));
        assert_eq!(analyzed.track().as_deref(), Some("5"));
        assert_eq!(analyzed.genre().as_deref(), Some("Jazz"));
        assert_eq!(analyzed.tag_bytes(), 128);
    }

    #[test]
    fn test_读取带_header_的标签() {
        let mut tag = ApeTag::new();
        tag.set_text(FIELD_COMMENT, "with header");
        let bytes = tag.to_bytes();
        let footer_start = bytes.len() - APE_TAG_FOOTER_BYTES;

        let mut header = bytes[footer_start..].to_vec();
        let flags = (TagFlags::HAS_HEADER | TagFlags::IS_HEADER).bits();
        header[20..24].copy_from_slice(&flags.to_le_bytes());
        let mut footer = bytes[footer_start..].to_vec();
        footer[20..24].copy_from_slice(&TagFlags::HAS_HEADER.bits().to_le_bytes());

        let mut data = vec![9u8; 20];
        data.extend_from_slice(&header);
        data.extend_from_slice(&bytes[..footer_start]);
        data.extend_from_slice(&footer);
        let mut io = IoContext::from_memory(data);

        let analyzed = ApeTag::analyze(&mut io).unwrap();
        assert_eq!(analyzed.comment().as_deref(), Some("with header"));
        assert_eq!(analyzed.tag_bytes(), bytes.len() as u64 + 32);
    }

    #[test]
    fn test_版本_1000_文本按本地编码读取() {
        let mut body = Vec::new();
        body.extend_from_slice(&4u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(b"Title\0");
        body.extend_from_slice(b"Caf\xE9");
        let mut data = body.clone();
        Footer {
            version: 1000,
            size: (body.len() + APE_TAG_FOOTER_BYTES) as u32,
            field_count: 1,
            flags: TagFlags::empty(),
        }
        .write_to(&mut data);
        let mut io = IoContext::from_memory(data);

        let analyzed = ApeTag::analyze(&mut io).unwrap();
        assert_eq!(analyzed.version(), 1000);
        assert_eq!(analyzed.title().as_deref(), Some("Café"));
    }

    #[test]
    fn test_损坏字段只保留已解析部分() {
        let mut tag = ApeTag::new();
        tag.set_text(FIELD_TITLE, "ok");
        let mut bytes = tag.to_bytes();
        // 声明字段数多于实际
        let n = bytes.len() - APE_TAG_FOOTER_BYTES + 16;
        bytes[n..n + 4].copy_from_slice(&5u32.to_le_bytes());
        let mut io = IoContext::from_memory(bytes);
        let analyzed = ApeTag::analyze(&mut io).unwrap();
        assert_eq!(analyzed.fields().len(), 1);
    }

    #[test]
    fn test_无标签() {
        let mut io = IoContext::from_memory(vec![0u8; 300]);
        let tag = ApeTag::analyze(&mut io).unwrap();
        assert_eq!(tag.tag_bytes(), 0);
        assert!(tag.fields().is_empty());
    }
}
