//! 带读缓冲的随机访问字节流.
//!
//! APE 文件的打开、逐帧读取、尾部回填和标签就地修改都需要在同一个句柄上交替读写,
//! [`IoContext`] 在文件或内存缓冲区之上提供这一能力.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tao_core::{TaoError, TaoResult};

/// 读缓冲大小
const READ_BUFFER_SIZE: usize = 32 * 1024;

/// 底层存储
enum Backend {
    File { file: File, name: String },
    Memory(Cursor<Vec<u8>>),
}

impl Backend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File { file, .. } => file.read(buf),
            Self::Memory(cursor) => cursor.read(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::File { file, .. } => file.write_all(buf),
            // 位置超过末尾时 Cursor 会先补零
            Self::Memory(cursor) => cursor.write_all(buf),
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::File { file, .. } => file.seek(pos),
            Self::Memory(cursor) => cursor.seek(pos),
        }
    }

    fn position(&mut self) -> io::Result<u64> {
        match self {
            Self::File { file, .. } => file.stream_position(),
            Self::Memory(cursor) => Ok(cursor.position()),
        }
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        match self {
            Self::File { file, .. } => file.set_len(len),
            Self::Memory(cursor) => {
                cursor.get_mut().resize(len as usize, 0);
                Ok(())
            }
        }
    }
}

/// 字节流句柄
///
/// 写入、截断与 seek 之前会先丢弃读缓冲, 因此读写可以交替进行.
pub struct IoContext {
    backend: Backend,
    buffer: Box<[u8]>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

impl IoContext {
    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            buffer: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            buf_len: 0,
            buf_pos: 0,
        }
    }

    fn with_file(file: File, path: &Path) -> Self {
        Self::with_backend(Backend::File {
            file,
            name: path.display().to_string(),
        })
    }

    /// 以内存数据作为可读写的字节流, 位置从 0 开始
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::with_backend(Backend::Memory(Cursor::new(data)))
    }

    /// 只读打开文件
    pub fn open_read(path: impl AsRef<Path>) -> TaoResult<Self> {
        let path = path.as_ref();
        Ok(Self::with_file(File::open(path)?, path))
    }

    /// 创建文件 (读写, 已存在则清空)
    pub fn open_write(path: impl AsRef<Path>) -> TaoResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::with_file(file, path))
    }

    /// 读写打开已有文件, 用于就地修改标签
    pub fn open_read_write(path: impl AsRef<Path>) -> TaoResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::with_file(file, path))
    }

    // ========================
    // 读取
    // ========================

    /// 尽量读满 `buf`, 返回实际读取的字节数 (不足表示已到末尾)
    pub fn read_up_to(&mut self, buf: &mut [u8]) -> TaoResult<usize> {
        let mut done = 0;
        while done < buf.len() {
            if self.buf_pos == self.buf_len {
                self.buf_pos = 0;
                self.buf_len = self.backend.read(&mut self.buffer)?;
                if self.buf_len == 0 {
                    break;
                }
            }
            let n = (self.buf_len - self.buf_pos).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + n]);
            self.buf_pos += n;
            done += n;
        }
        Ok(done)
    }

    /// 读满 `buf`, 不足时返回 [`TaoError::Eof`]
    pub fn read_exact(&mut self, buf: &mut [u8]) -> TaoResult<()> {
        if self.read_up_to(buf)? < buf.len() {
            return Err(TaoError::Eof);
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> TaoResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> TaoResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> TaoResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32_le(&mut self) -> TaoResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_i32_le(&mut self) -> TaoResult<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// 读取 4 字节块标识 (FourCC)
    pub fn read_tag(&mut self) -> TaoResult<[u8; 4]> {
        self.read_array()
    }

    /// 读取 `count` 字节, 缓冲分配失败时返回 [`TaoError::OutOfMemory`]
    pub fn read_bytes(&mut self, count: usize) -> TaoResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(count)
            .map_err(|e| TaoError::OutOfMemory(format!("读取 {count} 字节失败: {e}")))?;
        buf.resize(count, 0);
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 向后跳过 `count` 字节
    pub fn skip(&mut self, count: usize) -> TaoResult<()> {
        let buffered = self.buf_len - self.buf_pos;
        if count <= buffered {
            self.buf_pos += count;
            return Ok(());
        }
        self.seek(SeekFrom::Current(count as i64))?;
        Ok(())
    }

    // ========================
    // 写入
    // ========================

    /// 丢弃读缓冲, 把底层位置拉回逻辑位置
    fn drop_read_buffer(&mut self) -> TaoResult<()> {
        let buffered = self.buf_len - self.buf_pos;
        if buffered > 0 {
            self.backend.seek(SeekFrom::Current(-(buffered as i64)))?;
        }
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(())
    }

    pub fn write_all(&mut self, buf: &[u8]) -> TaoResult<()> {
        self.drop_read_buffer()?;
        self.backend.write_all(buf)?;
        Ok(())
    }

    pub fn write_u32_le(&mut self, v: u32) -> TaoResult<()> {
        self.write_all(&v.to_le_bytes())
    }

    pub fn write_i32_le(&mut self, v: i32) -> TaoResult<()> {
        self.write_all(&v.to_le_bytes())
    }

    /// 截断或补零到 `len` 字节
    pub fn set_len(&mut self, len: u64) -> TaoResult<()> {
        self.drop_read_buffer()?;
        self.backend.set_len(len)?;
        Ok(())
    }

    pub fn flush(&mut self) -> TaoResult<()> {
        if let Backend::File { file, .. } = &mut self.backend {
            file.flush()?;
        }
        Ok(())
    }

    // ========================
    // 定位
    // ========================

    /// 定位到逻辑位置, 清空读缓冲
    pub fn seek(&mut self, pos: SeekFrom) -> TaoResult<u64> {
        let pos = match pos {
            SeekFrom::Current(offset) => {
                let logical = self.position()? as i64;
                SeekFrom::Start(logical.saturating_add(offset).max(0) as u64)
            }
            other => other,
        };
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.backend.seek(pos)?)
    }

    /// 逻辑位置 (扣除读缓冲中尚未消耗的字节)
    pub fn position(&mut self) -> TaoResult<u64> {
        let raw = self.backend.position()?;
        Ok(raw - (self.buf_len - self.buf_pos) as u64)
    }

    /// 当前总长度; 写入过程中文件会增长, 每次重新查询
    pub fn size(&self) -> Option<u64> {
        match &self.backend {
            Backend::File { file, .. } => file.metadata().ok().map(|m| m.len()),
            Backend::Memory(cursor) => Some(cursor.get_ref().len() as u64),
        }
    }

    /// 文件路径, 内存流为 "memory"
    pub fn name(&self) -> &str {
        match &self.backend {
            Backend::File { name, .. } => name,
            Backend::Memory(_) => "memory",
        }
    }

    /// 内存流的全部数据 (文件返回 `None`)
    pub fn memory_data(&self) -> Option<&[u8]> {
        match &self.backend {
            Backend::File { .. } => None,
            Backend::Memory(cursor) => Some(cursor.get_ref()),
        }
    }
}
