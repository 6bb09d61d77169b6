//! 容器格式注册表.
//!
//! 保存 APE/WAV 的解封装器、封装器工厂与格式探测器, 支持按文件头自动识别输入.

use std::io::SeekFrom;

use tao_core::{TaoError, TaoResult};

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::probe::{FormatProbe, ProbeResult};

/// 解封装器工厂函数类型
pub type DemuxerFactory = fn() -> TaoResult<Box<dyn Demuxer>>;

/// 封装器工厂函数类型
pub type MuxerFactory = fn() -> TaoResult<Box<dyn Muxer>>;

/// 探测时最多读取的字节数
const PROBE_SIZE: u64 = 8192;

/// 容器格式注册表
#[derive(Default)]
pub struct FormatRegistry {
    demuxers: Vec<(FormatId, DemuxerFactory)>,
    muxers: Vec<(FormatId, MuxerFactory)>,
    probes: Vec<Box<dyn FormatProbe + Send>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_demuxer(&mut self, format_id: FormatId, factory: DemuxerFactory) {
        self.demuxers.push((format_id, factory));
    }

    pub fn register_muxer(&mut self, format_id: FormatId, factory: MuxerFactory) {
        self.muxers.push((format_id, factory));
    }

    pub fn register_probe(&mut self, probe: Box<dyn FormatProbe + Send>) {
        self.probes.push(probe);
    }

    /// 创建未打开的解封装器
    pub fn create_demuxer(&self, format_id: FormatId) -> TaoResult<Box<dyn Demuxer>> {
        let (_, factory) = self
            .demuxers
            .iter()
            .find(|(id, _)| *id == format_id)
            .ok_or_else(|| TaoError::FormatNotFound(format!("未找到 {format_id} 的解封装器")))?;
        factory()
    }

    /// 创建封装器
    pub fn create_muxer(&self, format_id: FormatId) -> TaoResult<Box<dyn Muxer>> {
        let (_, factory) = self
            .muxers
            .iter()
            .find(|(id, _)| *id == format_id)
            .ok_or_else(|| TaoError::FormatNotFound(format!("未找到 {format_id} 的封装器")))?;
        factory()
    }

    /// 已注册的解封装器格式
    pub fn demuxer_formats(&self) -> Vec<FormatId> {
        self.demuxers.iter().map(|(id, _)| *id).collect()
    }

    /// 已注册的封装器格式
    pub fn muxer_formats(&self) -> Vec<FormatId> {
        self.muxers.iter().map(|(id, _)| *id).collect()
    }

    /// 返回置信度最高的探测结果, 同分时先注册者优先
    pub fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeResult> {
        self.probes
            .iter()
            .filter_map(|p| {
                p.probe(data, filename).map(|score| ProbeResult {
                    format_id: p.format_id(),
                    score,
                })
            })
            .fold(None, |best: Option<ProbeResult>, r| match best {
                Some(b) if b.score >= r.score => Some(b),
                _ => Some(r),
            })
    }

    /// 读取文件头探测格式, 完成后回到起始位置
    pub fn probe_input(&self, io: &mut IoContext, filename: Option<&str>) -> TaoResult<ProbeResult> {
        let size = io.size().unwrap_or(PROBE_SIZE).min(PROBE_SIZE) as usize;
        let mut head = vec![0u8; size];
        let n = io.read_up_to(&mut head)?;
        head.truncate(n);
        io.seek(SeekFrom::Start(0))?;

        self.probe(&head, filename)
            .ok_or_else(|| TaoError::FormatNotFound("无法识别输入文件格式".into()))
    }

    /// 探测格式, 创建并打开对应的解封装器
    pub fn open_input(
        &self,
        io: &mut IoContext,
        filename: Option<&str>,
    ) -> TaoResult<Box<dyn Demuxer>> {
        let result = self.probe_input(io, filename)?;
        let mut demuxer = self.create_demuxer(result.format_id)?;
        demuxer.open(io)?;
        Ok(demuxer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muxers::wav::canonical_header;
    use crate::probe::{SCORE_EXTENSION, SCORE_MAX};
    use tao_codec::ape::WaveFormat;

    fn registry() -> FormatRegistry {
        let mut reg = FormatRegistry::new();
        crate::register_all(&mut reg);
        reg
    }

    #[test]
    fn test_注册全部格式() {
        let reg = registry();
        assert_eq!(reg.demuxer_formats(), vec![FormatId::Ape, FormatId::Wav]);
        assert_eq!(reg.muxer_formats(), vec![FormatId::Ape, FormatId::Wav]);
        assert!(reg.create_muxer(FormatId::Ape).is_ok());
    }

    #[test]
    fn test_魔数优先于扩展名() {
        let reg = registry();
        let fmt = WaveFormat::new(1, 8, 8000).unwrap();
        let wav = canonical_header(&fmt, 0);
        let result = reg.probe(&wav, Some("misnamed.ape")).unwrap();
        assert_eq!(result.format_id, FormatId::Wav);
        assert_eq!(result.score, SCORE_MAX);

        let result = reg.probe(&[0u8; 16], Some("a.ape")).unwrap();
        assert_eq!(result.format_id, FormatId::Ape);
        assert_eq!(result.score, SCORE_EXTENSION);
    }

    #[test]
    fn test_探测_wav_并打开() {
        let fmt = WaveFormat::new(2, 16, 44100).unwrap();
        let mut data = canonical_header(&fmt, 8);
        data.extend_from_slice(&[0u8; 8]);
        let mut io = IoContext::from_memory(data);

        let demuxer = registry().open_input(&mut io, None).unwrap();
        assert_eq!(demuxer.format_id(), FormatId::Wav);
        assert_eq!(demuxer.streams().len(), 1);
    }

    #[test]
    fn test_无法识别的输入() {
        let mut io = IoContext::from_memory(vec![0x55; 64]);
        let err = registry().probe_input(&mut io, Some("a.bin")).unwrap_err();
        assert!(matches!(err, TaoError::FormatNotFound(_)));
        assert_eq!(io.position().unwrap(), 0);
    }
}
