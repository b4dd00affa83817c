//! Compass 原生文件格式（.compass）
//!
//! MessagePack + Zstd 的紧凑二进制格式，文件头 16 字节：
//! 魔数、格式版本、标志位、压缩后数据长度（均为小端 u32）。

use crate::document::Snapshot;
use crate::error::FileError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// 文件魔数 "CMPS"
const MAGIC: &[u8; 4] = b"CMPS";

/// 当前文件格式版本
const FORMAT_VERSION: u32 = 1;

/// Zstd 压缩级别（1-22，3 是默认值，平衡速度和压缩比）
const COMPRESSION_LEVEL: i32 = 3;

/// 文件头长度
const HEADER_SIZE: usize = 16;

/// 文件头
#[derive(Debug)]
struct FileHeader {
    magic: [u8; 4],
    version: u32,
    /// 标志位（预留）
    flags: u32,
    compressed_size: u32,
}

impl FileHeader {
    fn new(compressed_size: u32) -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            flags: 0,
            compressed_size,
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<(), std::io::Error> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        Ok(())
    }

    fn read(reader: &mut impl Read) -> Result<Self, FileError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        if &magic != MAGIC {
            return Err(FileError::InvalidFormat(
                "Invalid magic number, not a Compass file".to_string(),
            ));
        }

        let mut buf = [0u8; 4];

        reader.read_exact(&mut buf)?;
        let version = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let flags = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let compressed_size = u32::from_le_bytes(buf);

        Ok(Self {
            magic,
            version,
            flags,
            compressed_size,
        })
    }
}

/// 编码为原生二进制格式
pub fn to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>, FileError> {
    let msgpack_data = rmp_serde::to_vec(snapshot)?;
    let compressed_data = zstd::encode_all(msgpack_data.as_slice(), COMPRESSION_LEVEL)?;

    let compressed_size = u32::try_from(compressed_data.len()).map_err(|_| {
        FileError::InvalidFormat("Snapshot too large for the native format".to_string())
    })?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + compressed_data.len());
    FileHeader::new(compressed_size).write(&mut bytes)?;
    bytes.extend_from_slice(&compressed_data);
    Ok(bytes)
}

/// 从原生二进制格式解码
pub fn from_bytes(bytes: &[u8]) -> Result<Snapshot, FileError> {
    read_snapshot(&mut &bytes[..])
}

fn read_snapshot(reader: &mut impl Read) -> Result<Snapshot, FileError> {
    let header = FileHeader::read(reader)?;

    if header.version > FORMAT_VERSION {
        return Err(FileError::UnsupportedVersion(format!(
            "File version {} is newer than supported version {}",
            header.version, FORMAT_VERSION
        )));
    }

    // 长度来自文件头，按实际读到的字节分配
    let mut compressed_data = Vec::new();
    reader
        .by_ref()
        .take(u64::from(header.compressed_size))
        .read_to_end(&mut compressed_data)?;
    if compressed_data.len() != header.compressed_size as usize {
        return Err(FileError::Corruption("Truncated snapshot data".to_string()));
    }

    let msgpack_data = zstd::decode_all(compressed_data.as_slice())?;
    let snapshot: Snapshot = rmp_serde::from_slice(&msgpack_data)?;
    snapshot.check_version()?;
    Ok(snapshot)
}

/// 保存快照到文件
pub fn save(snapshot: &Snapshot, path: &Path) -> Result<(), FileError> {
    let bytes = to_bytes(snapshot)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;

    tracing::info!(
        "Saved {} primitives to {} ({} bytes compressed)",
        snapshot.len(),
        path.display(),
        bytes.len() - HEADER_SIZE
    );

    Ok(())
}

/// 从文件加载快照
pub fn load(path: &Path) -> Result<Snapshot, FileError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let snapshot = read_snapshot(&mut reader)?;

    tracing::info!(
        "Loaded {} primitives from {}",
        snapshot.len(),
        path.display()
    );

    Ok(snapshot)
}
