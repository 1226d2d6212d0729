//! Byte-level transforms behind each stage
//!
//! Every function here is pure and buffers its whole input in memory.

use crate::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::ser::Formatter;
use std::io::{self, Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the single member written into zip payloads
pub const ZIP_MEMBER: &str = "s3plz.txt";

/// zstd level used for the `zst` stage
const ZSTD_LEVEL: i32 = 3;

/// bytes > gzip
pub fn to_gz(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// gzip > bytes
pub fn from_gz(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// bytes > zip archive holding a single member
pub fn to_zip(data: &[u8]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(ZIP_MEMBER, options)?;
    writer.write_all(data)?;
    Ok(writer.finish()?.into_inner())
}

/// zip archive > bytes of its first member, whatever it is called
pub fn from_zip(data: &[u8]) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut member = archive.by_index(0)?;
    // the declared size comes from the archive and is not trusted
    let mut out = Vec::new();
    member.read_to_end(&mut out)?;
    Ok(out)
}

/// bytes > zstd frame
pub fn to_zst(data: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::encode_all(data, ZSTD_LEVEL)?)
}

/// zstd frame > bytes
pub fn from_zst(data: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::decode_all(data)?)
}

/// JSON text with `", "` between items and `": "` after keys
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// value > JSON text, e.g. `{"key": "value", "n": [1, 2]}`
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Raw bytes stored as a JSON string; the bytes must be UTF-8
pub fn bytes_to_json(data: &[u8]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(data).map_err(|e| crate::Error::InvalidPipeline {
        pipeline: "json".into(),
        reason: format!("raw payload is not UTF-8 text: {}", e),
    })?;
    to_json(text)
}

pub fn bytes_from_json(data: &[u8]) -> Result<Vec<u8>> {
    let text: String = serde_json::from_slice(data)?;
    Ok(text.into_bytes())
}

/// Raw bytes stored as a bincode byte sequence
pub fn bytes_to_bincode(data: &[u8]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(data)?)
}

pub fn bytes_from_bincode(data: &[u8]) -> Result<Vec<u8>> {
    Ok(bincode::deserialize(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gz_is_standard_gzip() {
        let packed = to_gz(b"uqbar").unwrap();
        // gzip magic
        assert_eq!(&packed[..2], &[0x1f, 0x8b]);
        assert_eq!(from_gz(&packed).unwrap(), b"uqbar");
    }

    #[test]
    fn test_zip_reads_first_member_regardless_of_name() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("something-else.bin", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello world").unwrap();
        let archive = writer.finish().unwrap().into_inner();

        assert_eq!(from_zip(&archive).unwrap(), b"hello world");
    }

    #[test]
    fn test_zip_writes_one_member() {
        let packed = to_zip(b"uqbar").unwrap();
        let archive = ZipArchive::new(Cursor::new(packed)).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(names, vec![ZIP_MEMBER]);
    }

    #[test]
    fn test_empty_zip_is_an_error() {
        let archive = ZipWriter::new(Cursor::new(Vec::new()))
            .finish()
            .unwrap()
            .into_inner();
        assert!(matches!(from_zip(&archive), Err(crate::Error::Zip(_))));
    }

    #[test]
    fn test_json_text_separators() {
        let text = to_json(&serde_json::json!({"key": "value", "n": [1, 2], "o": {}})).unwrap();
        assert_eq!(
            String::from_utf8(text).unwrap(),
            r#"{"key": "value", "n": [1, 2], "o": {}}"#
        );
        assert_eq!(to_json(&Vec::<u8>::new()).unwrap(), b"[]");
    }

    #[test]
    fn test_zip_with_oversized_declared_length() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().large_file(true);
        writer.start_file(ZIP_MEMBER, options).unwrap();
        writer.write_all(b"small payload").unwrap();
        let mut archive = writer.finish().unwrap().into_inner();

        // claim u64::MAX uncompressed bytes in the central directory
        let cd = archive
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        archive[cd + 24..cd + 28].copy_from_slice(&[0xff; 4]);
        let name_len = u16::from_le_bytes([archive[cd + 28], archive[cd + 29]]) as usize;
        let extra_len = u16::from_le_bytes([archive[cd + 30], archive[cd + 31]]) as usize;
        let mut at = cd + 46 + name_len;
        let end = at + extra_len;
        while at + 4 <= end {
            let id = u16::from_le_bytes([archive[at], archive[at + 1]]);
            let len = u16::from_le_bytes([archive[at + 2], archive[at + 3]]) as usize;
            if id == 0x0001 && len >= 8 {
                archive[at + 4..at + 12].copy_from_slice(&u64::MAX.to_le_bytes());
                break;
            }
            at += 4 + len;
        }

        // an error or the real bytes, but never an allocation panic
        if let Ok(out) = from_zip(&archive) {
            assert_eq!(out, b"small payload");
        }
    }

    #[test]
    fn test_bytes_as_json_string() {
        let encoded = bytes_to_json(b"hello").unwrap();
        assert_eq!(encoded, br#""hello""#);
        assert_eq!(bytes_from_json(&encoded).unwrap(), b"hello");
    }

    #[test]
    fn test_non_utf8_bytes_rejected_by_json() {
        assert!(bytes_to_json(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_garbage_is_not_gzip() {
        assert!(from_gz(b"definitely not gzip").is_err());
    }
}
