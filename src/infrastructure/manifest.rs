//! Reads `AndroidManifest.xml` out of an APK.
//!
//! The manifest is stored as Android binary XML (AXML): a sequence of chunks
//! (string pool, resource map, namespace and element nodes). Only the pieces
//! needed to read `manifest@package` and `application@label` are decoded.

use crate::error::ParseError;
use crate::models::Manifest;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";

const RES_XML_TYPE: u16 = 0x0003;
const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;

const UTF8_FLAG: u32 = 1 << 8;
const NO_INDEX: u32 = 0xFFFF_FFFF;

const TYPE_REFERENCE: u8 = 0x01;
const TYPE_STRING: u8 = 0x03;

/// android:label
const ATTR_LABEL_RES_ID: u32 = 0x0101_0001;

/// Parses the manifest of an archive on disk
pub trait ManifestParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<Manifest, ParseError>;
}

/// Parser for plain APK archives
pub struct ApkManifestParser;

impl ManifestParser for ApkManifestParser {
    fn parse(&self, path: &Path) -> Result<Manifest, ParseError> {
        let file = File::open(path).map_err(|e| ParseError::Archive(e.to_string()))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| ParseError::Archive(e.to_string()))?;

        let mut entry = archive
            .by_name(MANIFEST_ENTRY)
            .map_err(|_| ParseError::Manifest(format!("{} not found", MANIFEST_ENTRY)))?;

        let mut data = Vec::with_capacity((entry.size() as usize).min(8 * 1024 * 1024));
        entry
            .read_to_end(&mut data)
            .map_err(|e| ParseError::Manifest(e.to_string()))?;

        decode_manifest(&data)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn u8_at(&self, offset: usize) -> Result<u8, ParseError> {
        self.data.get(offset).copied().ok_or_else(truncated)
    }

    fn u16_at(&self, offset: usize) -> Result<u16, ParseError> {
        let bytes = self.data.get(offset..offset + 2).ok_or_else(truncated)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32_at(&self, offset: usize) -> Result<u32, ParseError> {
        let bytes = self.data.get(offset..offset + 4).ok_or_else(truncated)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], ParseError> {
        self.data.get(offset..offset + len).ok_or_else(truncated)
    }
}

fn truncated() -> ParseError {
    ParseError::Manifest("truncated binary XML".to_string())
}

/// Decoded attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrValue {
    Text(String),
    Reference(u32),
    Other,
}

/// Decodes a binary manifest
pub fn decode_manifest(data: &[u8]) -> Result<Manifest, ParseError> {
    let cur = Cursor { data };

    if cur.u16_at(0)? != RES_XML_TYPE {
        return Err(ParseError::Manifest("not a binary XML document".to_string()));
    }

    let mut offset = cur.u16_at(2)? as usize;
    let end = (cur.u32_at(4)? as usize).min(data.len());

    let mut strings: Vec<String> = Vec::new();
    let mut resource_ids: Vec<u32> = Vec::new();
    let mut manifest = Manifest::default();

    while offset + 8 <= end {
        let chunk_type = cur.u16_at(offset)?;
        let header_size = cur.u16_at(offset + 2)? as usize;
        let chunk_size = cur.u32_at(offset + 4)? as usize;

        if chunk_size < 8 {
            return Err(ParseError::Manifest(format!(
                "invalid chunk size {} at offset {}",
                chunk_size, offset
            )));
        }

        match chunk_type {
            RES_STRING_POOL_TYPE => strings = read_string_pool(&cur, offset)?,
            RES_XML_RESOURCE_MAP_TYPE => {
                let count = chunk_size.saturating_sub(header_size) / 4;
                resource_ids = (0..count)
                    .map(|i| cur.u32_at(offset + header_size + i * 4))
                    .collect::<Result<_, _>>()?;
            }
            RES_XML_START_ELEMENT_TYPE => {
                let ext = offset + header_size;
                let name = string_at(&strings, cur.u32_at(ext + 4)?);
                let attr_start = cur.u16_at(ext + 8)? as usize;
                let attr_size = cur.u16_at(ext + 10)? as usize;
                let attr_count = cur.u16_at(ext + 12)? as usize;

                for i in 0..attr_count {
                    let attr = ext + attr_start + i * attr_size;
                    let name_idx = cur.u32_at(attr + 4)?;
                    let attr_name = string_at(&strings, name_idx);
                    let res_id = resource_ids.get(name_idx as usize).copied();
                    let value = read_attr_value(&cur, &strings, attr)?;

                    match (name, attr_name) {
                        (Some("manifest"), Some("package")) => {
                            if let AttrValue::Text(v) = value {
                                manifest.package = Some(v);
                            }
                        }
                        (Some("application"), _)
                            if attr_name == Some("label") || res_id == Some(ATTR_LABEL_RES_ID) =>
                        {
                            match value {
                                AttrValue::Text(v) => manifest.label = Some(v),
                                // Resolving resources.arsc is out of reach here; keep the default label
                                AttrValue::Reference(id) => {
                                    tracing::debug!("application label is resource 0x{:08x}", id)
                                }
                                AttrValue::Other => {}
                            }
                        }
                        _ => {}
                    }
                }

                if name == Some("application") {
                    // Nothing we need lives past the application element
                    break;
                }
            }
            _ => {}
        }

        offset += chunk_size;
    }

    Ok(manifest)
}

fn read_attr_value(
    cur: &Cursor<'_>,
    strings: &[String],
    attr: usize,
) -> Result<AttrValue, ParseError> {
    let raw = cur.u32_at(attr + 8)?;
    let data_type = cur.u8_at(attr + 15)?;
    let data = cur.u32_at(attr + 16)?;

    if raw != NO_INDEX {
        return Ok(string_at(strings, raw)
            .map(|s| AttrValue::Text(s.to_string()))
            .unwrap_or(AttrValue::Other));
    }

    Ok(match data_type {
        TYPE_STRING => string_at(strings, data)
            .map(|s| AttrValue::Text(s.to_string()))
            .unwrap_or(AttrValue::Other),
        TYPE_REFERENCE => AttrValue::Reference(data),
        _ => AttrValue::Other,
    })
}

fn string_at(strings: &[String], index: u32) -> Option<&str> {
    if index == NO_INDEX {
        return None;
    }
    strings.get(index as usize).map(String::as_str)
}

fn read_string_pool(cur: &Cursor<'_>, chunk: usize) -> Result<Vec<String>, ParseError> {
    let header_size = cur.u16_at(chunk + 2)? as usize;
    let count = cur.u32_at(chunk + 8)? as usize;
    let flags = cur.u32_at(chunk + 16)?;
    let strings_start = chunk + cur.u32_at(chunk + 20)? as usize;
    let utf8 = flags & UTF8_FLAG != 0;

    let mut strings = Vec::with_capacity(count.min(4096));
    for i in 0..count {
        let offset = strings_start + cur.u32_at(chunk + header_size + i * 4)? as usize;
        let s = if utf8 {
            read_utf8(cur, offset)?
        } else {
            read_utf16(cur, offset)?
        };
        strings.push(s);
    }

    Ok(strings)
}

fn read_utf8(cur: &Cursor<'_>, mut offset: usize) -> Result<String, ParseError> {
    // UTF-16 length first (unused), then the UTF-8 byte length, each 1 or 2 bytes
    offset += if cur.u8_at(offset)? & 0x80 != 0 { 2 } else { 1 };

    let first = cur.u8_at(offset)? as usize;
    let len = if first & 0x80 != 0 {
        let len = ((first & 0x7F) << 8) | cur.u8_at(offset + 1)? as usize;
        offset += 2;
        len
    } else {
        offset += 1;
        first
    };

    Ok(String::from_utf8_lossy(cur.slice(offset, len)?).into_owned())
}

fn read_utf16(cur: &Cursor<'_>, mut offset: usize) -> Result<String, ParseError> {
    let first = cur.u16_at(offset)? as usize;
    let len = if first & 0x8000 != 0 {
        let len = ((first & 0x7FFF) << 16) | cur.u16_at(offset + 2)? as usize;
        offset += 4;
        len
    } else {
        offset += 2;
        first
    };

    let units = (0..len)
        .map(|i| cur.u16_at(offset + i * 2))
        .collect::<Result<Vec<u16>, _>>()?;

    Ok(String::from_utf16_lossy(&units))
}
