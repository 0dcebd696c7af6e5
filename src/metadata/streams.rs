//! Metadata root and heap streams.
//!
//! The metadata root ("BSJB") carries named streams: `#~` (the physical
//! tables), `#Strings`, `#Blob`, `#GUID` and `#US`. Heaps hand out data by
//! byte offset; all offsets here are ranges into the owning module's bytes
//! so the parsed module stays free of self-references.

use std::ops::Range;

use crate::error::MetadataError;

const ROOT_SIGNATURE: u32 = 0x424A_5342; // "BSJB"

/// Stream ranges discovered in a metadata root, relative to the slice the
/// root was parsed from.
#[derive(Debug, Default)]
pub struct StreamDirectory {
    pub tables: Option<Range<usize>>,
    pub strings: Option<Range<usize>>,
    pub blobs: Option<Range<usize>>,
    pub guids: Option<Range<usize>>,
}

/// Parse the metadata root's stream directory.
pub fn parse_root(md: &[u8]) -> Result<StreamDirectory, MetadataError> {
    if read_u32(md, 0)? != ROOT_SIGNATURE {
        return Err(MetadataError::BadRoot("missing BSJB signature"));
    }

    // Skip major/minor/reserved, then the length-prefixed version string
    // (padded to a 4-byte boundary).
    let version_len = read_u32(md, 12)? as usize;
    let mut pos = 16 + version_len;
    pos = (pos + 3) & !3;

    // Flags, then stream count.
    let stream_count = read_u16(md, pos + 2)? as usize;
    pos += 4;

    let mut dir = StreamDirectory::default();
    for _ in 0..stream_count {
        let offset = read_u32(md, pos)? as usize;
        let size = read_u32(md, pos + 4)? as usize;
        pos += 8;

        let name_start = pos;
        let name_end = md
            .get(name_start..)
            .and_then(|rest| rest.iter().position(|&b| b == 0))
            .map(|i| name_start + i)
            .ok_or(MetadataError::BadRoot("unterminated stream name"))?;
        let name = &md[name_start..name_end];
        // Name field is null-terminated and padded to 4 bytes.
        pos = (name_end + 1 + 3) & !3;

        if offset.checked_add(size).map_or(true, |end| end > md.len()) {
            return Err(MetadataError::BadRoot("stream extends past metadata"));
        }
        let range = offset..offset + size;

        match name {
            b"#~" | b"#-" => dir.tables = Some(range),
            b"#Strings" => dir.strings = Some(range),
            b"#Blob" => dir.blobs = Some(range),
            b"#GUID" => dir.guids = Some(range),
            // "#US" and anything vendor-specific is irrelevant here.
            _ => {}
        }
    }

    Ok(dir)
}

/// Read a null-terminated UTF-8 string out of the `#Strings` heap.
pub fn heap_string(strings: &[u8], offset: u32) -> &str {
    let offset = offset as usize;
    if offset >= strings.len() {
        return "";
    }
    let bytes = &strings[offset..];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).unwrap_or("")
}

/// Read a length-prefixed blob out of the `#Blob` heap.
pub fn heap_blob(blobs: &[u8], offset: u32) -> Option<&[u8]> {
    let mut pos = offset as usize;
    if pos >= blobs.len() {
        return None;
    }
    let len = read_compressed_u32(blobs, &mut pos)? as usize;
    blobs.get(pos..pos + len)
}

/// Decode an ECMA-335 compressed unsigned integer, advancing `pos`.
pub fn read_compressed_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
    let b0 = *data.get(*pos)? as u32;
    if b0 & 0x80 == 0 {
        *pos += 1;
        Some(b0)
    } else if b0 & 0xC0 == 0x80 {
        let b1 = *data.get(*pos + 1)? as u32;
        *pos += 2;
        Some(((b0 & 0x3F) << 8) | b1)
    } else if b0 & 0xE0 == 0xC0 {
        let b1 = *data.get(*pos + 1)? as u32;
        let b2 = *data.get(*pos + 2)? as u32;
        let b3 = *data.get(*pos + 3)? as u32;
        *pos += 4;
        Some(((b0 & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3)
    } else {
        None
    }
}

pub fn read_u16(data: &[u8], offset: usize) -> Result<u16, MetadataError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(MetadataError::Truncated("metadata u16"))
}

pub fn read_u32(data: &[u8], offset: usize) -> Result<u32, MetadataError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(MetadataError::Truncated("metadata u32"))
}

pub fn read_u64(data: &[u8], offset: usize) -> Result<u64, MetadataError> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .ok_or(MetadataError::Truncated("metadata u64"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_u32_widths() {
        let mut pos = 0;
        assert_eq!(read_compressed_u32(&[0x03], &mut pos), Some(3));
        assert_eq!(pos, 1);

        let mut pos = 0;
        assert_eq!(read_compressed_u32(&[0x7F], &mut pos), Some(0x7F));

        let mut pos = 0;
        assert_eq!(read_compressed_u32(&[0x80, 0x80], &mut pos), Some(0x80));
        assert_eq!(pos, 2);

        let mut pos = 0;
        assert_eq!(read_compressed_u32(&[0xAE, 0x57], &mut pos), Some(0x2E57));

        let mut pos = 0;
        assert_eq!(
            read_compressed_u32(&[0xC0, 0x00, 0x40, 0x00], &mut pos),
            Some(0x4000)
        );
        assert_eq!(pos, 4);

        // 0xE0-prefixed bytes are invalid.
        let mut pos = 0;
        assert_eq!(read_compressed_u32(&[0xF0], &mut pos), None);
    }

    #[test]
    fn test_heap_string_lookup() {
        let heap = b"\0First\0Second\0";
        assert_eq!(heap_string(heap, 0), "");
        assert_eq!(heap_string(heap, 1), "First");
        assert_eq!(heap_string(heap, 7), "Second");
        assert_eq!(heap_string(heap, 999), "");
    }

    #[test]
    fn test_heap_blob_lookup() {
        let heap = b"\0\x03abc\x02xy";
        assert_eq!(heap_blob(heap, 1), Some(&b"abc"[..]));
        assert_eq!(heap_blob(heap, 5), Some(&b"xy"[..]));
        assert_eq!(heap_blob(heap, 100), None);
    }

    #[test]
    fn test_parse_root_finds_streams() {
        let root = test_root::build_root(&[
            ("#~", &[1, 2, 3, 4]),
            ("#Strings", b"\0abc\0"),
            ("#Blob", &[0]),
            ("#GUID", &[0; 16]),
        ]);
        let dir = parse_root(&root).unwrap();
        let tables = dir.tables.unwrap();
        assert_eq!(&root[tables], &[1, 2, 3, 4]);
        let strings = dir.strings.unwrap();
        assert_eq!(&root[strings], b"\0abc\0");
        assert!(dir.blobs.is_some());
        assert!(dir.guids.is_some());
    }

    #[test]
    fn test_parse_root_rejects_garbage() {
        assert!(matches!(
            parse_root(b"XXXXsomething"),
            Err(MetadataError::BadRoot(_))
        ));
    }
}
