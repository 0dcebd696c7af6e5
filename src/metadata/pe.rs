//! PE image unwrapping - locating the CLI metadata inside a module.
//!
//! Only enough of the PE/COFF format is read to find data directory 14
//! (the CLI header) and map its metadata RVA through the section table.
//! Nothing here ever executes or relocates the image.

use crate::error::MetadataError;

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const OPT_MAGIC_PE32: u16 = 0x010B;
const OPT_MAGIC_PE32_PLUS: u16 = 0x020B;
const CLI_HEADER_DIRECTORY: usize = 14;

struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
}

/// Locate the physical metadata root slice inside a raw module image.
pub fn metadata_slice(data: &[u8]) -> Result<&[u8], MetadataError> {
    if data.len() < 0x40 || read_u16(data, 0)? != DOS_MAGIC {
        return Err(MetadataError::NotPe("missing MZ header"));
    }

    let pe_offset = read_u32(data, 0x3C)? as usize;
    if read_u32(data, pe_offset)? != PE_SIGNATURE {
        return Err(MetadataError::NotPe("missing PE signature"));
    }

    // COFF header: 20 bytes after the signature.
    let coff = pe_offset + 4;
    let num_sections = read_u16(data, coff + 2)? as usize;
    let opt_size = read_u16(data, coff + 16)? as usize;

    let opt = coff + 20;
    let magic = read_u16(data, opt)?;
    let (dir_count_offset, dirs_offset) = match magic {
        OPT_MAGIC_PE32 => (opt + 92, opt + 96),
        OPT_MAGIC_PE32_PLUS => (opt + 108, opt + 112),
        _ => return Err(MetadataError::NotPe("bad optional header magic")),
    };

    let dir_count = read_u32(data, dir_count_offset)? as usize;
    if dir_count <= CLI_HEADER_DIRECTORY {
        return Err(MetadataError::NotManaged);
    }

    let cli_dir = dirs_offset + CLI_HEADER_DIRECTORY * 8;
    let cli_rva = read_u32(data, cli_dir)?;
    let cli_size = read_u32(data, cli_dir + 4)?;
    if cli_rva == 0 || cli_size == 0 {
        return Err(MetadataError::NotManaged);
    }

    let sections = read_sections(data, opt + opt_size, num_sections)?;

    // CLI header: metadata directory lives at offset 8.
    let cli_offset = rva_to_offset(&sections, cli_rva)?;
    let md_rva = read_u32(data, cli_offset + 8)?;
    let md_size = read_u32(data, cli_offset + 12)? as usize;
    if md_rva == 0 || md_size == 0 {
        return Err(MetadataError::NotManaged);
    }

    let md_offset = rva_to_offset(&sections, md_rva)?;
    data.get(md_offset..md_offset + md_size)
        .ok_or(MetadataError::Truncated("metadata directory"))
}

fn read_sections(
    data: &[u8],
    table_offset: usize,
    count: usize,
) -> Result<Vec<Section>, MetadataError> {
    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        let base = table_offset + i * 40;
        sections.push(Section {
            virtual_size: read_u32(data, base + 8)?,
            virtual_address: read_u32(data, base + 12)?,
            raw_size: read_u32(data, base + 16)?,
            raw_offset: read_u32(data, base + 20)?,
        });
    }
    Ok(sections)
}

fn rva_to_offset(sections: &[Section], rva: u32) -> Result<usize, MetadataError> {
    for s in sections {
        let span = s.virtual_size.max(s.raw_size);
        if rva >= s.virtual_address && rva < s.virtual_address.wrapping_add(span) {
            return Ok((rva - s.virtual_address + s.raw_offset) as usize);
        }
    }
    Err(MetadataError::BadRva(rva))
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, MetadataError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(MetadataError::Truncated("u16"))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, MetadataError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(MetadataError::Truncated("u32"))
}
