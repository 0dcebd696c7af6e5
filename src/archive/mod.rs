//! Package archive reading - .nupkg containers.
//!
//! A .nupkg is a zip archive: managed modules live under `lib/<tfm>/`,
//! the manifest is a top-level `.nuspec` XML file. The extractor selects
//! the candidate modules worth inspecting (one winner per module name by
//! TFM priority) and writes them to a per-call scratch directory.
//!
//! Stateless over the archive bytes; safe to call concurrently for
//! different archives.

pub mod tfm;

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

use crate::error::ArchiveError;
use crate::util::hash::sha256_bytes;

pub use tfm::{Tfm, TfmFamily};

/// One extracted module, written to the scratch directory.
#[derive(Debug, Clone)]
pub struct ModuleCandidate {
    /// Module file name as it appeared in the package (`Foo.Bar.dll`).
    pub file_name: String,

    /// The TFM variant that won selection for this module name.
    pub tfm: Tfm,

    /// On-disk location inside the per-call scratch directory.
    pub path: PathBuf,
}

/// List every entry path in the archive.
pub fn list_entries(bytes: &[u8]) -> Result<Vec<String>, ArchiveError> {
    let mut zip = open(bytes)?;
    let mut entries = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let file = zip
            .by_index(i)
            .map_err(ArchiveError::BadContainer)?;
        entries.push(file.name().to_string());
    }
    Ok(entries)
}

/// Read one entry's bytes. Entry names are matched case-insensitively,
/// since packers disagree about path casing.
pub fn read_entry(bytes: &[u8], entry: &str) -> Result<Vec<u8>, ArchiveError> {
    let mut zip = open(bytes)?;
    let index = (0..zip.len())
        .find(|&i| {
            zip.by_index(i)
                .map(|f| f.name().eq_ignore_ascii_case(entry))
                .unwrap_or(false)
        })
        .ok_or_else(|| ArchiveError::EntryNotFound(entry.to_string()))?;

    let mut file = zip.by_index(index).map_err(ArchiveError::BadContainer)?;
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)
        .map_err(|source| ArchiveError::EntryRead {
            entry: entry.to_string(),
            source,
        })?;
    Ok(data)
}

/// Read the declared dependency ids from the package's .nuspec manifest.
///
/// Dependency groups for different TFMs are flattened; ids are deduplicated
/// case-insensitively, keeping first-seen order and casing.
pub fn read_manifest_dependencies(bytes: &[u8]) -> Result<Vec<String>, ArchiveError> {
    let entry = list_entries(bytes)?
        .into_iter()
        .find(|name| !name.contains('/') && name.to_ascii_lowercase().ends_with(".nuspec"))
        .ok_or(ArchiveError::MissingManifest)?;

    let xml = read_entry(bytes, &entry)?;
    let xml = String::from_utf8_lossy(&xml).into_owned();
    parse_nuspec_dependencies(&xml)
}

/// Extract the candidate managed modules into `scratch`, one winner per
/// module name. Zero candidates is a valid result: the package is a
/// meta-package and carries no code.
pub fn extract_modules(
    bytes: &[u8],
    scratch: &Path,
) -> Result<Vec<ModuleCandidate>, ArchiveError> {
    // Winner per lowercased module file name, keyed for determinism.
    let mut winners: BTreeMap<String, (Tfm, String, String)> = BTreeMap::new();

    for entry in list_entries(bytes)? {
        let Some((tfm, file_name)) = classify_module_entry(&entry) else {
            continue;
        };

        let key = file_name.to_ascii_lowercase();
        match winners.get(&key) {
            Some((best, _, _)) if *best >= tfm => {}
            _ => {
                winners.insert(key, (tfm, file_name, entry.clone()));
            }
        }
    }

    let mut candidates = Vec::with_capacity(winners.len());
    for (_, (tfm, file_name, entry)) in winners {
        let data = read_entry(bytes, &entry)?;
        let path = scratch.join(&file_name);
        std::fs::write(&path, &data).map_err(|source| ArchiveError::ScratchWrite {
            path: path.display().to_string(),
            source,
        })?;

        tracing::debug!(
            "selected module {} ({}, {} bytes, sha256 {})",
            file_name,
            tfm,
            data.len(),
            &sha256_bytes(&data)[..16]
        );

        candidates.push(ModuleCandidate {
            file_name,
            tfm,
            path,
        });
    }

    Ok(candidates)
}

fn open(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, ArchiveError> {
    ZipArchive::new(Cursor::new(bytes)).map_err(ArchiveError::BadContainer)
}

/// Decide whether an archive entry is an inspectable managed module, and
/// if so split it into (TFM, module file name).
///
/// `lib/<tfm>/Name.dll` qualifies. Docs (`.xml`), symbols (`.pdb`),
/// satellite resource assemblies (`.resources.dll`, or nested under a
/// culture folder), and anything outside `lib/` (native `runtimes/`,
/// `ref/`, build props) do not.
fn classify_module_entry(entry: &str) -> Option<(Tfm, String)> {
    let lower = entry.to_ascii_lowercase();
    let mut parts = entry.split('/');

    let root = parts.next()?;
    if !root.eq_ignore_ascii_case("lib") {
        return None;
    }
    let tfm_part = parts.next()?;
    let file = parts.next()?;
    // A fourth segment means a culture subfolder (satellite assembly).
    if parts.next().is_some() {
        return None;
    }
    if !lower.ends_with(".dll") || lower.ends_with(".resources.dll") {
        return None;
    }

    Some((Tfm::parse(tfm_part), file.to_string()))
}

fn parse_nuspec_dependencies(xml: &str) -> Result<Vec<String>, ArchiveError> {
    let mut reader = Reader::from_str(xml);
    let mut ids: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() != b"dependency" {
                    continue;
                }
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| ArchiveError::BadManifest(e.to_string()))?;
                    if attr.key.local_name().as_ref() == b"id" {
                        let id = attr
                            .unescape_value()
                            .map_err(|e| ArchiveError::BadManifest(e.to_string()))?
                            .into_owned();
                        let key = id.to_ascii_lowercase();
                        if !seen.contains(&key) {
                            seen.push(key);
                            ids.push(id);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ArchiveError::BadManifest(e.to_string())),
        }
    }

    Ok(ids)
}
