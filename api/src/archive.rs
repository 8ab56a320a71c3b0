use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::ImportError;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const DATA_EXTENSION: &str = ".json";

/// One data file ready for the pipeline, either uploaded directly or
/// extracted from an archive.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub name: String,
    pub contents: Vec<u8>,
}

pub fn looks_like_zip(name: &str, bytes: &[u8]) -> bool {
    name.to_ascii_lowercase().ends_with(".zip") || bytes.starts_with(&ZIP_MAGIC)
}

/// Turn one uploaded unit into data files. Archives are expanded to
/// their history members; anything else passes through unchanged. A
/// corrupt archive fails only this unit, never its siblings.
pub fn unwrap_upload(name: &str, bytes: Vec<u8>) -> Result<Vec<ExportFile>, ImportError> {
    if !looks_like_zip(name, &bytes) {
        return Ok(vec![ExportFile {
            name: name.to_string(),
            contents: bytes,
        }]);
    }

    let corrupt = |message: String| ImportError::CorruptArchive {
        file: name.to_string(),
        message,
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(e.to_string()))?;

    let mut files = Vec::new();
    for index in 0..archive.len() {
        let mut member = archive.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        if member.is_dir() {
            continue;
        }
        let member_name = member.name().to_string();
        if !is_candidate_member(&member_name) {
            tracing::debug!("skipping archive member {}", member_name);
            continue;
        }
        let mut contents = Vec::with_capacity(member.size() as usize);
        member
            .read_to_end(&mut contents)
            .map_err(|e| corrupt(format!("{}: {}", member_name, e)))?;
        files.push(ExportFile {
            name: member_name,
            contents,
        });
    }

    Ok(files)
}

/// Which archive members qualify as data files: history JSON only,
/// never macOS resource forks or hidden system artifacts.
fn is_candidate_member(path: &str) -> bool {
    if !path.to_ascii_lowercase().ends_with(DATA_EXTENSION) {
        return false;
    }
    if path.starts_with("__MACOSX/") {
        return false;
    }
    let base = path.rsplit('/').next().unwrap_or(path);
    !base.starts_with("._") && !base.starts_with('.')
}
