//! Container sniffing for decrypted payloads.
//!
//! A payload is either a ZIP archive of JSON members or a single bare JSON
//! document. The decision is made from the leading bytes, never from a file
//! name, so callers do not care how the bytes were transported.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::ZipArchive;

/// Local file header signature of a ZIP archive.
const ZIP_LOCAL_HEADER: &[u8; 4] = b"PK\x03\x04";
/// End-of-central-directory signature; an empty archive starts with it.
const ZIP_EMPTY_ARCHIVE: &[u8; 4] = b"PK\x05\x06";
/// Members with this suffix are structured-text records.
const RECORD_SUFFIX: &str = ".json";

/// Errors raised while unpacking a container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The archive structure could not be read.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// Reading a member or writing an extracted file failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// A member name would land outside the extraction directory.
    #[error("archive member escapes target directory: {0}")]
    UnsafePath(String),
}

/// True when the payload carries a ZIP signature.
pub fn is_archive(payload: &[u8]) -> bool {
    payload.starts_with(ZIP_LOCAL_HEADER) || payload.starts_with(ZIP_EMPTY_ARCHIVE)
}

/// Splits a decrypted payload into raw record bytes.
///
/// Archives yield one record per `.json` member in archive order; anything
/// else is returned whole as a single record.
pub fn extract_records(payload: &[u8]) -> Result<Vec<Vec<u8>>, ContainerError> {
    if !is_archive(payload) {
        return Ok(vec![payload.to_vec()]);
    }
    let mut archive = ZipArchive::new(Cursor::new(payload))?;
    let mut records = Vec::new();
    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        if member.is_dir() || !member.name().ends_with(RECORD_SUFFIX) {
            continue;
        }
        let mut contents = Vec::new();
        member.read_to_end(&mut contents)?;
        records.push(contents);
    }
    Ok(records)
}

/// Expands every ZIP archive found directly inside `dir` into `dir`.
///
/// Returns the paths of the files written. Archives are detected by signature,
/// not extension; the archives themselves are left in place.
pub fn expand_archives(dir: &Path) -> Result<Vec<PathBuf>, ContainerError> {
    let mut names = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    names.sort();

    let mut written = Vec::new();
    for path in names {
        if !file_is_archive(&path)? {
            continue;
        }
        tracing::info!(archive = %path.display(), "expanding input archive");
        let mut archive = ZipArchive::new(File::open(&path)?)?;
        for index in 0..archive.len() {
            let mut member = archive.by_index(index)?;
            let relative = member
                .enclosed_name()
                .ok_or_else(|| ContainerError::UnsafePath(member.name().to_string()))?;
            let target = dir.join(relative);
            if member.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut member, &mut out)?;
            written.push(target);
        }
    }
    Ok(written)
}

fn file_is_archive(path: &Path) -> Result<bool, ContainerError> {
    let mut head = [0u8; 4];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(is_archive(&head))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub(crate) fn build_zip(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, body) in members {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn temp_dir(name: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("token_proof_{name}_{unique}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn bare_payload_is_one_record() {
        let records = extract_records(br#"{"tokens":[]}"#).unwrap();
        assert_eq!(records, vec![br#"{"tokens":[]}"#.to_vec()]);
    }

    #[test]
    fn archive_yields_one_record_per_json_member() {
        let payload = build_zip(&[
            ("a.json", br#"{"tokens":[]}"#),
            ("notes.txt", b"ignored"),
            ("nested/b.json", br#"{"tokens":[1]}"#),
            ("c.json", br#"{"tokens":[2]}"#),
        ]);
        assert!(is_archive(&payload));
        let records = extract_records(&payload).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], br#"{"tokens":[1]}"#.to_vec());
    }

    #[test]
    fn declared_member_size_is_not_trusted() {
        let mut payload = build_zip(&[("a.json", br#"{"tokens":[]}"#)]);
        let central = payload
            .windows(4)
            .position(|w| w == b"PK\x01\x02")
            .unwrap();
        payload[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        let records = extract_records(&payload).unwrap();
        assert_eq!(records, vec![br#"{"tokens":[]}"#.to_vec()]);
    }

    #[test]
    fn empty_archive_yields_nothing() {
        let payload = build_zip(&[]);
        assert!(is_archive(&payload));
        assert!(extract_records(&payload).unwrap().is_empty());
    }

    #[test]
    fn truncated_archive_is_an_error() {
        let payload = build_zip(&[("a.json", b"{}")]);
        assert!(extract_records(&payload[..payload.len() / 2]).is_err());
    }

    #[test]
    fn expand_archives_unpacks_next_to_archive() {
        let dir = temp_dir("expand");
        let payload = build_zip(&[("sub.json", br#"{"tokens":[]}"#)]);
        fs::write(dir.join("upload.bin"), payload).unwrap();
        fs::write(dir.join("plain.json"), b"{}").unwrap();

        let written = expand_archives(&dir).unwrap();
        assert_eq!(written, vec![dir.join("sub.json")]);
        assert_eq!(
            fs::read(dir.join("sub.json")).unwrap(),
            br#"{"tokens":[]}"#.to_vec()
        );
        fs::remove_dir_all(&dir).unwrap();
    }
}
