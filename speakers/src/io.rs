//! JSON documents for speaker id mappings and x-vector tables.
//!
//! Documents are UTF-8 JSON written with 4-space indentation so they stay
//! readable and diff well. Reads are all-or-nothing: a document is fully
//! parsed before the caller sees any of it.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::PrettyFormatter;

use crate::error::{Result, SpeakerError};
use crate::ids::SpeakerIdMap;
use crate::xvector::XVectorTable;

const INDENT: &[u8] = b"    ";

/// Reads and parses a JSON document.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|source| SpeakerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        if source.is_io() {
            SpeakerError::Io {
                path: path.to_path_buf(),
                source: source.into(),
            }
        } else {
            SpeakerError::Parse {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Writes a JSON document with 4-space indentation and a trailing newline.
///
/// The parent directory must exist. Nothing is written if the value does
/// not serialize.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let io_err = |source| SpeakerError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    value
        .serialize(&mut ser)
        .map_err(|e| io_err(std::io::Error::from(e)))?;
    buf.push(b'\n');

    let mut w = BufWriter::new(File::create(path).map_err(io_err)?);
    w.write_all(&buf).map_err(io_err)?;
    w.flush().map_err(io_err)
}

/// Loads a `{speaker_name: id}` document.
pub fn load_speaker_ids(path: &Path) -> Result<SpeakerIdMap> {
    let ids: SpeakerIdMap = load_json(path)?;
    tracing::debug!(path = %path.display(), speakers = ids.len(), "speakers: loaded id mapping");
    if !ids.is_dense() {
        tracing::warn!(path = %path.display(), "speakers: id mapping is not contiguous from 0");
    }
    Ok(ids)
}

pub fn save_speaker_ids(path: &Path, ids: &SpeakerIdMap) -> Result<()> {
    save_json(path, ids)?;
    tracing::debug!(path = %path.display(), speakers = ids.len(), "speakers: saved id mapping");
    Ok(())
}

/// Loads a `{clip_id: {"name": ..., "embedding": [...]}}` document.
pub fn load_x_vectors(path: &Path) -> Result<XVectorTable> {
    let table: XVectorTable = load_json(path)?;
    tracing::debug!(path = %path.display(), clips = table.len(), "speakers: loaded x-vectors");
    Ok(table)
}

/// Saves an x-vector table. Tables with NaN or infinite values are
/// rejected before the file is touched.
pub fn save_x_vectors(path: &Path, table: &XVectorTable) -> Result<()> {
    table.check_finite()?;
    save_json(path, table)?;
    tracing::debug!(path = %path.display(), clips = table.len(), "speakers: saved x-vectors");
    Ok(())
}
