//! Session transcript dumps for post-mortem inspection.
//!
//! Each finished session is written as `<dir>/<timestamp>-<n>.json`, where
//! `n` is the first suffix not already taken. Files are written to a temp file
//! in the same directory and linked into place without clobbering, so readers
//! never see partial JSON and concurrent sessions never share a name.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::core::types::Session;

#[derive(Debug, Serialize)]
struct TranscriptFile<'a> {
    written_at: String,
    status: &'static str,
    stop_reason: &'static str,
    session: &'a Session,
}

/// Write `session` under `dir`, creating the directory if needed.
pub fn write_transcript(dir: &Path, session: &Session) -> Result<PathBuf> {
    write_transcript_at(dir, session, Utc::now())
}

fn write_transcript_at(dir: &Path, session: &Session, now: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create transcript dir {}", dir.display()))?;

    let stamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let file = TranscriptFile {
        written_at: now.to_rfc3339(),
        status: if session.stop.is_success() {
            "success"
        } else {
            "error"
        },
        stop_reason: session.stop.label(),
        session,
    };
    let mut buf = serde_json::to_string_pretty(&file)?;
    buf.push('\n');

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(buf.as_bytes())
        .with_context(|| format!("write {}", tmp.path().display()))?;

    for n in 1u32.. {
        let path = dir.join(format!("{stamp}-{n}.json"));
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => tmp = err.file,
            Err(err) => {
                return Err(err.error).with_context(|| format!("persist {}", path.display()));
            }
        }
    }
    Err(anyhow!("no free transcript name for {stamp} in {}", dir.display()))
}
