//! Append-only surface logs — append, tail-read, enumerate
//!
//! The log is the durable source of truth for every surface. One JSON line
//! per turn, in append order:
//!
//! ```text
//! <data_dir>/surfaces/<encoded surface>.log.jsonl
//! {"surface":"g1-c42","ordinal":0,"role":"user","speaker":7,"alias":"mika","text":"hi","ts":"..."}
//! {"surface":"g1-c42","ordinal":1,"role":"assistant","speaker":99,"alias":"bot","text":"hello","ts":"..."}
//! ```
//!
//! Reads never fail towards callers of `read_tail`: a missing or unreadable
//! file is the same as an empty log.

use recallbot_core::{Error, Result, SurfaceKey, Turn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOG_SUFFIX: &str = ".log.jsonl";
const TAIL_BLOCK: usize = 8 * 1024;

#[derive(Clone, Debug)]
pub struct LogStore {
    root: PathBuf,
}

impl LogStore {
    /// Logs live under `<data_dir>/surfaces/`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { root: data_dir.as_ref().join("surfaces") }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn surface_path(&self, surface: &SurfaceKey) -> PathBuf {
        self.root.join(format!("{}{}", encode_component(surface.as_str()), LOG_SUFFIX))
    }

    /// Append one turn as a single line. The line is written with one
    /// `write_all` on an `O_APPEND` handle.
    pub async fn append(&self, turn: &Turn) -> Result<()> {
        let path = self.surface_path(&turn.surface);
        let mut line = serde_json::to_string(turn)?;
        line.push('\n');

        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || append_line(&target, &line))
            .await
            .map_err(io::Error::other)
            .and_then(|r| r);

        written.map_err(|e| Error::storage_write(path, e))
    }

    /// Last `lines` records in chronological order. A missing file is an
    /// empty log; other I/O failures are returned.
    pub async fn try_read_tail(&self, surface: &SurfaceKey, lines: usize) -> Result<Vec<Turn>> {
        let path = self.surface_path(surface);
        let target = path.clone();
        let raw = tokio::task::spawn_blocking(move || tail_lines(&target, lines))
            .await
            .map_err(io::Error::other)
            .and_then(|r| r);

        match raw {
            Ok(raw) => Ok(parse_records(surface, &raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::storage_read(path, e)),
        }
    }

    /// Like `try_read_tail`, but read failures degrade to "no records".
    pub async fn read_tail(&self, surface: &SurfaceKey, lines: usize) -> Vec<Turn> {
        match self.try_read_tail(surface, lines).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!("Treating unreadable log as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Ordinal the next appended record must take: one past the newest
    /// parseable record, found by scanning back past torn or malformed
    /// lines. When no line parses, the line count is used so ordinals
    /// still never repeat. A missing file gives 0.
    pub async fn next_ordinal(&self, surface: &SurfaceKey) -> Result<u64> {
        let path = self.surface_path(surface);
        let target = path.clone();
        let next = tokio::task::spawn_blocking(move || scan_next_ordinal(&target))
            .await
            .map_err(io::Error::other)
            .and_then(|r| r);

        match next {
            Ok(next) => Ok(next),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::storage_read(path, e)),
        }
    }

    /// Size of the surface's log in bytes; 0 when it cannot be inspected.
    pub async fn byte_len(&self, surface: &SurfaceKey) -> u64 {
        tokio::fs::metadata(self.surface_path(surface))
            .await
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Every surface that has a log file.
    pub async fn surfaces(&self) -> Vec<SurfaceKey> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_surfaces(&root))
            .await
            .unwrap_or_default()
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).read(true).append(true).open(path)?;

    // A record left without its newline (a write cut short) must not swallow
    // the next one.
    let mut data = Vec::with_capacity(line.len() + 1);
    let len = f.metadata()?.len();
    if len > 0 {
        let mut last = [0u8; 1];
        f.seek(SeekFrom::Start(len - 1))?;
        f.read_exact(&mut last)?;
        if last[0] != b'\n' {
            warn!("Terminating torn final line in {}", path.display());
            data.push(b'\n');
        }
    }
    data.extend_from_slice(line.as_bytes());
    f.write_all(&data)?;
    f.flush()
}

fn list_surfaces(root: &Path) -> Vec<SurfaceKey> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut surfaces: Vec<SurfaceKey> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter_map(|name| name.strip_suffix(LOG_SUFFIX).and_then(decode_component))
        .map(SurfaceKey::from)
        .collect();
    surfaces.sort();
    surfaces
}

fn parse_records(surface: &SurfaceKey, lines: &[String]) -> Vec<Turn> {
    lines
        .iter()
        .filter_map(|line| match serde_json::from_str::<Turn>(line) {
            Ok(turn) => Some(turn),
            Err(e) => {
                debug!("Skipping malformed log line in {}: {}", surface, e);
                None
            }
        })
        .collect()
}

/// Visit non-blank lines newest first, reading backwards from the end of the
/// file in blocks, until `visit` returns true. Cost follows how far back the
/// caller looks rather than the file size.
fn scan_back<F>(path: &Path, mut visit: F) -> io::Result<()>
where
    F: FnMut(&[u8]) -> bool,
{
    let mut file = File::open(path)?;
    let mut pos = file.seek(SeekFrom::End(0))?;
    // Start of a line whose beginning lies further back.
    let mut carry: Vec<u8> = Vec::new();

    while pos > 0 {
        let read = TAIL_BLOCK.min(pos as usize);
        pos -= read as u64;
        file.seek(SeekFrom::Start(pos))?;
        let mut buf = vec![0u8; read];
        file.read_exact(&mut buf)?;
        buf.extend_from_slice(&carry);

        let cut = if pos == 0 {
            0
        } else {
            match buf.iter().position(|b| *b == b'\n') {
                Some(i) => i + 1,
                None => {
                    carry = buf;
                    continue;
                }
            }
        };
        for line in buf[cut..].rsplit(|b| *b == b'\n') {
            if !line.iter().all(u8::is_ascii_whitespace) && visit(line) {
                return Ok(());
            }
        }
        carry = if cut == 0 { Vec::new() } else { buf[..cut - 1].to_vec() };
    }
    Ok(())
}

/// Last `max_lines` non-blank lines, oldest first.
pub(crate) fn tail_lines(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    if max_lines == 0 {
        File::open(path)?;
        return Ok(lines);
    }
    scan_back(path, |line| {
        lines.push(String::from_utf8_lossy(line).trim().to_string());
        lines.len() >= max_lines
    })?;
    lines.reverse();
    Ok(lines)
}

pub(crate) fn scan_next_ordinal(path: &Path) -> io::Result<u64> {
    let mut seen = 0u64;
    let mut newest = None;
    scan_back(path, |line| {
        seen += 1;
        match serde_json::from_slice::<Turn>(line) {
            Ok(turn) => {
                newest = Some(turn.ordinal);
                true
            }
            Err(_) => false,
        }
    })?;
    Ok(newest.map_or(seen, |ordinal| ordinal + 1))
}

/// Encode an identifier into a file-name-safe form. ASCII alphanumerics,
/// `-`, `_` and `.` pass through; every other byte becomes `~XX`.
pub fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
            out.push(b as char);
        } else {
            out.push_str(&format!("~{:02X}", b));
        }
    }
    out
}

/// Inverse of `encode_component`. `None` for names we did not produce.
pub fn decode_component(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'~' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
