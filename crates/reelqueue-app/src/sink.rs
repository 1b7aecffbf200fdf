// crates/reelqueue-app/src/sink.rs
//
// Streaming output: open → write* → close, or abort.
//
// FileSink writes `<final>.part` beside the destination and renames it into
// place on close, so a half-written file never carries the output name.
// SequentialWriter sits between the client's chunk events and a sink and owns
// the running offset.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use reelqueue_core::error::JobError;

/// A destination that accepts bytes strictly in order.
pub trait StreamingSink: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Bytes accepted so far.
    fn written(&self) -> u64;
    /// Flush and publish. Returns where the output ended up.
    fn close(self: Box<Self>) -> io::Result<PathBuf>;
    /// Drop everything written so far.
    fn abort(self: Box<Self>);
}

// ── FileSink ──────────────────────────────────────────────────────────────────

pub struct FileSink {
    out:     BufWriter<File>,
    part:    PathBuf,
    dest:    PathBuf,
    written: u64,
}

impl FileSink {
    pub fn create(dest: &Path) -> io::Result<Self> {
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut part = dest.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);
        let file = File::create(&part)?;
        debug!(path = %part.display(), "sink opened");
        Ok(Self { out: BufWriter::new(file), part, dest: dest.to_path_buf(), written: 0 })
    }

    /// Write a whole buffer result in one go.
    pub fn save(dest: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
        let mut sink = Box::new(Self::create(dest)?);
        if let Err(e) = StreamingSink::write(sink.as_mut(), bytes) {
            sink.abort();
            return Err(e);
        }
        sink.close()
    }
}

impl StreamingSink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }

    fn close(self: Box<Self>) -> io::Result<PathBuf> {
        let FileSink { out, part, dest, written } = *self;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&part, &dest)?;
        debug!(path = %dest.display(), bytes = written, "sink closed");
        Ok(dest)
    }

    fn abort(self: Box<Self>) {
        let FileSink { out, part, .. } = *self;
        drop(out);
        if let Err(e) = fs::remove_file(&part) {
            warn!(path = %part.display(), "could not remove partial output: {e}");
        }
    }
}

/// `dir/name`, or `dir/stem (n).ext` with the smallest `n` that names neither
/// an existing file nor an in-progress `.part`.
///
/// ```
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("a_converted.mp4"), b"x").unwrap();
/// let free = reelqueue_app::sink::free_path(dir.path(), "a_converted.mp4");
/// assert_eq!(free, dir.path().join("a_converted (1).mp4"));
/// ```
pub fn free_path(dir: &Path, name: &str) -> PathBuf {
    let taken = |p: &Path| {
        let mut part = p.as_os_str().to_owned();
        part.push(".part");
        p.exists() || Path::new(&part).exists()
    };
    let first = dir.join(name);
    if !taken(&first) {
        return first;
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem} ({n}){ext}"));
        if !taken(&candidate) {
            debug!(path = %candidate.display(), "output name taken, using suffix");
            return candidate;
        }
        n += 1;
    }
}

// ── SequentialWriter ──────────────────────────────────────────────────────────

/// Applies `StreamChunk`s to a sink in arrival order.
///
/// A chunk whose position disagrees with the running offset is still written
/// at the current offset; the mismatch is logged and counted.
pub struct SequentialWriter {
    sink:       Box<dyn StreamingSink>,
    offset:     u64,
    mismatches: u32,
}

impl SequentialWriter {
    pub fn new(sink: Box<dyn StreamingSink>) -> Self {
        Self { sink, offset: 0, mismatches: 0 }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn mismatches(&self) -> u32 {
        self.mismatches
    }

    pub fn write_chunk(&mut self, bytes: &[u8], position: u64) -> Result<(), JobError> {
        if position != self.offset {
            self.mismatches += 1;
            warn!(expected = self.offset, got = position, "stream chunk out of position, writing at current offset");
        }
        self.sink.write(bytes).map_err(|e| JobError::stream_write(e.to_string()))?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// Close once every announced byte is in. A short or long stream aborts
    /// the sink instead.
    pub fn finish(self, total_bytes: u64) -> Result<PathBuf, JobError> {
        if self.offset != total_bytes {
            let msg = format!("expected {total_bytes} bytes, received {}", self.offset);
            self.sink.abort();
            return Err(JobError::stream_write(msg));
        }
        self.sink.close().map_err(|e| JobError::stream_write(e.to_string()))
    }

    pub fn abort(self) {
        self.sink.abort();
    }
}
