// crates/reelqueue-media/src/chunk.rs
//
// ChunkWriter: the `io::Write` a codec writes its output into.
//
//   Buffer mode: bytes accumulate; `finish` moves the whole Vec out in
//                 Done{Buffer}. Nothing is copied on the way.
//   Stream mode: every CHUNK_SIZE bytes a StreamChunk{bytes, position} goes
//                 out immediately. `finish` sends Done{Stream}, then the final
//                 partial chunk, then StreamComplete{total_bytes}.
//
// `position` is the byte offset of the chunk's first byte in the output, so
// positions are strictly increasing and contiguous for one job.

use std::io::{self, Write};

use crossbeam_channel::Sender;

use reelqueue_core::protocol::{DoneResult, JobId, SinkMode, WorkerEvent};

/// Stream-mode chunk size, 1 MiB.
pub const CHUNK_SIZE: usize = 1024 * 1024;

pub struct ChunkWriter {
    job_id:  JobId,
    mode:    SinkMode,
    tx:      Sender<WorkerEvent>,
    pending: Vec<u8>,
    /// Offset of `pending[0]` in the output.
    emitted: u64,
}

impl ChunkWriter {
    pub fn new(job_id: JobId, mode: SinkMode, tx: Sender<WorkerEvent>) -> Self {
        Self { job_id, mode, tx, pending: Vec::new(), emitted: 0 }
    }

    /// Total bytes written so far.
    pub fn total(&self) -> u64 {
        self.emitted + self.pending.len() as u64
    }

    fn send(&self, event: WorkerEvent) -> io::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "worker event channel closed"))
    }

    fn emit(&mut self, len: usize) -> io::Result<()> {
        let rest  = self.pending.split_off(len);
        let bytes = std::mem::replace(&mut self.pending, rest);
        let position = self.emitted;
        self.emitted += bytes.len() as u64;
        self.send(WorkerEvent::StreamChunk { job_id: self.job_id.clone(), bytes, position })
    }

    /// Terminal events for a successful encode.
    pub fn finish(mut self, mime: &str, filename: &str) -> io::Result<u64> {
        let total = self.total();
        match self.mode {
            SinkMode::Buffer => {
                let payload = std::mem::take(&mut self.pending);
                self.send(WorkerEvent::Done {
                    job_id: self.job_id.clone(),
                    result: DoneResult::Buffer { payload, mime: mime.into(), filename: filename.into() },
                })?;
            }
            SinkMode::Stream => {
                self.send(WorkerEvent::Done {
                    job_id: self.job_id.clone(),
                    result: DoneResult::Stream { mime: mime.into(), filename: filename.into() },
                })?;
                if !self.pending.is_empty() {
                    let len = self.pending.len();
                    self.emit(len)?;
                }
                self.send(WorkerEvent::StreamComplete { job_id: self.job_id.clone(), total_bytes: total })?;
            }
        }
        Ok(total)
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        if self.mode == SinkMode::Stream {
            while self.pending.len() >= CHUNK_SIZE {
                self.emit(CHUNK_SIZE)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
