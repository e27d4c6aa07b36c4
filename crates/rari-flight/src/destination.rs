use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

use crate::error::FlightError;
use crate::wire_format::Chunk;

/// Sink for wire rows.
///
/// `write_chunk` always accepts the chunk it is given; returning `Ok(false)` asks the
/// caller to stop writing until it is resumed.
pub trait Destination: Send {
    fn begin_writing(&mut self) {}

    fn write_chunk(&mut self, chunk: Chunk) -> Result<bool, FlightError>;

    fn complete_writing(&mut self) {}

    fn flush_buffered(&mut self) -> Result<(), FlightError> {
        Ok(())
    }

    fn close(&mut self);

    fn close_with_error(&mut self, error: &FlightError);
}

#[derive(Debug, Default)]
struct BufferState {
    output: Vec<u8>,
    chunks: usize,
    budget: Option<usize>,
    closed: bool,
    error: Option<FlightError>,
}

/// In-memory destination. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferDestination {
    state: Arc<Mutex<BufferState>>,
}

impl BufferDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports backpressure after `chunks` more writes.
    pub fn with_budget(chunks: usize) -> Self {
        let destination = Self::new();
        destination.set_budget(Some(chunks));
        destination
    }

    pub fn set_budget(&self, chunks: Option<usize>) {
        self.state.lock().budget = chunks;
    }

    pub fn output(&self) -> Vec<u8> {
        self.state.lock().output.clone()
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().output).into_owned()
    }

    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().output)
    }

    pub fn chunks_written(&self) -> usize {
        self.state.lock().chunks
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn error(&self) -> Option<FlightError> {
        self.state.lock().error.clone()
    }
}

impl Destination for BufferDestination {
    fn write_chunk(&mut self, chunk: Chunk) -> Result<bool, FlightError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(FlightError::destination("write after close"));
        }
        state.output.extend_from_slice(chunk.as_bytes());
        state.chunks += 1;
        Ok(match state.budget.as_mut() {
            Some(budget) => {
                *budget = budget.saturating_sub(1);
                *budget > 0
            }
            None => true,
        })
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }

    fn close_with_error(&mut self, error: &FlightError) {
        let mut state = self.state.lock();
        state.closed = true;
        state.error = Some(error.clone());
    }
}

/// Writes rows to any `std::io::Write`, such as stdout or a file.
pub struct IoDestination<W: Write + Send> {
    writer: W,
    closed: bool,
    error: Option<FlightError>,
}

impl<W: Write + Send> IoDestination<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, closed: false, error: None }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn error(&self) -> Option<&FlightError> {
        self.error.as_ref()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Destination for IoDestination<W> {
    fn write_chunk(&mut self, chunk: Chunk) -> Result<bool, FlightError> {
        self.writer.write_all(chunk.as_bytes())?;
        Ok(true)
    }

    fn flush_buffered(&mut self) -> Result<(), FlightError> {
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("Failed to flush output on close: {}", e);
        }
        self.closed = true;
    }

    fn close_with_error(&mut self, error: &FlightError) {
        let _ = self.writer.flush();
        self.closed = true;
        self.error = Some(error.clone());
    }
}
