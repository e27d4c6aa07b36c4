use serde_json::{Value, json};
use std::collections::VecDeque;

use super::{Request, RequestStatus};
use crate::destination::Destination;
use crate::error::{FlightError, Postpone, Rejection};
use crate::wire_format::{Chunk, ChunkId, row, tokens};

/// Finished rows waiting for the destination, by flush priority.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    next_chunk_id: ChunkId,
    /// Rows promised but not yet written. Hint rows are not counted.
    pub pending_chunks: usize,
    pub imports: VecDeque<Chunk>,
    pub hints: VecDeque<Chunk>,
    pub regular: VecDeque<Chunk>,
    pub errors: VecDeque<Chunk>,
}

impl Outbox {
    pub fn allocate_id(&mut self) -> ChunkId {
        let id = self.next_chunk_id;
        self.next_chunk_id += 1;
        id
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.hints.is_empty() && self.regular.is_empty() && self.errors.is_empty()
    }

    /// Writes queued rows in priority order. Returns `Ok(false)` when the destination
    /// asked to stop; unwritten rows stay queued.
    pub fn drain_into(&mut self, destination: &mut dyn Destination) -> Result<bool, FlightError> {
        let pending = &mut self.pending_chunks;
        for (queue, counted) in [
            (&mut self.imports, true),
            (&mut self.hints, false),
            (&mut self.regular, true),
            (&mut self.errors, true),
        ] {
            while let Some(chunk) = queue.pop_front() {
                if counted {
                    *pending -= 1;
                }
                if !destination.write_chunk(chunk)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

impl Request {
    pub(super) fn emit_model_chunk(&mut self, id: ChunkId, json: &Value) -> Result<(), FlightError> {
        self.outbox.regular.push_back(row::model_row(id, json)?);
        Ok(())
    }

    pub(super) fn emit_import_chunk(&mut self, id: ChunkId, metadata: &Value) -> Result<(), FlightError> {
        self.outbox.imports.push_back(row::import_row(id, metadata)?);
        Ok(())
    }

    pub(super) fn emit_hint_chunk(&mut self, code: &str, model: &Value) -> Result<(), FlightError> {
        let id = self.outbox.allocate_id();
        self.outbox.hints.push_back(row::hint_row(id, code, model)?);
        Ok(())
    }

    pub(super) fn emit_symbol_chunk(&mut self, id: ChunkId, name: &str) -> Result<(), FlightError> {
        self.outbox.imports.push_back(row::reference_row(id, &tokens::symbol(name))?);
        Ok(())
    }

    pub(super) fn emit_provider_chunk(&mut self, id: ChunkId, name: &str) -> Result<(), FlightError> {
        self.outbox.regular.push_back(row::reference_row(id, &tokens::provider(name))?);
        Ok(())
    }

    pub(super) fn emit_text_chunk(&mut self, id: ChunkId, text: &str) {
        self.outbox.regular.extend(row::text_rows(id, text));
    }

    pub(super) fn emit_error_chunk(&mut self, id: ChunkId, digest: &str, error: &FlightError) -> Result<(), FlightError> {
        let info = if self.debug {
            json!({
                "digest": digest,
                "message": error.to_string(),
                "stack": error.stack().unwrap_or_default(),
            })
        } else {
            json!({ "digest": digest })
        };
        self.outbox.errors.push_back(row::error_row(id, &info)?);
        Ok(())
    }

    pub(super) fn emit_postpone_chunk(&mut self, id: ChunkId, postpone: &Postpone) -> Result<(), FlightError> {
        let info = self.debug.then(|| {
            json!({
                "reason": postpone.reason,
                "stack": postpone.stack.as_deref().unwrap_or_default(),
            })
        });
        self.outbox.errors.push_back(row::postpone_row(id, info.as_ref())?);
        Ok(())
    }

    /// Error or postpone row for `id`, reporting to the matching callback.
    pub(super) fn emit_rejection(&mut self, id: ChunkId, rejection: &Rejection) -> Result<(), FlightError> {
        match rejection {
            Rejection::Postpone(postpone) => {
                self.log_postpone(&postpone.reason);
                self.emit_postpone_chunk(id, postpone)
            }
            Rejection::Error(error) => {
                let digest = self.log_recoverable_error(error);
                self.emit_error_chunk(id, &digest, error)
            }
        }
    }

    pub(super) fn log_recoverable_error(&self, error: &FlightError) -> String {
        (self.on_error)(error).unwrap_or_default()
    }

    pub(super) fn log_postpone(&self, reason: &str) {
        (self.on_postpone)(reason);
    }

    pub(super) fn handle_fatal_error(&mut self, error: FlightError) {
        tracing::error!(code = error.code(), "Fatal error in flight request: {}", error);
        match self.destination.take() {
            Some(mut destination) => {
                self.status = RequestStatus::Closed;
                destination.close_with_error(&error);
            }
            None => {
                self.status = RequestStatus::Closing;
                self.fatal_error = Some(error);
            }
        }
    }

    pub(super) fn flush_completed_chunks(&mut self) -> Result<(), FlightError> {
        let Some(mut destination) = self.destination.take() else {
            return Ok(());
        };

        destination.begin_writing();
        let drained = self.outbox.drain_into(destination.as_mut());
        destination.complete_writing();

        let keep_writing = match drained.and_then(|keep| destination.flush_buffered().map(|()| keep)) {
            Ok(keep) => keep,
            Err(e) => {
                self.destination = Some(destination);
                return Err(e);
            }
        };

        if self.outbox.pending_chunks == 0 {
            debug_assert!(self.outbox.is_empty(), "rows left behind at completion");
            tracing::debug!("Flight request complete, closing destination");
            self.status = RequestStatus::Closed;
            destination.close();
        } else if keep_writing {
            self.destination = Some(destination);
        } else {
            self.paused = Some(destination);
        }
        Ok(())
    }
}
