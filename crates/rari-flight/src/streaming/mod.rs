use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{Notify, mpsc};
use tracing::debug;

use crate::config::StreamConfig;
use crate::destination::Destination;
use crate::error::{FlightError, Rejection};
use crate::request::{Request, RequestStatus};
use crate::wire_format::Chunk;


type StreamItem = Result<Bytes, FlightError>;

/// Destination feeding a [`FlightStream`]. Reports backpressure once the bytes the
/// consumer has not read yet reach the high-water mark.
pub struct ChannelDestination {
    sender: Option<mpsc::UnboundedSender<StreamItem>>,
    buffered: Arc<AtomicUsize>,
    high_water_mark: usize,
}

impl Destination for ChannelDestination {
    fn write_chunk(&mut self, chunk: Chunk) -> Result<bool, FlightError> {
        let sender = self.sender.as_ref().ok_or_else(|| FlightError::destination("stream already closed"))?;
        let bytes = chunk.into_bytes();
        let len = bytes.len();
        // Counted before sending so the reader never subtracts bytes not yet added.
        let buffered = self.buffered.fetch_add(len, Ordering::SeqCst) + len;
        if sender.send(Ok(bytes)).is_err() {
            self.buffered.fetch_sub(len, Ordering::SeqCst);
            return Err(FlightError::destination("stream consumer went away"));
        }
        Ok(buffered < self.high_water_mark)
    }

    fn close(&mut self) {
        self.sender = None;
    }

    fn close_with_error(&mut self, error: &FlightError) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Err(error.clone()));
        }
    }
}

/// Aborts a streaming request from any thread.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    control: mpsc::UnboundedSender<Option<Rejection>>,
}

impl AbortHandle {
    pub fn abort(&self, reason: Option<Rejection>) {
        let _ = self.control.send(reason);
    }
}

/// The wire output of a request, as a stream of byte chunks.
pub struct FlightStream {
    receiver: mpsc::UnboundedReceiver<StreamItem>,
    buffered: Arc<AtomicUsize>,
    high_water_mark: usize,
    drained: Arc<Notify>,
    abort: AbortHandle,
}

impl FlightStream {
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.receiver.is_closed() && self.receiver.is_empty()
    }

    /// Reads the whole stream. Stops at the first error.
    pub async fn collect_bytes(mut self) -> Result<Vec<u8>, FlightError> {
        let mut out = Vec::new();
        while let Some(item) = self.receiver.recv().await {
            let bytes = item?;
            self.release(bytes.len());
            out.extend_from_slice(&bytes);
        }
        Ok(out)
    }

    fn release(&self, len: usize) {
        let before = self.buffered.fetch_sub(len, Ordering::SeqCst);
        if before >= self.high_water_mark && before - len < self.high_water_mark {
            self.drained.notify_one();
        }
    }
}

impl Drop for FlightStream {
    fn drop(&mut self) {
        // Outstanding abort handles keep the control channel open, so closing it is not enough.
        self.abort.abort(None);
    }
}

impl Stream for FlightStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                self.release(bytes.len());
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs `request` on a tokio task and returns its output stream. Dropping the
/// stream aborts the request, even while abort handles are still held.
pub fn render_to_stream(request: Request, config: &StreamConfig) -> FlightStream {
    let (sender, receiver) = mpsc::unbounded_channel();
    let (control, control_rx) = mpsc::unbounded_channel();
    let buffered = Arc::new(AtomicUsize::new(0));
    let drained = Arc::new(Notify::new());
    let high_water_mark = config.high_water_mark.max(1);

    let destination = ChannelDestination { sender: Some(sender), buffered: Arc::clone(&buffered), high_water_mark };
    tokio::spawn(drive(request, destination, Arc::clone(&drained), control_rx));

    FlightStream { receiver, buffered, high_water_mark, drained, abort: AbortHandle { control } }
}

async fn drive(
    mut request: Request,
    destination: ChannelDestination,
    drained: Arc<Notify>,
    mut control: mpsc::UnboundedReceiver<Option<Rejection>>,
) {
    request.start_flowing(destination);
    request.start_work();

    while request.status() == RequestStatus::Open {
        tokio::select! {
            _ = request.wait_for_ping() => request.work_until_idle(),
            _ = drained.notified(), if request.is_paused() => request.resume_flowing(),
            command = control.recv() => match command {
                Some(reason) => request.abort(reason),
                None => {
                    debug!("Flight stream dropped before completion");
                    request.abort(None);
                    break;
                }
            },
        }
    }
    debug!("Flight request finished with status {:?}", request.status());
}
