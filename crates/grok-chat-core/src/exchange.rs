use std::fmt::Display;

use futures::{Stream, StreamExt as _};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument as _, debug, info, warn};

use crate::accumulator::{AccumulatedMessage, StreamAssembler};
use crate::errors::{ChatError, StreamFailure};
use crate::observability::exchange_span;

/// Receives the message as it grows and once it is final.
///
/// `on_update` is the renderer hook and fires after every fragment that
/// changed the content. `on_finalized` is the persistence hook and fires
/// exactly once per exchange.
#[async_trait::async_trait]
pub trait MessageObserver: Send {
    async fn on_update(&mut self, _message: &AccumulatedMessage) {}

    async fn on_finalized(&mut self, _message: &AccumulatedMessage) {}
}

/// Result of driving one exchange to the end of its transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub message: AccumulatedMessage,
    /// Set when the transport failed or the exchange was aborted.
    pub failure: Option<StreamFailure>,
}

/// Consumes a response body until the transport closes or fails.
///
/// Always returns a finalized message; read failures become annotations on
/// whatever content had arrived.
pub async fn drive_exchange<S, B, E, O>(chunks: S, observer: &mut O) -> ExchangeOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    O: MessageObserver + ?Sized,
{
    drive(chunks, observer, None).await
}

enum Step<T> {
    Chunk(Option<T>),
    Aborted,
    AbortDetached,
    Spurious,
}

async fn drive<S, B, E, O>(
    chunks: S,
    observer: &mut O,
    mut abort_rx: Option<watch::Receiver<bool>>,
) -> ExchangeOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    O: MessageObserver + ?Sized,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut assembler = StreamAssembler::new();

    let failure = loop {
        let step = match abort_rx.as_mut() {
            Some(rx) => tokio::select! {
                changed = rx.changed() => match changed {
                    Ok(()) if *rx.borrow() => Step::Aborted,
                    Ok(()) => Step::Spurious,
                    Err(_) => Step::AbortDetached,
                },
                next = chunks.next() => Step::Chunk(next),
            },
            None => Step::Chunk(chunks.next().await),
        };

        match step {
            Step::Chunk(Some(Ok(chunk))) => {
                for line in assembler.frame(chunk.as_ref()) {
                    if assembler.apply_line(&line) {
                        observer.on_update(assembler.message()).await;
                    }
                }
            }
            Step::Chunk(Some(Err(err))) => {
                warn!(error = %err, "stream read failed; keeping partial reply");
                break Some(StreamFailure::transport(err.to_string()));
            }
            Step::Chunk(None) => break None,
            Step::Aborted => {
                info!("exchange aborted by caller");
                break Some(StreamFailure::Cancelled);
            }
            Step::AbortDetached => abort_rx = None,
            Step::Spurious => {}
        }
    };

    if let Some(line) = assembler.take_trailing_line()
        && assembler.apply_line(&line)
    {
        observer.on_update(assembler.message()).await;
    }
    let message = assembler.finalize(failure.as_ref());
    debug!(
        chars = message.content().len(),
        finish_reason = ?message.finish_reason(),
        failed = failure.is_some(),
        "exchange finalized"
    );
    observer.on_finalized(&message).await;
    ExchangeOutcome { message, failure }
}

/// Handle used to abort a running exchange.
///
/// Aborting is treated like a read failure: the exchange still finalizes
/// with the content received so far.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Events published by an [`ExchangeStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// First event for every exchange.
    Started { exchange_id: uuid::Uuid },
    /// Content changed; carries a snapshot of the whole reply so far.
    Updated {
        exchange_id: uuid::Uuid,
        seq: u64,
        content: String,
    },
    /// Terminal event.
    Finalized {
        exchange_id: uuid::Uuid,
        message: AccumulatedMessage,
        failure: Option<StreamFailure>,
    },
}

struct ChannelObserver {
    exchange_id: uuid::Uuid,
    seq: u64,
    tx: mpsc::Sender<ExchangeEvent>,
}

impl ChannelObserver {
    async fn send(&self, event: ExchangeEvent) {
        if self.tx.send(event).await.is_err() {
            debug!(exchange_id = %self.exchange_id, "exchange receiver dropped");
        }
    }
}

#[async_trait::async_trait]
impl MessageObserver for ChannelObserver {
    async fn on_update(&mut self, message: &AccumulatedMessage) {
        let event = ExchangeEvent::Updated {
            exchange_id: self.exchange_id,
            seq: self.seq,
            content: message.content().to_string(),
        };
        self.seq = self.seq.saturating_add(1);
        self.send(event).await;
    }
}

/// A running exchange, driven on a background task.
///
/// Use `next_event()` to follow the reply as it grows and `finish()` for the
/// finalized outcome.
pub struct ExchangeStream {
    exchange_id: uuid::Uuid,
    rx: mpsc::Receiver<ExchangeEvent>,
    final_rx: oneshot::Receiver<ExchangeOutcome>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl ExchangeStream {
    /// Spawns a task that drives `chunks` to completion.
    ///
    /// `capacity` bounds the number of buffered events; it must be non-zero.
    pub fn spawn<S, B, E>(chunks: S, capacity: usize) -> Result<Self, ChatError>
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        if capacity == 0 {
            return Err(ChatError::Validation(
                "event buffer capacity must be greater than 0".into(),
            ));
        }
        let exchange_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);

        let task = async move {
            let mut observer = ChannelObserver {
                exchange_id,
                seq: 0,
                tx,
            };
            observer.send(ExchangeEvent::Started { exchange_id }).await;
            let outcome = drive(chunks, &mut observer, Some(abort_rx)).await;
            observer
                .send(ExchangeEvent::Finalized {
                    exchange_id,
                    message: outcome.message.clone(),
                    failure: outcome.failure.clone(),
                })
                .await;
            let _ = final_tx.send(outcome);
        };
        tokio::spawn(task.instrument(exchange_span(exchange_id)));

        Ok(Self {
            exchange_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        })
    }

    pub fn exchange_id(&self) -> uuid::Uuid {
        self.exchange_id
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event. Returns `None` once the channel is closed.
    pub async fn next_event(&mut self) -> Option<ExchangeEvent> {
        let event = self.rx.recv().await;
        if let Some(ExchangeEvent::Finalized { .. }) = &event {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events and returns the finalized outcome.
    pub async fn finish(mut self) -> Result<ExchangeOutcome, ChatError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(ExchangeEvent::Finalized { .. }) => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }
        self.final_rx.await.map_err(|_| {
            ChatError::Protocol(format!(
                "exchange {} ended without a final message",
                self.exchange_id
            ))
        })
    }
}
