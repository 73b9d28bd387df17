//! Push-to-pull stream bridge.
//!
//! A streaming handler is written push-style: it receives a [`Sink`] and calls
//! [`Sink::emit`] once per message. Callers that want to consume such a handler
//! in-process want the opposite shape, a handle they can ask for the next
//! message. [`StreamBridge`] connects the two without a transport in between.
//!
//! The producer future is not spawned. It is stored inside the
//! [`StreamHandle`] and polled from [`StreamHandle::pull`], so exactly one side
//! runs at a time. Messages travel over a `tokio::sync::mpsc` channel of
//! capacity one, each paired with a `oneshot` acknowledgement: `emit` stays
//! pending until the consumer has taken the message, so a slow consumer slows
//! the producer and nothing is buffered beyond one message.
//!
//! ```text
//! producer ──emit──▶ [ mpsc(1) ] ──pull──▶ consumer
//!          ◀─ true ─ (ack)
//!          ◀─ false ─ (closed by cancel / drop)
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::stream::{FusedStream, Stream};
use healthmux_core::Status;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

type Outcome = Result<(), Status>;
type Start<T> = Box<dyn FnOnce(Sink<T>) -> BoxFuture<'static, Outcome> + Send>;
/// A message and the acknowledgement fired when the consumer takes it.
type Handoff<T> = (T, oneshot::Sender<()>);

/// A push-style streaming handler.
///
/// Implemented for every `Fn(Req, Sink<Resp>) -> impl Future<Output = Result<(), Status>>`.
pub trait StreamHandler<Req, Resp>: Send + Sync + 'static {
    fn call(&self, request: Req, sink: Sink<Resp>) -> BoxFuture<'static, Outcome>;
}

impl<F, Fut, Req, Resp> StreamHandler<Req, Resp> for F
where
    F: Fn(Req, Sink<Resp>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    fn call(&self, request: Req, sink: Sink<Resp>) -> BoxFuture<'static, Outcome> {
        Box::pin(self(request, sink))
    }
}

/// Opens pull-style streams over a push-style handler.
pub struct StreamBridge<Req, Resp> {
    handler: Arc<dyn StreamHandler<Req, Resp>>,
}

impl<Req, Resp> Clone for StreamBridge<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<Req, Resp> fmt::Debug for StreamBridge<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBridge").finish_non_exhaustive()
    }
}

impl<Req, Resp> StreamBridge<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Req, Sink<Resp>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Open one logical stream.
    ///
    /// Nothing runs yet: the handler is invoked on the first pull, and any
    /// error it returns surfaces there. The stream's token is a child of
    /// `cancel`, so cancelling the caller's token reaches the producer while
    /// cancelling the stream leaves the caller's token alone.
    pub fn open_stream(&self, request: Req, cancel: &CancellationToken) -> StreamHandle<Resp> {
        let handler = Arc::clone(&self.handler);
        let start: Start<Resp> = Box::new(move |sink| handler.call(request, sink));
        StreamHandle::new(start, cancel.child_token())
    }
}

/// The producer's end of a stream.
pub struct Sink<T> {
    tx: mpsc::Sender<Handoff<T>>,
    cancel: CancellationToken,
}

impl<T> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T> Sink<T> {
    /// Hand one message to the consumer.
    ///
    /// Resolves to `true` once the consumer has taken the message and to
    /// `false` if the consumer cancelled or went away first, in which case the
    /// message is dropped and the producer should stop.
    pub async fn emit(&self, message: T) -> bool {
        let (ack, taken) = oneshot::channel();
        if self.tx.send((message, ack)).await.is_err() {
            return false;
        }
        // The ack sender is dropped with the message if the consumer discards it.
        taken.await.is_ok()
    }

    /// Cancelled when the consumer cancels the stream, drops it, or when the
    /// token the stream was opened with is cancelled.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Typed and type-erased access to a sink.
///
/// Code that only knows the message type at runtime goes through
/// [`EmitSink::emit_any`], which checks the type and then performs exactly the
/// same hand-off as [`EmitSink::emit`].
pub trait EmitSink: Send + Sync {
    type Message: Send + 'static;

    fn emit(&self, message: Self::Message) -> impl Future<Output = bool> + Send;

    fn emit_any(
        &self,
        message: Box<dyn Any + Send>,
    ) -> impl Future<Output = Result<bool, Status>> + Send {
        async move {
            let message = message.downcast::<Self::Message>().map_err(|_| {
                Status::internal(format!(
                    "sink expects messages of type {}",
                    std::any::type_name::<Self::Message>()
                ))
            })?;
            Ok(self.emit(*message).await)
        }
    }
}

impl<T: Send + 'static> EmitSink for Sink<T> {
    type Message = T;

    fn emit(&self, message: T) -> impl Future<Output = bool> + Send {
        Sink::emit(self, message)
    }
}

/// Lifecycle of a [`StreamHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Opened, producer not started.
    Created,
    /// Producer started by the first pull.
    Active,
    /// Producer returned `Ok`.
    Completed,
    /// Producer returned an error, which has been (or is being) delivered.
    Failed,
    /// Consumer cancelled.
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The consumer's end of a stream.
///
/// Pull with [`StreamHandle::pull`], or use it as a
/// `Stream<Item = Result<T, Status>>`. Once a terminal state is reached every
/// further pull returns `Ok(None)`.
///
/// Dropping the handle closes the sink, cancels the stream's token and drops
/// the producer future.
pub struct StreamHandle<T> {
    state: StreamState,
    start: Option<(Start<T>, mpsc::Sender<Handoff<T>>)>,
    producer: Option<BoxFuture<'static, Outcome>>,
    rx: mpsc::Receiver<Handoff<T>>,
    cancel: CancellationToken,
}

impl<T> fmt::Debug for StreamHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T> StreamHandle<T> {
    fn new(start: Start<T>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            state: StreamState::Created,
            start: Some((start, tx)),
            producer: None,
            rx,
            cancel,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The stream's own token, a child of the one it was opened with.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the next message.
    ///
    /// `Ok(Some(_))` is a message, `Ok(None)` is the end of the stream and
    /// `Err(_)` is the producer's failure, returned exactly once.
    pub async fn pull(&mut self) -> Result<Option<T>, Status> {
        std::future::poll_fn(|cx| self.poll_pull(cx)).await
    }

    pub fn poll_pull(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<T>, Status>> {
        match self.state {
            StreamState::Created => self.activate(),
            StreamState::Active => {}
            _ => return Poll::Ready(Ok(None)),
        }

        // A producer on another task may have sent already.
        if let Ok(handoff) = self.rx.try_recv() {
            return Poll::Ready(Ok(Some(accept(handoff))));
        }

        let Some(producer) = self.producer.as_mut() else {
            self.state = StreamState::Completed;
            return Poll::Ready(Ok(None));
        };

        match producer.as_mut().poll(cx) {
            Poll::Ready(outcome) => {
                self.producer = None;
                self.close();
                match outcome {
                    Ok(()) => {
                        tracing::debug!("stream completed");
                        self.state = StreamState::Completed;
                        Poll::Ready(Ok(None))
                    }
                    Err(status) => {
                        tracing::debug!(code = %status.code(), "stream failed");
                        self.state = StreamState::Failed;
                        Poll::Ready(Err(status))
                    }
                }
            }
            // `None` means every sink is gone while the producer still runs;
            // its own waker brings us back.
            Poll::Pending => match self.rx.poll_recv(cx) {
                Poll::Ready(Some(handoff)) => Poll::Ready(Ok(Some(accept(handoff)))),
                Poll::Ready(None) | Poll::Pending => Poll::Pending,
            },
        }
    }

    /// Stop the stream.
    ///
    /// Pending and future emits resolve to `false`, the stream's token is
    /// cancelled, and the producer is driven until it returns so it can let go
    /// of what it holds. A producer that ignores both signals keeps this
    /// waiting. Calling it again, or after the stream ended, does nothing.
    pub async fn cancel(&mut self) {
        match self.state {
            StreamState::Created => self.start = None,
            StreamState::Active => {}
            _ => return,
        }
        self.state = StreamState::Cancelled;
        self.cancel.cancel();
        self.close();

        if let Some(producer) = self.producer.take() {
            if let Err(status) = producer.await {
                tracing::debug!(code = %status.code(), "producer returned error after cancel");
            }
        }
        tracing::debug!("stream cancelled");
    }

    fn activate(&mut self) {
        self.state = StreamState::Active;
        if let Some((start, tx)) = self.start.take() {
            let sink = Sink {
                tx,
                cancel: self.cancel.clone(),
            };
            self.producer = Some(start(sink));
            tracing::debug!("stream activated");
        }
    }

    /// Refuse further messages and discard one that was never taken, which
    /// drops its ack and resolves the waiting `emit` to `false`.
    fn close(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

fn accept<T>((message, ack): Handoff<T>) -> T {
    // The producer may have stopped waiting; the message is still delivered.
    let _ = ack.send(());
    message
}

impl<T> Drop for StreamHandle<T> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(state = ?self.state, "stream dropped before completion");
        }
        self.rx.close();
        self.cancel.cancel();
    }
}

impl<T> Stream for StreamHandle<T> {
    type Item = Result<T, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_pull(cx).map(Result::transpose)
    }
}

impl<T> FusedStream for StreamHandle<T> {
    fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use healthmux_core::Code;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(n: u32) -> StreamBridge<u32, u32> {
        StreamBridge::new(move |start: u32, sink: Sink<u32>| async move {
            for i in start..start + n {
                if !sink.emit(i).await {
                    return Ok(());
                }
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn delivers_messages_then_ends_forever() {
        let mut stream = counting(3).open_stream(10, &CancellationToken::new());

        assert_eq!(stream.pull().await.unwrap(), Some(10));
        assert_eq!(stream.pull().await.unwrap(), Some(11));
        assert_eq!(stream.pull().await.unwrap(), Some(12));
        for _ in 0..3 {
            assert_eq!(stream.pull().await.unwrap(), None);
        }
        assert_eq!(stream.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn empty_stream_ends_on_first_pull() {
        let mut stream = counting(0).open_stream(0, &CancellationToken::new());
        assert_eq!(stream.pull().await.unwrap(), None);
        assert_eq!(stream.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn failure_is_delivered_once() {
        let bridge = StreamBridge::new(|_: (), sink: Sink<&'static str>| async move {
            sink.emit("first").await;
            sink.emit("second").await;
            Err::<(), _>(Status::unavailable("backend gone"))
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());

        assert_eq!(stream.pull().await.unwrap(), Some("first"));
        assert_eq!(stream.pull().await.unwrap(), Some("second"));
        let err = stream.pull().await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
        assert_eq!(err.message(), "backend gone");
        assert_eq!(stream.state(), StreamState::Failed);
        assert_eq!(stream.pull().await.unwrap(), None);
        assert_eq!(stream.pull().await.unwrap(), None);
    }

    #[tokio::test]
    async fn handler_error_surfaces_on_first_pull() {
        let bridge = StreamBridge::new(|_: (), _sink: Sink<u8>| async move {
            Err::<(), _>(Status::invalid_argument("bad request"))
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());
        assert_eq!(stream.state(), StreamState::Created);

        let err = stream.pull().await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(stream.pull().await.unwrap(), None);
    }

    #[tokio::test]
    async fn nothing_runs_before_first_pull() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let bridge = StreamBridge::new(move |_: (), sink: Sink<u8>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                sink.emit(1).await;
                Ok(())
            }
        });

        let mut stream = bridge.open_stream((), &CancellationToken::new());
        tokio::task::yield_now().await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        assert_eq!(stream.pull().await.unwrap(), Some(1));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn producer_waits_for_each_pull() {
        let accepted = Arc::new(AtomicUsize::new(0));
        let seen = accepted.clone();
        let bridge = StreamBridge::new(move |_: (), sink: Sink<usize>| {
            let accepted = seen.clone();
            async move {
                for i in 0..3 {
                    if !sink.emit(i).await {
                        break;
                    }
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());

        assert_eq!(stream.pull().await.unwrap(), Some(0));
        assert_eq!(accepted.load(Ordering::SeqCst), 0);
        assert_eq!(stream.pull().await.unwrap(), Some(1));
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(stream.pull().await.unwrap(), Some(2));
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(stream.pull().await.unwrap(), None);
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancel_stops_the_producer() {
        let results = Arc::new(Mutex::new(Vec::new()));
        let log = results.clone();
        let bridge = StreamBridge::new(move |_: (), sink: Sink<usize>| {
            let log = log.clone();
            async move {
                for i in 0..5 {
                    let accepted = sink.emit(i).await;
                    log.lock().unwrap().push(accepted);
                    if !accepted {
                        break;
                    }
                }
                Ok(())
            }
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());

        assert_eq!(stream.pull().await.unwrap(), Some(0));
        assert_eq!(stream.pull().await.unwrap(), Some(1));
        tokio::time::timeout(Duration::from_secs(1), stream.cancel())
            .await
            .unwrap();

        assert_eq!(stream.state(), StreamState::Cancelled);
        assert!(stream.cancellation().is_cancelled());
        // The second message was taken before the cancel; the third never was.
        assert_eq!(*results.lock().unwrap(), vec![true, true, false]);
        assert_eq!(stream.pull().await.unwrap(), None);

        stream.cancel().await;
        assert_eq!(stream.state(), StreamState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_before_first_pull_never_starts_the_producer() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let bridge = StreamBridge::new(move |_: (), _sink: Sink<u8>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());

        stream.cancel().await;
        assert_eq!(stream.state(), StreamState::Cancelled);
        assert_eq!(stream.pull().await.unwrap(), None);
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_no_op() {
        let mut stream = counting(1).open_stream(0, &CancellationToken::new());
        assert_eq!(stream.pull().await.unwrap(), Some(0));
        assert_eq!(stream.pull().await.unwrap(), None);

        stream.cancel().await;
        assert_eq!(stream.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn cancel_wakes_a_producer_waiting_on_its_token() {
        let bridge = StreamBridge::new(|_: (), sink: Sink<u8>| async move {
            sink.emit(1).await;
            sink.cancellation().cancelled().await;
            Err::<(), _>(Status::cancelled("stopped"))
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());

        assert_eq!(stream.pull().await.unwrap(), Some(1));
        tokio::time::timeout(Duration::from_secs(1), stream.cancel())
            .await
            .unwrap();
        assert_eq!(stream.state(), StreamState::Cancelled);
    }

    #[tokio::test]
    async fn caller_token_reaches_the_producer() {
        let bridge = StreamBridge::new(|_: (), sink: Sink<u8>| async move {
            sink.emit(1).await;
            sink.cancellation().cancelled().await;
            Err::<(), _>(Status::cancelled("caller went away"))
        });
        let caller = CancellationToken::new();
        let mut stream = bridge.open_stream((), &caller);

        assert_eq!(stream.pull().await.unwrap(), Some(1));
        caller.cancel();
        let err = stream.pull().await.unwrap_err();
        assert_eq!(err.code(), Code::Canceled);
    }

    #[tokio::test]
    async fn cancelling_the_stream_leaves_the_caller_token_alone() {
        let caller = CancellationToken::new();
        let mut stream = counting(3).open_stream(0, &caller);
        stream.pull().await.unwrap();
        stream.cancel().await;
        assert!(!caller.is_cancelled());
    }

    #[tokio::test]
    async fn drop_cancels_the_producer_token() {
        let token = Arc::new(Mutex::new(None));
        let slot = token.clone();
        let bridge = StreamBridge::new(move |_: (), sink: Sink<u8>| {
            let slot = slot.clone();
            async move {
                *slot.lock().unwrap() = Some(sink.cancellation().clone());
                while sink.emit(0).await {}
                Ok(())
            }
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());
        assert_eq!(stream.pull().await.unwrap(), Some(0));
        drop(stream);

        let token = token.lock().unwrap().take().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn producer_on_another_task() {
        let bridge = StreamBridge::new(|n: u32, sink: Sink<u32>| async move {
            tokio::spawn(async move {
                for i in 0..n {
                    if !sink.emit(i).await {
                        break;
                    }
                }
            })
            .await
            .map_err(|err| Status::internal(err.to_string()))
        });
        let stream = bridge.open_stream(4, &CancellationToken::new());

        let items: Vec<u32> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(items, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn works_as_a_stream() {
        let mut stream = counting(2).open_stream(5, &CancellationToken::new());
        assert!(!stream.is_terminated());
        assert_eq!(stream.next().await.unwrap().unwrap(), 5);
        assert_eq!(stream.next().await.unwrap().unwrap(), 6);
        assert!(stream.next().await.is_none());
        assert!(stream.is_terminated());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn emit_any_checks_the_type() {
        let bridge = StreamBridge::new(|_: (), sink: Sink<String>| async move {
            let err = sink.emit_any(Box::new(42_u32)).await.unwrap_err();
            assert_eq!(err.code(), Code::Internal);
            let accepted = sink.emit_any(Box::new("typed".to_string())).await?;
            assert!(accepted);
            Ok::<(), Status>(())
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());

        assert_eq!(stream.pull().await.unwrap().as_deref(), Some("typed"));
        assert_eq!(stream.pull().await.unwrap(), None);
    }

    #[tokio::test]
    async fn emit_after_close_returns_false() {
        let bridge = StreamBridge::new(|_: (), sink: Sink<u8>| async move {
            // Taken by the first pull, then the consumer cancels.
            assert!(sink.emit(1).await);
            assert!(!sink.emit(2).await);
            assert!(!sink.emit(3).await);
            assert!(sink.is_closed());
            Ok(())
        });
        let mut stream = bridge.open_stream((), &CancellationToken::new());
        assert_eq!(stream.pull().await.unwrap(), Some(1));
        stream.cancel().await;
    }
}
