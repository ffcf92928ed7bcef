//! Async adapter over an upstream chunk stream.

use std::{
    convert::Infallible,
    fmt::Display,
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
};

use futures::{
    stream::{FusedStream, Map},
    Stream, StreamExt,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::{emitter::StreamParser, schema::ToolSet, types::StreamEvent};

type InfallibleChunks<I, C> = Map<I, fn(C) -> Result<C, Infallible>>;

/// Lazily parses an upstream of text chunks into [`StreamEvent`]s.
///
/// The upstream is polled only when no parsed event is waiting, so one chunk
/// is consumed at a time and every event it produced is delivered before the
/// next chunk is requested. An `Err` from the upstream ends the session with
/// `error` and `finish(error)`.
pub struct EventStream<S> {
    upstream: Option<S>,
    parser: StreamParser,
}

impl<S> EventStream<S> {
    pub fn new(upstream: S, tools: impl Into<Arc<ToolSet>>) -> Self {
        Self::with_parser(upstream, StreamParser::new(tools))
    }

    /// Use a preconfigured parser, see [`StreamParser::with_config`].
    pub fn with_parser(upstream: S, parser: StreamParser) -> Self {
        Self {
            upstream: Some(upstream),
            parser,
        }
    }

    pub fn parser(&self) -> &StreamParser {
        &self.parser
    }

    /// Stop consuming: the upstream is dropped, buffers are released and no
    /// further events are yielded.
    pub fn close(&mut self) {
        if self.upstream.take().is_some() {
            debug!("Event stream closed by consumer");
        }
        self.parser.cancel();
    }
}

impl<I, C> EventStream<InfallibleChunks<I, C>>
where
    I: Stream<Item = C> + Unpin,
    C: AsRef<str>,
{
    /// Wrap an upstream that cannot fail.
    pub fn from_chunks(chunks: I, tools: impl Into<Arc<ToolSet>>) -> Self {
        let ok: fn(C) -> Result<C, Infallible> = Ok;
        Self::new(chunks.map(ok), tools)
    }
}

impl<S, C, E> EventStream<S>
where
    S: Stream<Item = Result<C, E>> + Unpin + Send + 'static,
    C: AsRef<str> + 'static,
    E: Display + 'static,
{
    /// Drive parsing on a spawned task and hand events over a bounded
    /// channel. The task closes the upstream as soon as the receiver is
    /// dropped.
    pub fn into_channel(self, capacity: usize) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut events = self;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        debug!("Event receiver dropped, closing upstream");
                        events.close();
                        break;
                    }
                    next = events.next() => {
                        let Some(event) = next else {
                            break;
                        };
                        if tx.send(event).await.is_err() {
                            events.close();
                            break;
                        }
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

impl<S, C, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<C, E>> + Unpin,
    C: AsRef<str>,
    E: Display,
{
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.parser.next_event() {
                return Poll::Ready(Some(event));
            }
            if this.parser.is_terminated() {
                this.upstream = None;
                return Poll::Ready(None);
            }
            let Some(upstream) = this.upstream.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(upstream.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => this.parser.push(chunk.as_ref()),
                Some(Err(err)) => {
                    this.upstream = None;
                    this.parser.fail(err.to_string());
                }
                None => {
                    this.upstream = None;
                    this.parser.finish();
                }
            }
        }
    }
}

impl<S, C, E> FusedStream for EventStream<S>
where
    S: Stream<Item = Result<C, E>> + Unpin,
    C: AsRef<str>,
    E: Display,
{
    fn is_terminated(&self) -> bool {
        self.parser.is_terminated() && !self.parser.has_pending_events()
    }
}

impl<S> std::fmt::Debug for EventStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("upstream_open", &self.upstream.is_some())
            .field("parser", &self.parser)
            .finish()
    }
}
