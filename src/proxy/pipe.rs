//! Streaming of a reconstructed body into the upstream request.
//!
//! [`channel`] pairs a [`BodySender`] with a [`PipeBody`] that hyper
//! polls as the outbound request body. The channel is bounded, so
//! [`BodySender::send`] suspends until hyper has written earlier frames;
//! hyper in turn only polls the body while the connection is writable.
//!
//! A sender ends the body exactly once: [`BodySender::finish`] ends it
//! cleanly, [`BodySender::abort`] makes the body yield an error so hyper
//! resets the upstream connection. Both consume the sender. Dropping it
//! without either (the inbound request was cancelled) is an abort too.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use http::request::Parts;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper::body::{Body, Frame, Incoming, SizeHint};
use tokio::sync::mpsc;

use crate::error::{BoxError, ProxyError};
use crate::server::{HttpClient, ProxyBody};

/// Frames buffered between the pump and hyper.
pub const PIPE_CAPACITY: usize = 8;

/// Largest frame handed to hyper; bigger chunks are sliced.
pub const MAX_FRAME: usize = 64 * 1024;

#[derive(Debug)]
enum Message {
    Chunk(Bytes),
    End,
    Abort(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeOutcome {
    /// Every chunk was handed to hyper and the body was ended cleanly.
    Finished { bytes: u64 },
    /// The source failed; the body was ended with an error.
    Aborted(String),
    /// Hyper dropped the body before the source was exhausted.
    ReceiverClosed { bytes: u64 },
}

#[must_use]
pub fn channel(capacity: usize, content_length: Option<u64>) -> (BodySender, PipeBody) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        BodySender { tx },
        PipeBody {
            rx,
            remaining: content_length,
            done: false,
        },
    )
}

#[derive(Debug)]
pub struct BodySender {
    tx: mpsc::Sender<Message>,
}

impl BodySender {
    /// Queue `chunk`, waiting for capacity. Fails once the body is gone.
    pub async fn send(&self, mut chunk: Bytes) -> Result<(), ProxyError> {
        while !chunk.is_empty() {
            let frame = chunk.split_to(chunk.len().min(MAX_FRAME));
            self.tx
                .send(Message::Chunk(frame))
                .await
                .map_err(|_| ProxyError::Aborted("outbound body was dropped".into()))?;
        }
        Ok(())
    }

    /// End the body cleanly. Returns false if hyper had already dropped it.
    pub async fn finish(self) -> bool {
        self.tx.send(Message::End).await.is_ok()
    }

    /// End the body with an error, resetting the upstream connection.
    pub async fn abort(self, reason: String) {
        let _ = self.tx.send(Message::Abort(reason)).await;
    }
}

#[derive(Debug)]
pub struct PipeBody {
    rx: mpsc::Receiver<Message>,
    remaining: Option<u64>,
    done: bool,
}

impl Body for PipeBody {
    type Data = Bytes;
    type Error = ProxyError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match ready!(this.rx.poll_recv(cx)) {
            Some(Message::Chunk(chunk)) => {
                if let Some(remaining) = this.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(chunk.len() as u64);
                }
                Poll::Ready(Some(Ok(Frame::data(chunk))))
            }
            Some(Message::End) => {
                this.done = true;
                Poll::Ready(None)
            }
            Some(Message::Abort(reason)) => {
                this.done = true;
                Poll::Ready(Some(Err(ProxyError::Aborted(reason))))
            }
            None => {
                this.done = true;
                Poll::Ready(Some(Err(ProxyError::Aborted(
                    "body sender dropped before end of body".into(),
                ))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        self.remaining.map_or_else(SizeHint::default, SizeHint::with_exact)
    }
}

/// Drain `source` into `sender`, ending the body exactly once.
pub async fn pump<I, E>(source: I, sender: BodySender) -> PipeOutcome
where
    I: IntoIterator<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut sent = 0u64;
    for item in source {
        match item {
            Ok(chunk) => {
                let len = chunk.len() as u64;
                if sender.send(chunk).await.is_err() {
                    return PipeOutcome::ReceiverClosed { bytes: sent };
                }
                sent += len;
            }
            Err(e) => {
                let reason = e.to_string();
                sender.abort(reason.clone()).await;
                return PipeOutcome::Aborted(reason);
            }
        }
    }

    if sender.finish().await {
        PipeOutcome::Finished { bytes: sent }
    } else {
        PipeOutcome::ReceiverClosed { bytes: sent }
    }
}

/// Send `head` upstream with a body streamed from `source`.
///
/// The head (and so every header) is handed to hyper before the first
/// body frame. The upstream response is returned only once the pump has
/// finished, so relaying never overlaps with the outbound body.
pub async fn forward<I, E>(
    client: &HttpClient,
    head: Parts,
    content_length: Option<u64>,
    source: I,
) -> Result<Response<Incoming>, ProxyError>
where
    I: IntoIterator<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let (sender, body) = channel(PIPE_CAPACITY, content_length);
    let body: ProxyBody = body.map_err(|e| -> BoxError { Box::new(e) }).boxed();
    let request = Request::from_parts(head, body);

    let (response, outcome) = tokio::join!(client.request(request), pump(source, sender));

    match outcome {
        PipeOutcome::Finished { bytes } => {
            tracing::debug!(bytes, "outbound body sent");
        }
        PipeOutcome::Aborted(reason) => {
            tracing::warn!(reason = %reason, "outbound body aborted");
            return Err(ProxyError::Aborted(reason));
        }
        PipeOutcome::ReceiverClosed { bytes } => {
            tracing::debug!(bytes, "upstream stopped reading the request body");
        }
    }

    response.map_err(|e| ProxyError::Upstream {
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    async fn collect(body: PipeBody) -> Result<Bytes, ProxyError> {
        body.collect().await.map(http_body_util::Collected::to_bytes)
    }

    #[tokio::test]
    async fn finished_pump_yields_all_bytes() {
        let (sender, body) = channel(2, Some(11));
        let source = vec![
            Ok::<_, Infallible>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];

        let (outcome, collected) = tokio::join!(pump(source, sender), collect(body));

        assert_eq!(outcome, PipeOutcome::Finished { bytes: 11 });
        assert_eq!(&collected.unwrap()[..], b"hello world");
    }

    #[tokio::test]
    async fn source_error_aborts_body() {
        let (sender, body) = channel(2, None);
        let source = vec![Ok(Bytes::from_static(b"partial")), Err("disk on fire")];

        let (outcome, collected) = tokio::join!(pump(source, sender), collect(body));

        assert_eq!(outcome, PipeOutcome::Aborted("disk on fire".into()));
        assert!(matches!(collected, Err(ProxyError::Aborted(_))));
    }

    #[tokio::test]
    async fn dropped_sender_is_an_abort() {
        let (sender, body) = channel(2, None);
        sender.send(Bytes::from_static(b"abc")).await.unwrap();
        drop(sender);

        assert!(matches!(collect(body).await, Err(ProxyError::Aborted(_))));
    }

    #[tokio::test]
    async fn dropped_body_closes_pump() {
        let (sender, body) = channel(1, None);
        drop(body);
        let source = vec![Ok::<_, Infallible>(Bytes::from_static(b"x"))];

        assert_eq!(
            pump(source, sender).await,
            PipeOutcome::ReceiverClosed { bytes: 0 }
        );
    }

    #[tokio::test]
    async fn large_chunks_are_split_into_frames() {
        let (sender, mut body) = channel(4, None);
        let payload = Bytes::from(vec![1u8; MAX_FRAME + 10]);

        let producer = tokio::spawn(async move {
            sender.send(payload).await.unwrap();
            sender.finish().await
        });

        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        let second = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(first.len(), MAX_FRAME);
        assert_eq!(second.len(), 10);
        assert!(body.frame().await.is_none());
        assert!(producer.await.unwrap());
    }

    #[test]
    fn size_hint_reflects_content_length() {
        let (_sender, body) = channel(1, Some(42));
        assert_eq!(body.size_hint().exact(), Some(42));

        let (_sender, body) = channel(1, None);
        assert_eq!(body.size_hint().exact(), None);
    }

    #[tokio::test]
    async fn bounded_channel_applies_backpressure() {
        let (sender, _body) = channel(1, None);
        sender.send(Bytes::from_static(b"a")).await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            sender.send(Bytes::from_static(b"b")),
        )
        .await;
        assert!(blocked.is_err());
    }
}
