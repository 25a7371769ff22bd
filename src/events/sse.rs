//! HTTP adapter: one hub client per server-sent-events connection.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use super::hub::{ClientId, EventHub, HubError};

/// Stream of `data:` frames for one subscriber. Dropping it (client
/// disconnect or write failure) unregisters the subscriber.
pub struct ClientStream {
    id: ClientId,
    hub: EventHub,
    inner: ReceiverStream<Arc<str>>,
}

impl ClientStream {
    pub fn id(&self) -> ClientId {
        self.id
    }
}

impl Stream for ClientStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|frame| frame.map(|payload| Ok(Event::default().data(&*payload))))
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        debug!(client_id = self.id, "Event stream closed");
        self.hub.remove_client(self.id);
    }
}

/// Register a subscriber and wrap it as an SSE response body.
/// A zero `keep_alive` disables comment pings.
pub async fn subscribe(hub: &EventHub, keep_alive: Duration) -> Result<Response, HubError> {
    let subscription = hub.add_client().await?;
    debug!(client_id = subscription.id, "Event stream opened");

    let stream = ClientStream {
        id: subscription.id,
        hub: hub.clone(),
        inner: ReceiverStream::new(subscription.receiver),
    };

    let sse = Sse::new(stream);
    let response = if keep_alive.is_zero() {
        sse.into_response()
    } else {
        sse.keep_alive(KeepAlive::new().interval(keep_alive))
            .into_response()
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Metrics;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_stream_yields_frames_and_unregisters_on_drop() {
        let (hub, _handle) = EventHub::spawn(8, Arc::new(Metrics::new()));
        let subscription = hub.add_client().await.unwrap();
        let mut stream = ClientStream {
            id: subscription.id,
            hub: hub.clone(),
            inner: ReceiverStream::new(subscription.receiver),
        };
        assert_eq!(hub.client_count().await, 1);

        hub.broadcast(r#"{"jobID":"j1"}"#);
        assert!(stream.next().await.unwrap().is_ok());

        drop(stream);
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_responds_with_event_stream() {
        let (hub, _handle) = EventHub::spawn(8, Arc::new(Metrics::new()));

        for keep_alive in [Duration::ZERO, Duration::from_secs(15)] {
            let response = subscribe(&hub, keep_alive).await.unwrap();
            let content_type = response
                .headers()
                .get(axum::http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap()
                .to_string();
            assert_eq!(content_type, mime::TEXT_EVENT_STREAM.as_ref());
            assert_eq!(hub.client_count().await, 1);

            drop(response);
            assert_eq!(hub.client_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_subscribe_after_close_fails() {
        let (hub, handle) = EventHub::spawn(8, Arc::new(Metrics::new()));
        hub.close();
        handle.await.unwrap();

        assert!(subscribe(&hub, Duration::ZERO).await.is_err());
    }
}
