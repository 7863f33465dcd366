//! Streaming `sample` responses (spec §4.8, §8 property 6 "streaming
//! liveness"): when a request supplies `interval`, the response body is an
//! indefinite sequence of chunks instead of one page. Each chunk is either a
//! batch of new observations or, if none arrived within `heartbeat`, a
//! keep-alive line — this is a JSON-lines framing rather than MTConnect's
//! `multipart/x-mixed-replace`, a deliberate simplification since the exact
//! multipart boundary format is outside what spec.md specifies.

use std::time::Duration as StdDuration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream;

use crate::app_state::AppState;
use crate::render::SampleView;

struct StreamState {
    state: AppState,
    from: u64,
    count: usize,
    interval: StdDuration,
    heartbeat: StdDuration,
    path: Option<String>,
}

impl StreamState {
    /// Pull the next page and, if `path` narrowed the selection, drop
    /// observations whose data item didn't match (spec §4.7 filtering also
    /// applies to the streaming form of `/sample`).
    fn next_page(&mut self) -> Option<Vec<u8>> {
        let buffer = self.state.pipeline.buffer();
        let (mut observations, next_from) = buffer.range(self.from, self.count);
        if let Some(path) = &self.path {
            let ids: std::collections::HashSet<&str> = self
                .state
                .pipeline
                .model()
                .select_by_path(path)
                .into_iter()
                .map(|item| item.id.as_str())
                .collect();
            observations.retain(|obs| ids.contains(obs.data_item_id.as_str()));
        }
        if observations.is_empty() {
            return None;
        }
        let doc = self
            .state
            .renderer
            .render_sample(SampleView { observations: &observations, next_from });
        self.from = next_from;
        Some(doc.body)
    }
}

pub fn stream_sample(
    state: AppState,
    from: u64,
    count: usize,
    interval_ms: f64,
    heartbeat_ms: f64,
    path: Option<String>,
) -> Response {
    let cancel = state.cancellation_token.clone();
    let seed = StreamState {
        state,
        from,
        count,
        interval: StdDuration::from_millis(interval_ms.max(0.0) as u64),
        heartbeat: StdDuration::from_millis(heartbeat_ms.max(1.0) as u64),
        path,
    };

    let body_stream = stream::unfold(seed, move |mut st| {
        let cancel = cancel.clone();
        async move {
            if cancel.is_cancelled() {
                return None;
            }

            // Already-available data is emitted immediately; only fall back to
            // waiting on a notification when the buffer has nothing new, so a
            // stream that opens mid-burst doesn't sit idle for a full `interval`.
            let chunk = if let Some(chunk) = st.next_page() {
                chunk
            } else {
                let wait = if st.interval.is_zero() { st.heartbeat } else { st.interval.min(st.heartbeat) };
                let buffer = st.state.pipeline.buffer();
                let _ = tokio::time::timeout(wait, buffer.notified()).await;
                st.next_page().unwrap_or_else(|| b"{\"heartbeat\":true}\n".to_vec())
            };

            let mut line = chunk;
            line.push(b'\n');
            Some((Ok::<Bytes, std::io::Error>(Bytes::from(line)), st))
        }
    });

    let body = Body::from_stream(body_stream);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adapter::AdapterConnection;
    use crate::buffer::Buffer;
    use crate::device_model::DeviceModel;
    use crate::ingestion::IngestionPipeline;
    use crate::render::JsonRenderer;
    use crate::routing::RouteTable;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn test_state() -> AppState {
        let mut model = DeviceModel::new();
        model.add_agent_device().unwrap();
        let buffer = Buffer::new(64, 8);
        let pipeline = Arc::new(IngestionPipeline::new(model, buffer));
        AppState {
            pipeline,
            adapters: Arc::new(Vec::<Arc<AdapterConnection>>::new()),
            routes: Arc::new(RouteTable::new()),
            renderer: Arc::new(JsonRenderer),
            cancellation_token: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn cancelled_stream_yields_no_chunks() {
        let state = test_state();
        state.cancellation_token.cancel();
        let response = stream_sample(state, 1, 10, 0.0, 50.0, None);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn already_buffered_data_is_emitted_without_waiting_a_full_interval() {
        use crate::observation::{Observation, Value};
        use http_body_util::BodyExt;
        use std::time::Instant;
        use time::OffsetDateTime;

        let state = test_state();
        state
            .pipeline
            .buffer()
            .append(Observation::new("agent_avail", OffsetDateTime::now_utc(), Value::Scalar("AVAILABLE".into())));

        let started = Instant::now();
        let response = stream_sample(state, 1, 10, 5_000.0, 10_000.0, None);
        let mut body = response.into_body();
        let frame = BodyExt::frame(&mut body).await.unwrap().unwrap();
        let chunk = frame.into_data().unwrap();

        assert!(started.elapsed() < StdDuration::from_millis(500));
        assert!(String::from_utf8_lossy(&chunk).contains("agent_avail"));
    }
}
