use std::sync::Arc;
use std::time::Duration as StdDuration;

use futures::{SinkExt, StreamExt};
use time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use shdr::{ShdrDecoder, ShdrRecord};

use crate::adapter::{adapter_identity, ConnectionStatus, OptionsCell, StatusCell};
use crate::ingestion::{IngestionPipeline, RawObservation};
use crate::observation::{Observation, Value};

/// A single adapter's TCP client: connect, read SHDR lines, reconnect on
/// failure, heartbeat, report status through `CONNECTION_STATUS` (spec §4.3).
pub struct AdapterConnection {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub legacy_timeout: StdDuration,
    pub reconnect_interval: StdDuration,
    pub identity: String,
    pub options: OptionsCell,
    pub status: Arc<StatusCell>,
    pipeline: Arc<IngestionPipeline>,
    connection_status_item: String,
    cancel: CancellationToken,
}

impl AdapterConnection {
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        legacy_timeout: StdDuration,
        reconnect_interval: StdDuration,
        options: OptionsCell,
        pipeline: Arc<IngestionPipeline>,
        cancel: CancellationToken,
    ) -> Self {
        let id = id.into();
        let host = host.into();
        let identity = adapter_identity(&host, port);
        let connection_status_item = format!("{id}_connection_status");
        Self {
            id,
            host,
            port,
            legacy_timeout,
            reconnect_interval,
            identity,
            options,
            status: Arc::new(StatusCell::default()),
            pipeline,
            connection_status_item,
            cancel,
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn emit_connection_status(&self, status: ConnectionStatus) {
        self.status.set(status);
        self.pipeline.buffer().append(Observation::new(
            self.connection_status_item.clone(),
            OffsetDateTime::now_utc(),
            Value::Scalar(status.as_str().to_string()),
        ));
    }

    /// Run the reconnect/read loop until `stop()` is called. Errors inside
    /// the worker body are caught by kind (spec §4.3): I/O errors drop back
    /// to CLOSED and retry; an explicit stop transitions straight to
    /// STOPPED.
    pub async fn run(self: Arc<Self>) {
        let span = tracing::info_span!("adapter", identity = %self.identity);
        let _enter = span.enter();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.status.set(ConnectionStatus::Connecting);
            tracing::debug!("connecting");
            match TcpStream::connect((self.host.as_str(), self.port)).await {
                Ok(stream) => {
                    self.emit_connection_status(ConnectionStatus::Established);
                    tracing::info!("connection established");
                    let relative_base = OffsetDateTime::now_utc();
                    self.read_loop(stream, relative_base).await;
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    self.emit_connection_status(ConnectionStatus::Closed);
                }
                Err(err) => {
                    tracing::warn!(%err, "connect failed, will retry");
                }
            }

            tokio::select! {
                _ = sleep(self.reconnect_interval) => {}
                _ = self.cancel.cancelled() => break,
            }
        }

        self.emit_connection_status(ConnectionStatus::Stopped);
        tracing::info!("adapter stopped");
    }

    async fn read_loop(&self, stream: TcpStream, relative_base: OffsetDateTime) {
        let framed = Framed::new(stream, ShdrDecoder::new());
        let (mut sink, mut stream) = framed.split();
        let heartbeat_timeout = self.legacy_timeout * 2;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                next = tokio::time::timeout(heartbeat_timeout, stream.next()) => next,
            };

            let Ok(next) = next else {
                tracing::warn!("heartbeat timeout, closing connection");
                return;
            };

            match next {
                Some(Ok(record)) => {
                    if let Some(reply) = self.handle_record(record, relative_base) {
                        if let Err(err) = sink.send(reply).await {
                            tracing::warn!(%err, "failed to write PONG reply, closing connection");
                            return;
                        }
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(%err, "shdr decode error, dropping line");
                }
                None => {
                    tracing::info!("adapter closed the connection");
                    return;
                }
            }
        }
    }

    /// Handle one decoded record, returning a line to write back to the
    /// adapter when one is required — currently only the `* PONG <ms>`
    /// heartbeat reply to `* PING` (spec §4.3).
    fn handle_record(&self, record: ShdrRecord, relative_base: OffsetDateTime) -> Option<String> {
        match record {
            ShdrRecord::Command { key, value } => {
                if key.eq_ignore_ascii_case("PING") {
                    let interval_ms = self.legacy_timeout.as_millis();
                    tracing::trace!(interval_ms, "received PING, replying PONG");
                    return Some(format!("* PONG {interval_ms}"));
                }
                self.options.apply_command(&key, &value);
                None
            }
            ShdrRecord::Data(data) => {
                let receive_time = OffsetDateTime::now_utc();
                let options = self.options.snapshot();
                for (key, raw_value) in data.pairs {
                    let raw = RawObservation {
                        key,
                        raw_value,
                        timestamp: data.timestamp,
                        timestamp_was_malformed: data.timestamp_was_malformed,
                    };
                    self.pipeline.process(
                        raw,
                        receive_time,
                        &options,
                        options.relative_time.then_some(relative_base),
                    );
                }
                None
            }
        }
    }
}
