//! The rendering hook contract (spec §1, SPEC_FULL §A.3): the core only
//! ever asks "render this probe/current/sample/error", never touches XML or
//! JSON directly. `JsonRenderer` is the one renderer shipped in this repo,
//! since XML schema rendering is explicitly external.

use serde::Serialize;

use crate::buffer::Checkpoint;
use crate::device_model::Component;
use crate::error::AgentError;
use crate::observation::Observation;

pub struct RenderedDocument {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

pub struct ProbeView<'a> {
    pub devices: &'a [Component],
}

pub struct CurrentView<'a> {
    pub checkpoint: &'a Checkpoint,
}

pub struct SampleView<'a> {
    pub observations: &'a [Observation],
    pub next_from: u64,
}

pub struct RequestEcho<'a> {
    pub method: &'a str,
    pub path: &'a str,
}

pub trait Renderer: Send + Sync {
    fn render_probe(&self, view: ProbeView<'_>) -> RenderedDocument;
    fn render_current(&self, view: CurrentView<'_>) -> RenderedDocument;
    fn render_sample(&self, view: SampleView<'_>) -> RenderedDocument;
    fn render_error(&self, error: &AgentError, echo: RequestEcho<'_>) -> RenderedDocument;
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    #[serde(rename = "errorCode")]
    error_code: String,
    value: &'a str,
    request: RequestEchoJson<'a>,
}

#[derive(Serialize)]
struct RequestEchoJson<'a> {
    method: &'a str,
    path: &'a str,
}

#[derive(Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render_probe(&self, view: ProbeView<'_>) -> RenderedDocument {
        let body = serde_json::to_vec(view.devices).unwrap_or_default();
        RenderedDocument { content_type: "application/json", body }
    }

    fn render_current(&self, view: CurrentView<'_>) -> RenderedDocument {
        let entries: std::collections::HashMap<_, _> = view.checkpoint.iter().collect();
        let body = serde_json::to_vec(&SerializableCheckpoint(entries)).unwrap_or_default();
        RenderedDocument { content_type: "application/json", body }
    }

    fn render_sample(&self, view: SampleView<'_>) -> RenderedDocument {
        let body = serde_json::to_vec(&SamplePayload {
            observations: view.observations,
            next_from: view.next_from,
        })
        .unwrap_or_default();
        RenderedDocument { content_type: "application/json", body }
    }

    fn render_error(&self, error: &AgentError, echo: RequestEcho<'_>) -> RenderedDocument {
        let envelope = ErrorEnvelope {
            error_code: format!("{:?}", error.code).to_uppercase(),
            value: &error.message,
            request: RequestEchoJson { method: echo.method, path: echo.path },
        };
        let body = serde_json::to_vec(&envelope).unwrap_or_default();
        RenderedDocument { content_type: "application/json", body }
    }
}

/// `Observation`'s `Value` enum needs explicit `Serialize`, implemented here
/// rather than on the type itself so the core data model carries no
/// rendering-format opinions.
#[derive(Serialize)]
struct SerializableObservation<'a> {
    sequence: u64,
    data_item_id: &'a str,
    timestamp: String,
    value: serde_json::Value,
    reset_triggered: bool,
}

impl<'a> From<&'a Observation> for SerializableObservation<'a> {
    fn from(o: &'a Observation) -> Self {
        Self {
            sequence: o.sequence,
            data_item_id: &o.data_item_id,
            timestamp: o.timestamp.to_string(),
            value: value_to_json(&o.value),
            reset_triggered: o.reset_triggered,
        }
    }
}

fn value_to_json(value: &crate::observation::Value) -> serde_json::Value {
    use crate::observation::Value;
    match value {
        Value::Scalar(s) => serde_json::Value::String(s.clone()),
        Value::Numeric(n) => serde_json::json!(n),
        Value::Vector(v) => serde_json::json!(v),
        Value::DataSet(map) => serde_json::to_value(map).unwrap_or_default(),
    }
}

struct SerializableCheckpoint<'a>(std::collections::HashMap<&'a String, &'a Observation>);

impl Serialize for SerializableCheckpoint<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, obs) in &self.0 {
            map.serialize_entry(key.as_str(), &SerializableObservation::from(*obs))?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct SamplePayload<'a> {
    #[serde(serialize_with = "serialize_observations")]
    observations: &'a [Observation],
    next_from: u64,
}

fn serialize_observations<S>(observations: &&[Observation], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(observations.len()))?;
    for obs in *observations {
        seq.serialize_element(&SerializableObservation::from(obs))?;
    }
    seq.end()
}
