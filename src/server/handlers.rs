//! Concrete handler bodies for each [`HandlerId`] (spec §4.7).
//!
//! Every handler follows the same shape: pull typed parameters out of the
//! matched route, ask the core (device model / buffer / ingestion pipeline)
//! for data, and hand it to the configured [`Renderer`]. None of this touches
//! axum's router — `crate::server::dispatch` already resolved the handler id.

use std::collections::HashSet;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::app_state::AppState;
use crate::error::{AgentError, AgentErrorKind};
use crate::render::{CurrentView, ProbeView, SampleView};
use crate::routing::{HandlerId, ParamValue, Params};
use crate::server::streaming;

pub async fn run(handler: HandlerId, params: Params, state: &AppState) -> Result<Response, AgentError> {
    match handler {
        HandlerId::ProbeAll => probe(None, state),
        HandlerId::ProbeDevice => probe(Some(device_param(&params)?), state),
        HandlerId::CurrentAll => current(None, &params, state),
        HandlerId::CurrentDevice => current(Some(device_param(&params)?), &params, state),
        HandlerId::SampleAll => sample(None, &params, state),
        HandlerId::SampleDevice => sample(Some(device_param(&params)?), &params, state),
        HandlerId::AssetList | HandlerId::AssetIds => Err(AgentError::new(
            AgentErrorKind::Internal,
            "asset storage is outside this agent's scope".to_string(),
        )),
        HandlerId::AdapterCommandPut => adapter_command(&params, state, true),
        HandlerId::AdapterCommandDelete => adapter_command(&params, state, false),
    }
}

fn device_param<'a>(params: &'a Params) -> Result<&'a str, AgentError> {
    match params.get("device") {
        Some(ParamValue::String(name)) => Ok(name.as_str()),
        _ => Err(AgentError::internal("route matched without a device capture")),
    }
}

fn unsigned_param(params: &Params, name: &str) -> Option<u64> {
    match params.get(name) {
        Some(ParamValue::UnsignedInteger(v)) => Some(*v),
        _ => None,
    }
}

fn integer_param(params: &Params, name: &str) -> Option<i64> {
    match params.get(name) {
        Some(ParamValue::Integer(v)) => Some(*v),
        _ => None,
    }
}

fn double_param(params: &Params, name: &str) -> Option<f64> {
    match params.get(name) {
        Some(ParamValue::Double(v)) => Some(*v),
        _ => None,
    }
}

fn string_param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    match params.get(name) {
        Some(ParamValue::String(v)) => Some(v.as_str()),
        _ => None,
    }
}

/// Resolve an XPath-like `path` selector (spec §4.7) to the set of matching
/// data-item ids, via [`crate::device_model::DeviceModel::select_by_path`].
fn path_ids<'a>(state: &'a AppState, path: &str) -> HashSet<&'a str> {
    state
        .pipeline
        .model()
        .select_by_path(path)
        .into_iter()
        .map(|item| item.id.as_str())
        .collect()
}

fn require_device<'a>(name: &str, state: &'a AppState) -> Result<&'a crate::device_model::Component, AgentError> {
    state
        .pipeline
        .model()
        .get_device_by_name(name)
        .ok_or_else(|| AgentError::unknown_device(name))
}

fn probe(device: Option<&str>, state: &AppState) -> Result<Response, AgentError> {
    let devices: &[crate::device_model::Component] = match device {
        None => state.pipeline.model().devices(),
        Some(name) => std::slice::from_ref(require_device(name, state)?),
    };
    let doc = state.renderer.render_probe(ProbeView { devices });
    Ok((StatusCode::OK, [("content-type", doc.content_type)], doc.body).into_response())
}

fn current(device: Option<&str>, params: &Params, state: &AppState) -> Result<Response, AgentError> {
    if let Some(name) = device {
        require_device(name, state)?;
    }

    let checkpoint = match unsigned_param(params, "at") {
        Some(sequence) => state.pipeline.buffer().checkpoint_at(sequence)?,
        None => state.pipeline.buffer().latest(),
    };
    let checkpoint = match string_param(params, "path") {
        Some(path) => {
            let ids = path_ids(state, path);
            checkpoint.filtered(&ids)
        }
        None => checkpoint,
    };
    let doc = state.renderer.render_current(CurrentView { checkpoint: &checkpoint });
    Ok((StatusCode::OK, [("content-type", doc.content_type)], doc.body).into_response())
}

fn sample(device: Option<&str>, params: &Params, state: &AppState) -> Result<Response, AgentError> {
    if let Some(name) = device {
        require_device(name, state)?;
    }

    let from = unsigned_param(params, "from").unwrap_or_else(|| state.pipeline.buffer().first_sequence());
    let count = integer_param(params, "count").unwrap_or(100).max(1) as usize;
    let path = string_param(params, "path").map(str::to_string);

    if let Some(interval) = double_param(params, "interval") {
        let heartbeat = double_param(params, "heartbeat").unwrap_or(10000.0);
        return Ok(streaming::stream_sample(state.clone(), from, count, interval, heartbeat, path));
    }

    let (mut observations, next_from) = state.pipeline.buffer().range(from, count);
    if let Some(path) = &path {
        let ids = path_ids(state, path);
        observations.retain(|obs| ids.contains(obs.data_item_id.as_str()));
    }
    let doc = state
        .renderer
        .render_sample(SampleView { observations: &observations, next_from });
    Ok((StatusCode::OK, [("content-type", doc.content_type)], doc.body).into_response())
}

/// `PUT`/`DELETE /{device}` drive an adapter connection directly rather than
/// the ingestion pipeline: `PUT` is acknowledged as a liveness probe, `DELETE`
/// requests the matching adapter stop (spec §4.3's explicit `stop()` hook).
fn adapter_command(params: &Params, state: &AppState, is_put: bool) -> Result<Response, AgentError> {
    let name = device_param(params)?;
    let adapter = state
        .adapters
        .iter()
        .find(|a| a.id == name)
        .ok_or_else(|| AgentError::unknown_device(name))?;

    if is_put {
        Ok((StatusCode::OK, format!("{} is {}\n", adapter.id, adapter.status.get().as_str())).into_response())
    } else {
        adapter.stop();
        Ok((StatusCode::OK, format!("{} stop requested\n", adapter.id)).into_response())
    }
}
