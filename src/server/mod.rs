//! HTTP dispatcher (spec §4.7). Axum is used purely as transport — listener,
//! connection handling, graceful shutdown — while route *matching* goes
//! through `crate::routing::RouteTable` so the typed-parameter, insertion-
//! order semantics in spec §4.6 are exactly what gets exercised, not
//! whatever axum's own router happens to do.

mod handlers;
pub mod streaming;

use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::app_state::AppState;
use crate::error::AgentError;
use crate::render::RequestEcho;
use crate::routing::{HandlerId, RouteTable};

/// The fixed set of standard handlers (spec §4.7). Registered in this order;
/// route determinism (spec §8 property 4) follows directly from insertion
/// order here.
pub fn standard_routes() -> RouteTable {
    let mut routes = RouteTable::new();
    routes.insert(Method::GET, "/probe", HandlerId::ProbeAll);
    routes.insert(Method::GET, "/{device}/probe", HandlerId::ProbeDevice);
    routes.insert(
        Method::GET,
        "/current?at={unsigned_integer}&path={string}",
        HandlerId::CurrentAll,
    );
    routes.insert(
        Method::GET,
        "/{device}/current?at={unsigned_integer}&path={string}",
        HandlerId::CurrentDevice,
    );
    routes.insert(
        Method::GET,
        "/sample?from={unsigned_integer}&interval={double}&count={integer:100}&heartbeat={double:10000}&path={string}",
        HandlerId::SampleAll,
    );
    routes.insert(
        Method::GET,
        "/{device}/sample?from={unsigned_integer}&interval={double}&count={integer:100}&heartbeat={double:10000}&path={string}",
        HandlerId::SampleDevice,
    );
    routes.insert(
        Method::GET,
        "/asset?device={string}&type={string}&count={integer:100}",
        HandlerId::AssetList,
    );
    routes.insert(Method::GET, "/asset/{assets}", HandlerId::AssetIds);
    routes.insert(Method::PUT, "/{device}", HandlerId::AdapterCommandPut);
    routes.insert(Method::DELETE, "/{device}", HandlerId::AdapterCommandDelete);
    routes
}

pub fn router(state: AppState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

async fn dispatch(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    let path = uri.path();
    let query = uri.query().unwrap_or("");

    let outcome = state.routes.dispatch(&method, path, query);
    let result = match outcome {
        Some(Ok((handler, params))) => handlers::run(handler, params, &state).await,
        Some(Err(param_err)) => Err(AgentError::from(param_err)),
        None => Err(AgentError::no_matching_route(method.as_str(), path)),
    };

    match result {
        Ok(response) => response,
        Err(error) => {
            let status = error.code.status();
            let echo = RequestEcho { method: method.as_str(), path };
            let doc = state.renderer.render_error(&error, echo);
            (status, [("content-type", doc.content_type)], doc.body).into_response()
        }
    }
}
