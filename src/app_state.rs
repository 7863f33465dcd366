use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::adapter::AdapterConnection;
use crate::ingestion::IngestionPipeline;
use crate::render::Renderer;
use crate::routing::RouteTable;

/// Shared application state handed to every HTTP handler, mirroring the
/// teacher's `AppState` bundle of `&'static` shared handles.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub adapters: Arc<Vec<Arc<AdapterConnection>>>,
    pub routes: Arc<RouteTable>,
    pub renderer: Arc<dyn Renderer>,
    pub cancellation_token: CancellationToken,
}
