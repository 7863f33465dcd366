use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use mtconnect_agent::adapter::{AdapterConnection, AdapterOptions, OptionsCell};
use mtconnect_agent::app_state::AppState;
use mtconnect_agent::buffer::Buffer;
use mtconnect_agent::config::Args;
use mtconnect_agent::device_model::DeviceModel;
use mtconnect_agent::ingestion::IngestionPipeline;
use mtconnect_agent::render::JsonRenderer;
use mtconnect_agent::server::{self, standard_routes};
use mtconnect_agent::tracing::init_tracing;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match args.load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_tracing("mtconnect_agent=info");
    tracing::info!(port = config.port, adapters = config.adapters.len(), "starting agent");

    let cancellation_token = CancellationToken::new();

    let mut model = DeviceModel::new();
    model.add_agent_device().expect("agent device synthesis cannot fail");
    for adapter in &config.adapters {
        model
            .add_device(mtconnect_agent::device_model::Component::new(
                adapter.device.as_str(),
                adapter.device.as_str(),
                "Device",
            ))
            .expect("device id collision in configuration");
        let uri = (!config.suppress_ip_address).then(|| format!("shdr://{}:{}", adapter.host, adapter.port));
        let component_name = if config.suppress_ip_address {
            adapter.device.clone()
        } else {
            format!("{}:{}", adapter.host, adapter.port)
        };
        model
            .attach_adapter_component(adapter.device.as_str(), component_name.as_str(), uri.as_deref())
            .expect("agent device must exist before attaching adapters");
    }

    let buffer = Buffer::new(config.buffer_size, config.checkpoint_frequency);
    let pipeline = Arc::new(IngestionPipeline::new(model, buffer));

    let mut adapters = Vec::new();
    for adapter_config in &config.adapters {
        let options = OptionsCell::new(AdapterOptions {
            conversion_required: adapter_config.conversion_required,
            relative_time: adapter_config.relative_time,
            real_time: adapter_config.real_time,
            device: Some(adapter_config.device.clone()),
            shdr_version: adapter_config.shdr_version.clone(),
        });
        let connection = Arc::new(AdapterConnection::new(
            adapter_config.device.clone(),
            adapter_config.host.clone(),
            adapter_config.port,
            StdDuration::from_secs(config.legacy_timeout),
            StdDuration::from_millis(config.reconnect_interval),
            options,
            pipeline.clone(),
            cancellation_token.child_token(),
        ));
        tokio::spawn(connection.clone().run());
        adapters.push(connection);
    }

    let app_state = AppState {
        pipeline,
        adapters: Arc::new(adapters),
        routes: Arc::new(standard_routes()),
        renderer: Arc::new(JsonRenderer),
        cancellation_token: cancellation_token.clone(),
    };

    let adapters_for_shutdown = app_state.adapters.clone();
    let app = server::router(app_state);

    let addr = SocketAddr::new(IpAddr::V4(config.server_ip.parse().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED)), config.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, port = config.port, "failed to bind HTTP listener");
            return;
        }
    };
    tracing::info!(%addr, "HTTP listener bound");

    let server_cancellation = cancellation_token.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_cancellation.cancelled_owned())
            .await
            .unwrap();
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            cancellation_token.cancel();
        }
        _ = cancellation_token.cancelled() => {}
    }

    // Shutdown order (spec §5): stop the HTTP listener (streaming sessions
    // observe the same token and end their chunk loop), then stop adapters,
    // then let the buffer drop with the process.
    let _ = server_task.await;
    for adapter in adapters_for_shutdown.iter() {
        adapter.stop();
    }
    tracing::info!("agent shut down");
}
