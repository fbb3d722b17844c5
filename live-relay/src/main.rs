use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use live_relay::config::RelayConfig;
use live_relay::database::{self, LiveStateRepository, SqlxLiveStateRepository};
use live_relay::logging;
use live_relay::monitor::{HandshakeProbe, HttpStatusProbe, LayeredProbe, LiveProbe};
use live_relay::notification::{RelayEvent, RelayEventBroadcaster};
use live_relay::services::{RelayDependencies, RelayService};
use live_relay::stream::{EventStreamSource, WebSocketEventSource};
use live_relay::Error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = RelayConfig::from_env_or_default();
    config.validate()?;

    let (logging_config, _log_guard) =
        logging::init_logging(&config.log_dir, config.log_retention_days)?;
    info!(filter = %logging_config.get_filter(), "live-relay starting");

    let Some(stream_url) = config.event_stream_url.clone() else {
        anyhow::bail!("LIVE_RELAY_EVENT_STREAM_URL must be set");
    };

    // Initialize database
    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open {}", config.database_url))?;
    database::run_migrations(&pool).await?;
    let repository: Arc<dyn LiveStateRepository> = Arc::new(SqlxLiveStateRepository::new(pool));

    let broadcaster = RelayEventBroadcaster::with_capacity(config.event_channel_capacity);
    let source: Arc<dyn EventStreamSource> = Arc::new(WebSocketEventSource::new(
        stream_url,
        config.event_channel_capacity,
    ));
    let probe = build_probe(&config, source.clone())?;

    let relay = RelayService::new(
        &config,
        RelayDependencies {
            source,
            probe,
            notifier: Arc::new(broadcaster.clone()),
            repository: Some(repository),
        },
    )?;

    spawn_event_logger(&broadcaster, relay.cancellation_token());

    let restored = relay.restore().await?;
    for handle in &config.initial_handles {
        match relay.track(handle).await {
            Ok(result) => debug!(handle = %handle, status = %result.status, "Tracked initial handle"),
            Err(Error::AlreadyTracked { .. }) => {}
            Err(e) => warn!(handle = %handle, error = %e, "Failed to track initial handle"),
        }
    }

    relay.start();
    logging_config.start_retention_cleanup(relay.cancellation_token());

    let stats = relay.stats();
    info!(
        restored,
        tracked = stats.tracked,
        active = stats.active,
        queued = stats.queued,
        "live-relay running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    relay.shutdown().await?;
    Ok(())
}

/// Status API first when configured, then a connection handshake.
fn build_probe(
    config: &RelayConfig,
    source: Arc<dyn EventStreamSource>,
) -> anyhow::Result<Arc<dyn LiveProbe>> {
    let mut probe = LayeredProbe::new();

    if let Some(url) = &config.probe.status_api_url {
        let http = HttpStatusProbe::new(
            url.clone(),
            &config.probe.status_field,
            config.fast_probe_timeout(),
        )?;
        probe = probe.with_step(Arc::new(http), config.fast_probe_timeout());
    }

    probe = probe.with_step(
        Arc::new(HandshakeProbe::new(source)),
        config.thorough_probe_timeout(),
    );
    Ok(Arc::new(probe))
}

fn spawn_event_logger(
    broadcaster: &RelayEventBroadcaster,
    cancel: tokio_util::sync::CancellationToken,
) {
    let mut events = broadcaster.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(event @ RelayEvent::StateUpdated { .. }) => debug!("{}", event.description()),
                Ok(event) if event.is_transition() => info!("{}", event.description()),
                Ok(event) => debug!("{}", event.description()),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                Err(RecvError::Closed) => {
                    error!("Event channel closed");
                    break;
                }
            }
        }
    });
}
