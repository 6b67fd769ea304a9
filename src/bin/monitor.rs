use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use futures::future::join_all;
use tiltwatch::{
    actors::engine::{EngineHandle, EngineSources},
    actors::messages::ViewEvent,
    config::{BuildingConfig, read_config_file},
    sources::{HttpBackend, InProcessFeed},
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("tiltwatch", LevelFilter::TRACE),
        ("monitor", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let backend = Arc::new(HttpBackend::new(
        config.backend.base_url.clone(),
        config.backend.token.clone(),
    ));
    let feed = Arc::new(InProcessFeed::new());

    let sources = EngineSources {
        baseline: backend.clone(),
        liveness: backend.clone(),
        history: backend.clone(),
        alerts: backend.clone(),
        env: backend,
        feed,
    };

    let engines = dispatch_buildings(&config.buildings, &sources, config.timing).await;
    if engines.is_empty() {
        anyhow::bail!("no building could be selected, check the configuration");
    }

    tokio::signal::ctrl_c().await?;
    debug!("received ctrl-c, shutting down");

    join_all(engines.iter().map(|engine| engine.shutdown())).await;

    Ok(())
}

/// Start one engine per configured building and log its events. Buildings
/// whose baseline cannot be fetched are reported and skipped.
async fn dispatch_buildings(
    buildings: &[BuildingConfig],
    sources: &EngineSources,
    timing: tiltwatch::config::TimingConfig,
) -> Vec<EngineHandle> {
    let mut engines = vec![];

    for building in buildings {
        let display_name = building.display.clone().unwrap_or(building.id.clone());
        debug!("starting engine for {} ({})", display_name, building.id);

        let engine = EngineHandle::spawn(sources.clone(), timing);
        if let Err(e) = engine.select_building(&building.id).await {
            error!("could not select building {}: {e}", building.id);
            continue;
        }

        let mut events = engine.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    ViewEvent::SnapshotUpdated(snapshot) => {
                        info!(
                            "{}: {} nodes, {} gateways, {} alert groups{}",
                            display_name,
                            snapshot.node_statuses.len(),
                            snapshot.gateway_statuses.len(),
                            snapshot.alert_log.groups().len(),
                            if snapshot.stale { " (stale)" } else { "" },
                        );
                    }
                    ViewEvent::ViewReady {
                        door_num, kind, ..
                    } => {
                        info!("{}: view {kind:?} ready for node {door_num}", display_name);
                    }
                }
            }
        });

        engines.push(engine);
    }

    engines
}
