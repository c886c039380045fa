use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dicom_tiles::{
    LayerMap, TileExtractor,
    api::{self, AppState},
    config::{Cli, Command, ExtractArgs, ServeArgs, ServerConfig},
    dispatcher::ChannelDispatcher,
    repository::{InMemoryRepository, Repository},
    resolver::FsTileStore,
    service::ScanService,
    worker,
};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dicom_tiles=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extract(args) => extract(args),
        Command::Serve(args) => serve(args),
    }
}

fn extract(args: ExtractArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    let layers = match (&args.manifest, &args.dicom_dir) {
        (Some(manifest), _) => LayerMap::from_manifest_file(manifest)
            .with_context(|| format!("Failed to read manifest {}", manifest.display()))?,
        (None, Some(dir)) => LayerMap::from_directory(dir, args.sort_by)
            .with_context(|| format!("Failed to map layers in {}", dir.display()))?,
        (None, None) => bail!("either --dicom-dir or --manifest is required"),
    };
    info!("extracting {} layers into {}", layers.len(), args.output.display());

    let report = TileExtractor::new(&args.output).extract(&layers);
    for failure in &report.failures {
        warn!("z={} {}: {}", failure.z, failure.path.display(), failure.error);
    }
    if report.layers.is_empty() {
        bail!("no layer could be extracted");
    }
    Ok(())
}

fn serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig::from(&args);
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;

    runtime.block_on(async move {
        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let (dispatcher, tasks) = ChannelDispatcher::new();
        tokio::spawn(worker::run(tasks, Arc::clone(&repository)));

        let service = ScanService::new(
            repository,
            Arc::new(dispatcher),
            Arc::new(FsTileStore::new(&config.tiles_root)),
        )
        .with_max_slices(config.max_slices);
        info!("serving tiles from {}", config.tiles_root.display());

        api::run(config, AppState::new(service))
            .await
            .context("HTTP server failed")
    })
}
