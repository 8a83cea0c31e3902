//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

use contracts::PipelineBlueprint;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut blueprint, args);

    info!(
        camera = %blueprint.camera.name,
        method = blueprint.construction.method.filter_name(),
        frames_per_image = blueprint.camera.frames_per_image,
        timepoints = blueprint.acquisition.timepoints,
        queue_capacity = blueprint.queue.capacity,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        storage_timeout: Duration::from_secs(args.storage_timeout),
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);

    // A signal ends acquisition early; queued images still drain to storage
    let stop = pipeline.stop_handle();
    let signal_watch = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping acquisition...");
        stop.store(true, Ordering::Relaxed);
    });

    info!("Starting pipeline...");
    let result = pipeline.run().await;
    signal_watch.abort();

    let stats = result.context("Pipeline execution failed")?;
    info!(
        images = stats.worker.images_emitted,
        stored = stats.storage.write_count,
        duration_secs = stats.duration.as_secs_f64(),
        images_per_sec = format!("{:.2}", stats.images_per_sec()),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Frame constructor finished");
    Ok(())
}

/// Apply command-line overrides to the loaded blueprint
fn apply_overrides(blueprint: &mut PipelineBlueprint, args: &RunArgs) {
    if let Some(timepoints) = args.timepoints {
        info!(timepoints, "Overriding time points from CLI");
        blueprint.acquisition.timepoints = timepoints;
    }
    if let Some(ref dir) = args.diagnostics_dir {
        info!(dir = %dir.display(), "Overriding diagnostics directory from CLI");
        blueprint.diagnostics.enabled = true;
        blueprint.diagnostics.output_dir = Some(dir.clone());
    }
    if args.no_viewer {
        blueprint.viewer.enabled = false;
    }
}

/// Wait for Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &PipelineBlueprint) {
    let camera = &blueprint.camera;
    let plan = &blueprint.acquisition;
    println!("\n=== Configuration Summary ===\n");
    println!("Camera:");
    println!(
        "  {}: {}x{}, {} channel(s), {} byte(s)/pixel",
        camera.name, camera.width, camera.height, camera.channels, camera.bytes_per_pixel
    );
    println!(
        "  {} sub-frame(s) per image, buffer {} frames",
        camera.frames_per_image, camera.buffer_capacity
    );
    println!("\nConstruction:");
    println!("  Method: {}", blueprint.construction.method.filter_name());
    println!("  Queue capacity: {}", blueprint.queue.capacity);
    println!("\nAcquisition:");
    println!(
        "  {} time point(s) x {} slice(s) x {} channel(s) = {} images",
        plan.timepoints,
        plan.slices,
        blueprint.output_channels(),
        blueprint.expected_images()
    );
    println!("\nOutputs:");
    println!(
        "  Storage: {} ({:?}, queue {})",
        blueprint.storage.name, blueprint.storage.storage_type, blueprint.storage.queue_capacity
    );
    if blueprint.viewer.enabled {
        println!("  Viewer: queue {}", blueprint.viewer.queue_capacity);
    } else {
        println!("  Viewer: disabled");
    }
    match &blueprint.diagnostics.output_dir {
        Some(dir) if blueprint.diagnostics.enabled => println!("  Diagnostics: {}", dir.display()),
        _ => println!("  Diagnostics: not written"),
    }
    println!();
}
