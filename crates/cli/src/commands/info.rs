//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{ConstructionMethod, PipelineBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    construction: ConstructionInfo,
    acquisition: AcquisitionInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    camera: Option<CameraInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outputs: Option<OutputsInfo>,
}

#[derive(Serialize)]
struct ConstructionInfo {
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rank: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    channel_offsets: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_width: Option<u32>,
}

#[derive(Serialize)]
struct AcquisitionInfo {
    id: String,
    timepoints: u32,
    slices: u32,
    channels: u32,
    interval_ms: u64,
    expected_images: u64,
}

#[derive(Serialize)]
struct CameraInfo {
    name: String,
    width: u32,
    height: u32,
    channels: u32,
    bytes_per_pixel: u32,
    frames_per_image: u32,
    exposure_ms: f64,
    buffer_capacity: usize,
    pattern: String,
}

#[derive(Serialize)]
struct OutputsInfo {
    construction_queue_capacity: usize,
    storage_name: String,
    storage_type: String,
    writing_queue_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    viewer_queue_capacity: Option<usize>,
    diagnostics: bool,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) -> ConfigInfo {
    let settings = &blueprint.construction;
    let plan = &blueprint.acquisition;

    let camera = args.camera.then(|| {
        let c = &blueprint.camera;
        CameraInfo {
            name: c.name.clone(),
            width: c.width,
            height: c.height,
            channels: c.channels,
            bytes_per_pixel: c.bytes_per_pixel,
            frames_per_image: c.frames_per_image,
            exposure_ms: c.exposure_ms,
            buffer_capacity: c.buffer_capacity,
            pattern: format!("{:?}", c.pattern),
        }
    });

    let outputs = args.outputs.then(|| OutputsInfo {
        construction_queue_capacity: blueprint.queue.capacity,
        storage_name: blueprint.storage.name.clone(),
        storage_type: format!("{:?}", blueprint.storage.storage_type),
        writing_queue_capacity: blueprint.storage.queue_capacity,
        viewer_queue_capacity: blueprint
            .viewer
            .enabled
            .then_some(blueprint.viewer.queue_capacity),
        diagnostics: blueprint.diagnostics.enabled,
    });

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        construction: ConstructionInfo {
            method: settings.method.filter_name().to_string(),
            rank: (settings.method == ConstructionMethod::RankFilter).then_some(settings.rank),
            channel_offsets: settings.channel_offsets.clone(),
            image_width: settings.image_width,
        },
        acquisition: AcquisitionInfo {
            id: plan.id.clone(),
            timepoints: plan.timepoints,
            slices: plan.slices,
            channels: plan.channels,
            interval_ms: plan.interval_ms,
            expected_images: blueprint.expected_images(),
        },
        camera,
        outputs,
    }
}

fn print_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Frame Constructor Configuration                ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let settings = &blueprint.construction;
    println!("Construction");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Method: {}", settings.method.filter_name());
    if settings.method == ConstructionMethod::RankFilter {
        println!("   ├─ Rank: {}", settings.rank);
    }
    if !settings.channel_offsets.is_empty() {
        println!("   ├─ Channel offsets: {:?}", settings.channel_offsets);
    }
    match settings.image_width {
        Some(width) => println!("   └─ Image width: {}", width),
        None => println!("   └─ Image width: raw width minus offset"),
    }

    let plan = &blueprint.acquisition;
    println!("\nAcquisition '{}'", plan.id);
    println!("   ├─ Time points: {}", plan.timepoints);
    println!("   ├─ Slices: {}", plan.slices);
    println!("   ├─ Channels: {}", plan.channels);
    println!("   ├─ Interval: {} ms", plan.interval_ms);
    println!("   └─ Expected images: {}", blueprint.expected_images());

    if args.camera {
        let c = &blueprint.camera;
        println!("\nCamera '{}'", c.name);
        println!("   ├─ Frame: {}x{}, {} byte(s)/pixel", c.width, c.height, c.bytes_per_pixel);
        println!("   ├─ Channels: {}", c.channels);
        println!("   ├─ Sub-frames per image: {}", c.frames_per_image);
        println!("   ├─ Exposure: {} ms", c.exposure_ms);
        println!("   ├─ Ring buffer: {} frames", c.buffer_capacity);
        println!("   └─ Pattern: {:?}", c.pattern);
    }

    if args.outputs {
        println!("\nOutputs");
        println!("   ├─ Construction queue: {}", blueprint.queue.capacity);
        println!(
            "   ├─ Storage: {} ({:?}, queue {})",
            blueprint.storage.name, blueprint.storage.storage_type, blueprint.storage.queue_capacity
        );
        if blueprint.viewer.enabled {
            println!("   ├─ Viewer: queue {}", blueprint.viewer.queue_capacity);
        } else {
            println!("   ├─ Viewer: disabled");
        }
        println!(
            "   └─ Diagnostics: {}",
            if blueprint.diagnostics.enabled { "on" } else { "off" }
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn blueprint() -> PipelineBlueprint {
        config_loader::ConfigLoader::load_from_str(
            r#"
[camera]
width = 8
height = 4
channels = 2

[construction]
method = "rank_filter"
rank = 0.5

[acquisition]
timepoints = 3

[storage]
name = "store"
storage_type = "log"
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap()
    }

    #[test]
    fn test_info_sections_follow_flags() {
        let args = InfoArgs {
            config: PathBuf::from("unused.toml"),
            json: true,
            camera: true,
            outputs: false,
        };
        let info = build_config_info(&blueprint(), &args);
        assert_eq!(info.construction.rank, Some(0.5));
        assert_eq!(info.acquisition.expected_images, 6);
        assert_eq!(info.camera.as_ref().map(|c| c.channels), Some(2));
        assert!(info.outputs.is_none());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["construction"]["method"], "RankFilter");
        assert!(json.get("outputs").is_none());
    }

    #[test]
    fn test_missing_config() {
        let args = InfoArgs {
            config: PathBuf::from("/nonexistent/acq.toml"),
            json: false,
            camera: false,
            outputs: false,
        };
        assert!(run_info(&args).is_err());
    }
}
