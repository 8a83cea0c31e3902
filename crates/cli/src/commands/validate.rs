//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ConstructionMethod, PipelineBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    method: String,
    frames_per_image: u32,
    camera_channels: u32,
    expected_images: u64,
    storage: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    method: blueprint.construction.method.filter_name().to_string(),
                    frames_per_image: blueprint.camera.frames_per_image,
                    camera_channels: blueprint.camera.channels,
                    expected_images: blueprint.expected_images(),
                    storage: blueprint.storage.name.clone(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();
    let camera = &blueprint.camera;
    let frames_per_event = camera.frames_per_image as usize * camera.channels as usize;

    // The construction queue holds one unit per sub-frame
    if blueprint.queue.capacity < frames_per_event {
        warnings.push(format!(
            "queue.capacity {} is below one image worth of sub-frames ({}) - acquisition will block on every image",
            blueprint.queue.capacity, frames_per_event
        ));
    }

    if camera.buffer_capacity < 2 * frames_per_event {
        warnings.push(format!(
            "camera.buffer_capacity {} holds fewer than two images - frames may be overwritten before they are read",
            camera.buffer_capacity
        ));
    }

    if blueprint.construction.method != ConstructionMethod::RankFilter
        && (blueprint.construction.rank - 0.95).abs() > f64::EPSILON
    {
        warnings.push(format!(
            "construction.rank is ignored by the {} method",
            blueprint.construction.method.filter_name()
        ));
    }

    if blueprint.diagnostics.enabled && blueprint.diagnostics.output_dir.is_none() {
        warnings.push(
            "diagnostics.output_dir is unset - queue occupancy is sampled but not written".to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Method: {}", summary.method);
            println!("  Sub-frames per image: {}", summary.frames_per_image);
            println!("  Camera channels: {}", summary.camera_channels);
            println!("  Expected images: {}", summary.expected_images);
            println!("  Storage: {}", summary.storage);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("acq.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    const VALID: &str = r#"
[camera]
width = 8
height = 4
frames_per_image = 4
buffer_capacity = 16

[construction]
method = "summation"

[queue]
capacity = 2

[storage]
name = "store"
storage_type = "memory"
"#;

    #[test]
    fn test_valid_config_with_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let args = ValidateArgs {
            config: write_config(&dir, VALID),
            json: true,
        };
        let result = validate_config(&args);
        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.method, "FrameSummation");
        assert_eq!(summary.frames_per_image, 4);

        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("queue.capacity")));
        assert!(warnings.iter().any(|w| w.contains("output_dir")));
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: PathBuf::from("/nonexistent/acq.toml"),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
        assert!(run_validate(&args).is_err());
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let args = ValidateArgs {
            config: write_config(&dir, &VALID.replace("capacity = 2", "capacity = 0")),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.is_some());
    }
}
