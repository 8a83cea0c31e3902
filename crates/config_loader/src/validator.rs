//! Configuration validation
//!
//! Rules:
//! - camera geometry and channel counts positive
//! - bytes_per_pixel maps to a pixel type
//! - ring buffer holds at least one image worth of sub-frames
//! - rank in [0, 1]
//! - frames_per_image within the construction method's bound
//! - channel offsets consistent with channel count and frame width
//! - every queue capacity > 0
//! - storage name present

use contracts::{ContractError, PipelineBlueprint, PixelType};

/// Validate a PipelineBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_camera(blueprint)?;
    validate_acquisition(blueprint)?;
    validate_construction(blueprint)?;
    validate_queues(blueprint)?;
    validate_storage(blueprint)?;
    validate_diagnostics(blueprint)?;
    Ok(())
}

fn validate_camera(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let camera = &blueprint.camera;

    if camera.width == 0 || camera.height == 0 {
        return Err(ContractError::config_validation(
            "camera.width / camera.height",
            format!(
                "frame size must be > 0, got {}x{}",
                camera.width, camera.height
            ),
        ));
    }
    if camera.channels == 0 {
        return Err(ContractError::config_validation(
            "camera.channels",
            "channel count must be >= 1",
        ));
    }
    if PixelType::from_bytes_per_pixel(camera.bytes_per_pixel).is_none() {
        return Err(ContractError::config_validation(
            "camera.bytes_per_pixel",
            format!(
                "unsupported bytes_per_pixel {}, expected 1, 2 or 4",
                camera.bytes_per_pixel
            ),
        ));
    }
    if camera.frames_per_image == 0 {
        return Err(ContractError::config_validation(
            "camera.frames_per_image",
            "frames_per_image must be >= 1",
        ));
    }
    if !(camera.exposure_ms.is_finite() && camera.exposure_ms > 0.0) {
        return Err(ContractError::config_validation(
            "camera.exposure_ms",
            format!("exposure_ms must be > 0, got {}", camera.exposure_ms),
        ));
    }

    // The reorderer reaches back C * N frames from the newest one
    let frames_per_event = camera.channels as usize * camera.frames_per_image as usize;
    if camera.buffer_capacity < frames_per_event {
        return Err(ContractError::config_validation(
            "camera.buffer_capacity",
            format!(
                "buffer_capacity ({}) must hold channels * frames_per_image ({})",
                camera.buffer_capacity, frames_per_event
            ),
        ));
    }
    Ok(())
}

fn validate_acquisition(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let plan = &blueprint.acquisition;
    if plan.id.is_empty() {
        return Err(ContractError::config_validation(
            "acquisition.id",
            "acquisition id cannot be empty",
        ));
    }
    for (field, value) in [
        ("acquisition.timepoints", plan.timepoints),
        ("acquisition.channels", plan.channels),
        ("acquisition.slices", plan.slices),
    ] {
        if value == 0 {
            return Err(ContractError::config_validation(field, "must be >= 1"));
        }
    }
    Ok(())
}

fn validate_construction(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let settings = &blueprint.construction;
    let camera = &blueprint.camera;

    if !(0.0..=1.0).contains(&settings.rank) {
        return Err(ContractError::config_validation(
            "construction.rank",
            format!("rank must be in [0, 1], got {}", settings.rank),
        ));
    }

    if let Some(input) = PixelType::from_bytes_per_pixel(camera.bytes_per_pixel) {
        settings
            .method
            .output_pixel_type(input)
            .and_then(|_| settings.method.check_num_frames(input, camera.frames_per_image))
            .map_err(|e| {
                ContractError::config_validation("construction.method", e.to_string())
            })?;
    }

    if !settings.channel_offsets.is_empty()
        && settings.channel_offsets.len() != camera.channels as usize
    {
        return Err(ContractError::config_validation(
            "construction.channel_offsets",
            format!(
                "expected {} offsets (one per camera channel), got {}",
                camera.channels,
                settings.channel_offsets.len()
            ),
        ));
    }

    if settings.image_width == Some(0) {
        return Err(ContractError::config_validation(
            "construction.image_width",
            "image_width must be > 0",
        ));
    }

    for channel in 0..camera.channels {
        let offset = settings.channel_offset(channel);
        let width = settings.output_width(camera.width, channel);
        if width == 0 || offset as u64 + width as u64 > camera.width as u64 {
            return Err(ContractError::config_validation(
                format!("construction.channel_offsets[{channel}]"),
                format!(
                    "offset {} + width {} exceeds raw frame width {}",
                    offset, width, camera.width
                ),
            ));
        }
    }
    Ok(())
}

fn validate_queues(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    if blueprint.queue.capacity == 0 {
        return Err(ContractError::config_validation(
            "queue.capacity",
            "construction queue capacity must be > 0",
        ));
    }
    if blueprint.viewer.enabled && blueprint.viewer.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "viewer.queue_capacity",
            "viewer queue capacity must be > 0",
        ));
    }
    Ok(())
}

fn validate_storage(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let storage = &blueprint.storage;
    if storage.name.is_empty() {
        return Err(ContractError::config_validation(
            "storage.name",
            "storage name cannot be empty",
        ));
    }
    if storage.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "storage.queue_capacity",
            "writing queue capacity must be > 0",
        ));
    }
    Ok(())
}

fn validate_diagnostics(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let diagnostics = &blueprint.diagnostics;
    if diagnostics.enabled && diagnostics.sample_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "diagnostics.sample_interval_ms",
            "sample interval must be > 0",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        AcquisitionPlan, CameraConfig, ConfigVersion, ConstructionMethod, ConstructionSettings,
        DiagnosticsConfig, FramePattern, QueueConfig, StorageConfig, StorageType, ViewerConfig,
    };

    fn minimal_blueprint() -> PipelineBlueprint {
        PipelineBlueprint {
            version: ConfigVersion::V1,
            camera: CameraConfig {
                name: "sim".into(),
                width: 64,
                height: 32,
                channels: 2,
                bytes_per_pixel: 1,
                frames_per_image: 3,
                exposure_ms: 5.0,
                buffer_capacity: 32,
                pattern: FramePattern::Constant,
                base_value: 10,
            },
            acquisition: AcquisitionPlan::default(),
            construction: ConstructionSettings::new(ConstructionMethod::Summation),
            queue: QueueConfig { capacity: 8 },
            storage: StorageConfig {
                name: "store".into(),
                storage_type: StorageType::Memory,
                queue_capacity: 4,
            },
            viewer: ViewerConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }

    fn error_of(bp: &PipelineBlueprint) -> String {
        let result = validate(bp);
        assert!(result.is_err());
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_channels() {
        let mut bp = minimal_blueprint();
        bp.camera.channels = 0;
        let err = error_of(&bp);
        assert!(err.contains("camera.channels"), "got: {err}");
    }

    #[test]
    fn test_bad_bytes_per_pixel() {
        let mut bp = minimal_blueprint();
        bp.camera.bytes_per_pixel = 3;
        let err = error_of(&bp);
        assert!(err.contains("bytes_per_pixel"), "got: {err}");
    }

    #[test]
    fn test_ring_buffer_too_small() {
        let mut bp = minimal_blueprint();
        bp.camera.buffer_capacity = 5;
        let err = error_of(&bp);
        assert!(err.contains("buffer_capacity"), "got: {err}");
    }

    #[test]
    fn test_rank_out_of_range() {
        let mut bp = minimal_blueprint();
        bp.construction.method = ConstructionMethod::RankFilter;
        bp.construction.rank = 1.5;
        let err = error_of(&bp);
        assert!(err.contains("rank must be in [0, 1]"), "got: {err}");

        bp.construction.rank = f64::NAN;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_summation_bound_rejected() {
        let mut bp = minimal_blueprint();
        bp.camera.channels = 1;
        bp.camera.frames_per_image = 258;
        bp.camera.buffer_capacity = 512;
        let err = error_of(&bp);
        assert!(err.contains("construction.method"), "got: {err}");

        bp.construction.method = ConstructionMethod::Average;
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_summation_of_32bit_rejected() {
        let mut bp = minimal_blueprint();
        bp.camera.bytes_per_pixel = 4;
        let err = error_of(&bp);
        assert!(err.contains("construction.method"), "got: {err}");
    }

    #[test]
    fn test_channel_offsets_count() {
        let mut bp = minimal_blueprint();
        bp.construction.channel_offsets = vec![0];
        let err = error_of(&bp);
        assert!(err.contains("one per camera channel"), "got: {err}");
    }

    #[test]
    fn test_channel_offsets_exceed_width() {
        let mut bp = minimal_blueprint();
        bp.construction.channel_offsets = vec![0, 32];
        bp.construction.image_width = Some(40);
        let err = error_of(&bp);
        assert!(err.contains("exceeds raw frame width"), "got: {err}");

        bp.construction.image_width = Some(32);
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut bp = minimal_blueprint();
        bp.queue.capacity = 0;
        let err = error_of(&bp);
        assert!(err.contains("queue.capacity"), "got: {err}");
    }

    #[test]
    fn test_disabled_viewer_ignores_capacity() {
        let mut bp = minimal_blueprint();
        bp.viewer.queue_capacity = 0;
        assert!(validate(&bp).is_err());
        bp.viewer.enabled = false;
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_empty_storage_name() {
        let mut bp = minimal_blueprint();
        bp.storage.name = String::new();
        let err = error_of(&bp);
        assert!(err.contains("cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_zero_sample_interval() {
        let mut bp = minimal_blueprint();
        bp.diagnostics.sample_interval_ms = 0;
        let err = error_of(&bp);
        assert!(err.contains("sample interval"), "got: {err}");
    }
}
