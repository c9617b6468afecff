//! Integration tests over the model-free pipeline surface
//!
//! Everything here runs without any model on disk or network access: the
//! adapters' pure kernels, configuration validation, cache management, and
//! the artifact writer.

use grounded_inpaint::{
    BoundingBox, EditRequest, EditResult, ImageIoService, ModelCache, ModelKind, ModelSource,
    ModelSpec, OutputFormat, PipelineConfig, PipelineError, ProcessingMetadata, SegmentationMask,
    StageModels,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use tempfile::TempDir;

fn test_image(width: u32, height: u32) -> DynamicImage {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, 128]);
    }
    DynamicImage::ImageRgb8(img)
}

fn synthetic_result(width: u32, height: u32) -> EditResult {
    let image = test_image(width, height);
    let mut mask_data = vec![0u8; (width * height) as usize];
    for value in mask_data.iter_mut().take((width * height / 2) as usize) {
        *value = 255;
    }
    let mask = SegmentationMask::new(mask_data, (width, height));
    let inverted_mask = mask.invert();
    let overlay = mask
        .overlay(&image, grounded_inpaint::mask::DEFAULT_OVERLAY_COLOR)
        .unwrap();

    EditResult {
        detections: vec![grounded_inpaint::Detection {
            bbox: BoundingBox::new(0.5, 0.5, 0.5, 0.5),
            score: 0.87,
            phrase: "bench".to_string(),
        }],
        annotated: image.to_rgb8(),
        overlay,
        mask,
        inverted_mask,
        object_edit: Some(image.clone()),
        background_edit: None,
        original_dimensions: (width, height),
        metadata: ProcessingMetadata::new(
            "detector".to_string(),
            "segmenter".to_string(),
            "inpainter".to_string(),
            32,
        ),
    }
}

#[test]
fn box_conversion_round_trips_through_public_api() {
    let original = BoundingBox::new(0.4, 0.6, 0.25, 0.3);
    let recovered = original.to_pixel(1280, 720).to_normalized(1280, 720);

    assert!((recovered.cx - original.cx).abs() < 1e-5);
    assert!((recovered.cy - original.cy).abs() < 1e-5);
    assert!((recovered.w - original.w).abs() < 1e-5);
    assert!((recovered.h - original.h).abs() < 1e-5);
}

#[test]
fn mask_inversion_round_trips_exactly() {
    let mask = SegmentationMask::new(vec![0, 255, 255, 0, 255, 0], (3, 2));
    assert_eq!(mask.invert().invert().data, mask.data);
}

#[test]
fn all_zero_mask_overlay_preserves_base_image() {
    let base = test_image(32, 24);
    let mask = SegmentationMask::new(vec![0; 32 * 24], (32, 24));

    let composite = mask
        .overlay(&base, grounded_inpaint::mask::DEFAULT_OVERLAY_COLOR)
        .unwrap();
    assert_eq!(composite.as_raw(), base.to_rgba8().as_raw());
}

#[test]
fn mask_resize_round_trip_preserves_dimensions() {
    let mask = SegmentationMask::new(vec![255; 100 * 80], (100, 80));
    let down = mask.resize(512, 512).unwrap();
    let back = down.resize(100, 80).unwrap();
    assert_eq!(back.dimensions, (100, 80));
}

#[test]
fn config_builder_rejects_invalid_values() {
    assert!(PipelineConfig::builder().box_threshold(2.0).build().is_err());
    assert!(PipelineConfig::builder().inference_steps(0).build().is_err());
    assert!(PipelineConfig::builder().guidance_scale(0.0).build().is_err());
    assert!(PipelineConfig::builder().seed(7).build().is_ok());
}

#[tokio::test]
async fn empty_find_prompt_fails_before_model_loading() {
    let request = EditRequest::locate("");
    let result =
        grounded_inpaint::edit_image(test_image(8, 8), &request, PipelineConfig::default()).await;
    assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
}

#[tokio::test]
async fn missing_models_surface_a_model_error() {
    let empty_dir = TempDir::new().unwrap();
    let spec = ModelSpec {
        source: ModelSource::External(empty_dir.path().to_path_buf()),
    };
    let config = PipelineConfig::builder()
        .models(StageModels {
            detector: spec.clone(),
            segmenter: spec.clone(),
            inpainter: spec,
        })
        .build()
        .unwrap();

    let request = EditRequest::locate("bench");
    let result = grounded_inpaint::edit_image(test_image(8, 8), &request, config).await;
    assert!(matches!(result, Err(PipelineError::Model(_))));
}

#[test]
fn artifact_sequence_is_written_in_order() {
    let out_dir = TempDir::new().unwrap();
    let result = synthetic_result(64, 48);

    let written =
        ImageIoService::save_artifacts(&result, out_dir.path(), OutputFormat::Jpeg, 90).unwrap();

    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "detections.jpg",
            "mask_overlay.jpg",
            "mask.jpg",
            "mask_inverted.jpg",
            "object_edit.jpg",
            "metadata.json"
        ]
    );
    for path in &written {
        assert!(path.exists());
        assert!(fs::metadata(path).unwrap().len() > 0);
    }
}

#[test]
fn artifact_sequence_png_extension_follows_format() {
    let out_dir = TempDir::new().unwrap();
    let result = synthetic_result(32, 32);

    let written =
        ImageIoService::save_artifacts(&result, out_dir.path(), OutputFormat::Png, 90).unwrap();
    assert!(written
        .iter()
        .filter(|p| p.extension().unwrap() != "json")
        .all(|p| p.extension().unwrap() == "png"));
}

#[test]
fn cache_lifecycle_with_custom_directory() {
    let cache_root = TempDir::new().unwrap();
    let cache = ModelCache::with_custom_cache_dir(cache_root.path()).unwrap();

    // Fake a complete segmenter model
    let model_dir = cache.get_model_path("Xenova--sam-vit-base");
    for file in ModelKind::Segmenter.required_files() {
        let path = model_dir.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"weights").unwrap();
    }

    assert!(cache.is_model_cached("Xenova--sam-vit-base"));
    let models = cache.scan_cached_models().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].kind, Some(ModelKind::Segmenter));

    let removed = cache.clear_all_models().unwrap();
    assert_eq!(removed, vec!["Xenova--sam-vit-base"]);
    assert!(!cache.is_model_cached("Xenova--sam-vit-base"));
}

#[test]
fn default_stage_models_resolve_distinct_ids() {
    let models = StageModels::default();
    let ids: Vec<String> = ModelKind::ALL
        .iter()
        .map(|&kind| match &models.spec(kind).source {
            ModelSource::Downloaded(id) => id.clone(),
            ModelSource::External(path) => path.display().to_string(),
        })
        .collect();

    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| !id.is_empty()));
    let mut deduped = ids.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), 3, "stage models must not collide: {ids:?}");
}
