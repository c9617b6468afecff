//! Image I/O operations service
//!
//! Loading of source images and writing of the fixed artifact sequence a
//! pipeline run produces, kept out of the pipeline itself.

use crate::{
    config::OutputFormat,
    error::{PipelineError, Result},
    types::EditResult,
};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Service for handling image file input/output operations
pub struct ImageIoService;

impl ImageIoService {
    /// Load an image from a file path
    ///
    /// Falls back to content-based format detection when the extension lies.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Undecodable image data
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(PipelineError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref).map_err(|io_err| {
                    PipelineError::file_io_error("read image data", path_ref, &io_err)
                })?;
                Self::load_from_bytes(&data)
            },
        }
    }

    /// Decode an image from in-memory bytes
    ///
    /// # Errors
    /// - Undecodable image data
    pub fn load_from_bytes(data: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(data).map_err(|e| {
            PipelineError::processing(format!("Failed to decode image from bytes: {e}"))
        })
    }

    /// Save an image in the configured output format
    ///
    /// # Errors
    /// - Encoding or file system failures
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
        quality: u8,
    ) -> Result<()> {
        let path_ref = path.as_ref();
        match format {
            OutputFormat::Png => {
                image
                    .save_with_format(path_ref, image::ImageFormat::Png)
                    .map_err(PipelineError::Image)?;
            },
            OutputFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb_image = image.to_rgb8();
                let file = std::fs::File::create(path_ref)
                    .map_err(|e| PipelineError::file_io_error("create file", path_ref, &e))?;
                let mut encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(file, quality);
                encoder
                    .encode_image(&rgb_image)
                    .map_err(PipelineError::Image)?;
            },
        }
        Ok(())
    }

    /// Write the fixed artifact sequence of a pipeline run
    ///
    /// Writes the annotated detection frame, the mask overlay, both masks,
    /// and any generated edits into `dir`, returning the written paths in
    /// order.
    ///
    /// # Errors
    /// - Directory creation or encoding failures
    pub fn save_artifacts<P: AsRef<Path>>(
        result: &EditResult,
        dir: P,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| PipelineError::file_io_error("create output directory", dir, &e))?;

        let ext = format.extension();
        let mut written = Vec::new();

        let artifact = |name: &str| dir.join(format!("{name}.{ext}"));

        let annotated = DynamicImage::ImageRgb8(result.annotated.clone());
        Self::save_image(&annotated, artifact("detections"), format, quality)?;
        written.push(artifact("detections"));

        let overlay = DynamicImage::ImageRgba8(result.overlay.clone());
        Self::save_image(&overlay, artifact("mask_overlay"), format, quality)?;
        written.push(artifact("mask_overlay"));

        let mask = DynamicImage::ImageLuma8(result.mask.to_image()?);
        Self::save_image(&mask, artifact("mask"), format, quality)?;
        written.push(artifact("mask"));

        let inverted = DynamicImage::ImageLuma8(result.inverted_mask.to_image()?);
        Self::save_image(&inverted, artifact("mask_inverted"), format, quality)?;
        written.push(artifact("mask_inverted"));

        if let Some(object_edit) = &result.object_edit {
            Self::save_image(object_edit, artifact("object_edit"), format, quality)?;
            written.push(artifact("object_edit"));
        }

        if let Some(background_edit) = &result.background_edit {
            Self::save_image(background_edit, artifact("background_edit"), format, quality)?;
            written.push(artifact("background_edit"));
        }

        let metadata_path = dir.join("metadata.json");
        let metadata_json = serde_json::to_string_pretty(&result.metadata).map_err(|e| {
            PipelineError::processing(format!("Failed to serialize run metadata: {e}"))
        })?;
        std::fs::write(&metadata_path, metadata_json)
            .map_err(|e| PipelineError::file_io_error("write metadata", &metadata_path, &e))?;
        written.push(metadata_path);

        log::info!("Wrote {} artifact(s) to {}", written.len(), dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([90, 120, 30])))
    }

    #[test]
    fn test_load_missing_file() {
        let result = ImageIoService::load_image("/nonexistent/image.png");
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_save_and_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");

        ImageIoService::save_image(&test_image(), &path, OutputFormat::Png, 90).unwrap();
        let loaded = ImageIoService::load_image(&path).unwrap();
        assert_eq!(loaded.width(), 16);
        assert_eq!(loaded.height(), 16);
    }

    #[test]
    fn test_save_jpeg(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");

        ImageIoService::save_image(&test_image(), &path, OutputFormat::Jpeg, 90).unwrap();
        assert!(path.exists());
        let loaded = ImageIoService::load_image(&path).unwrap();
        assert_eq!(loaded.width(), 16);
    }

    #[test]
    fn test_load_from_bytes_rejects_garbage() {
        let result = ImageIoService::load_from_bytes(&[0, 1, 2, 3]);
        assert!(matches!(result, Err(PipelineError::Processing(_))));
    }

    #[test]
    fn test_load_wrong_extension_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let png_path = dir.path().join("mislabeled.jpg");

        // Write a PNG under a .jpg name
        test_image()
            .save_with_format(&png_path, image::ImageFormat::Png)
            .unwrap();
        let loaded = ImageIoService::load_image(&png_path).unwrap();
        assert_eq!(loaded.width(), 16);
    }
}
