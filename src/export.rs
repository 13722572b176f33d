//! Exporting rendered images.
//!
//! Each entity's output is encoded and handed to an [`ExportSink`]. A failure
//! on one entity is recorded and the rest of the batch still exports.

use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::buffer::ConvertBuffer;
use image::{ImageFormat, RgbImage, RgbaImage};
use tracing::{info, warn};

use crate::batch::{EntityId, ImageEntity};
use crate::error::{Error, Result};

/// Output file name for an uploaded file: `watermarked-{stem}.png`, where the
/// stem is everything before the first `.`.
///
/// Example: `"holiday.2024.jpg"` becomes `"watermarked-holiday.png"`.
#[must_use]
pub fn output_file_name(uploaded_name: &str) -> String {
    format!("watermarked-{}.png", output_stem(uploaded_name))
}

fn output_stem(uploaded_name: &str) -> &str {
    uploaded_name.split('.').next().unwrap_or_default()
}

/// Reserve an output name for `uploaded_name` that is not in `taken`.
///
/// Later uploads sharing a stem get `-2`, `-3`, ... appended.
fn claim_output_name(taken: &mut HashSet<String>, uploaded_name: &str) -> String {
    let mut name = output_file_name(uploaded_name);
    let mut n = 2;
    while !taken.insert(name.clone()) {
        name = format!("watermarked-{}-{n}.png", output_stem(uploaded_name));
        n += 1;
    }
    name
}

/// Encode an image as PNG.
///
/// # Errors
///
/// Returns [`Error::Encode`] naming `name` if encoding fails.
pub fn encode_png(name: &str, img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|source| Error::Encode {
            name: name.to_string(),
            source,
        })?;
    Ok(buf.into_inner())
}

/// Save an image in the format implied by the path's extension.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    let name = path.display().to_string();
    match format {
        ImageFormat::Png | ImageFormat::WebP => {
            img.save_with_format(path, format)
                .map_err(|source| Error::Encode { name, source })?;
        }
        ImageFormat::Bmp => {
            // BMP has no useful alpha support in most viewers
            let rgb: RgbImage = img.convert();
            rgb.save_with_format(path, format)
                .map_err(|source| Error::Encode { name, source })?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Destination for encoded exports.
///
/// Implemented for a directory on disk and for memory. Archive bundlers can
/// implement it to collect every file into one download.
pub trait ExportSink {
    /// Store `bytes` under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be stored.
    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Writes exports as files in a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// A sink writing into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    /// The target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for DirectorySink {
    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::write(self.dir.join(name), bytes)?;
        Ok(())
    }
}

/// Keeps exports in memory, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Exported files.
    pub files: BTreeMap<String, Vec<u8>>,
}

impl ExportSink for MemorySink {
    fn write(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// A successfully exported entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Entity the file came from.
    pub id: EntityId,
    /// Name the file was stored under.
    pub name: String,
    /// Encoded size in bytes.
    pub bytes: usize,
}

/// An entity whose export failed.
#[derive(Debug)]
pub struct ExportFailure {
    /// Entity that failed.
    pub id: EntityId,
    /// Name the file would have been stored under.
    pub name: String,
    /// What went wrong.
    pub error: Error,
}

/// Outcome of exporting a batch.
#[derive(Debug, Default)]
pub struct BatchExportReport {
    /// Files written.
    pub exported: Vec<ExportedFile>,
    /// Entities without a rendered output.
    pub skipped: Vec<EntityId>,
    /// Entities whose encode or write failed.
    pub failed: Vec<ExportFailure>,
}

impl BatchExportReport {
    /// Whether every entity with an output was exported.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Encode and store every rendered entity.
///
/// File names follow [`output_file_name`]; uploads whose names collide get a
/// numeric suffix so no export replaces another. Encoding runs in parallel
/// when the `cli` feature is enabled (via rayon); files reach the sink in
/// entity order.
pub fn export_batch(entities: &[ImageEntity], sink: &mut dyn ExportSink) -> BatchExportReport {
    let mut report = BatchExportReport::default();
    let mut jobs = Vec::new();
    let mut taken = HashSet::new();
    for entity in entities {
        match entity.output() {
            Some(output) => {
                let name = claim_output_name(&mut taken, &entity.file().name);
                jobs.push((entity.id(), name, output));
            }
            None => report.skipped.push(entity.id()),
        }
    }

    let encode = |(id, name, output): &(EntityId, String, &RgbaImage)| {
        (*id, name.clone(), encode_png(name, output))
    };

    #[cfg(feature = "cli")]
    let encoded: Vec<_> = {
        use rayon::prelude::*;
        jobs.par_iter().map(encode).collect()
    };

    #[cfg(not(feature = "cli"))]
    let encoded: Vec<_> = jobs.iter().map(encode).collect();

    for (id, name, result) in encoded {
        match result.and_then(|bytes| sink.write(&name, &bytes).map(|()| bytes.len())) {
            Ok(bytes) => report.exported.push(ExportedFile { id, name, bytes }),
            Err(error) => {
                warn!(%id, file = %name, %error, "export failed");
                report.failed.push(ExportFailure { id, name, error });
            }
        }
    }

    info!(
        exported = report.exported.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "batch export finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SourceFile;
    use image::{DynamicImage, Rgba};

    #[test]
    fn output_name_uses_stem_before_first_dot() {
        assert_eq!(output_file_name("photo.jpg"), "watermarked-photo.png");
        assert_eq!(output_file_name("a.b.c.webp"), "watermarked-a.png");
        assert_eq!(output_file_name("noext"), "watermarked-noext.png");
        assert_eq!(output_file_name(".hidden"), "watermarked-.png");
    }

    #[test]
    fn png_encoding_is_lossless() {
        let img = RgbaImage::from_fn(5, 4, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgba([x as u8 * 40, y as u8 * 50, 7, 200])
        });
        let bytes = encode_png("x", &img).unwrap();
        let back = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(back, img);
    }

    #[test]
    fn save_image_rejects_unknown_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbaImage::new(2, 2);
        assert!(matches!(
            save_image(&img, &dir.path().join("out.xyz")),
            Err(Error::UnsupportedFormat(_))
        ));
        save_image(&img, &dir.path().join("out.png")).unwrap();
    }

    #[test]
    fn bmp_keeps_color_and_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bmp");
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        save_image(&img, &path).unwrap();

        let back = image::open(&path).unwrap();
        assert!(!back.color().has_alpha());
        assert_eq!(back.to_rgb8().get_pixel(2, 1).0, [10, 20, 30]);
    }

    #[test]
    fn colliding_stems_get_distinct_names() {
        let mut ws = crate::Workspace::with_defaults().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        ws.ingest_all(
            ["a.jpg", "a.png", "a-2.jpg", "shot.1.jpg", "shot.2.jpg"]
                .map(|name| (SourceFile::new(name, 1), &img)),
        );
        let mut sink = MemorySink::default();
        let report = export_batch(ws.entities(), &mut sink);

        let names: Vec<_> = report.exported.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "watermarked-a.png",
                "watermarked-a-2.png",
                "watermarked-a-2-2.png",
                "watermarked-shot.png",
                "watermarked-shot-2.png",
            ]
        );
        assert!(report.failed.is_empty());
        assert_eq!(sink.files.len(), report.exported.len());
    }

    #[test]
    fn entities_without_output_are_skipped() {
        let entity = ImageEntity::new(
            EntityId::new(1),
            SourceFile::new("a.png", 1),
            RgbaImage::new(2, 2),
        );
        let mut sink = MemorySink::default();
        let report = export_batch(&[entity], &mut sink);
        assert_eq!(report.skipped, vec![EntityId::new(1)]);
        assert!(report.exported.is_empty());
        assert!(sink.files.is_empty());
    }

    struct FailingSink {
        fail_on: String,
        inner: MemorySink,
    }

    impl ExportSink for FailingSink {
        fn write(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
            if name == self.fail_on {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.inner.write(name, bytes)
        }
    }

    #[test]
    fn one_failure_does_not_stop_the_batch() {
        let mut ws = crate::Workspace::with_defaults().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255])));
        ws.ingest_all([
            (SourceFile::new("one.png", 1), &img),
            (SourceFile::new("two.png", 1), &img),
            (SourceFile::new("three.png", 1), &img),
        ]);
        let mut sink = FailingSink {
            fail_on: "watermarked-two.png".to_string(),
            inner: MemorySink::default(),
        };
        let report = export_batch(ws.entities(), &mut sink);

        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "watermarked-two.png");
        let names: Vec<_> = report.exported.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["watermarked-one.png", "watermarked-three.png"]);
        assert_eq!(sink.inner.files.len(), 2);
    }
}
