//! Decoding uploaded files into images.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::debug;

use crate::batch::SourceFile;
use crate::error::{Error, Result};

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif"
        ),
        None => false,
    }
}

/// Decode encoded image bytes, sniffing the format from the content.
///
/// # Errors
///
/// Returns [`Error::Decode`] naming `name` if the bytes are not a supported
/// raster image.
pub fn decode_image(name: &str, bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|source| Error::Decode {
        name: name.to_string(),
        source,
    })
}

/// Read and decode an image file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read, or [`Error::Decode`] if
/// its content is not a supported image.
pub fn open_image(path: &Path) -> Result<(SourceFile, DynamicImage)> {
    let bytes = std::fs::read(path)?;
    let name = path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().into_owned(),
    );
    let image = decode_image(&name, &bytes)?;
    debug!(file = %name, bytes = bytes.len(), "decoded image");
    Ok((SourceFile::new(name, bytes.len() as u64), image))
}

/// Expand `inputs` into image files: files are kept as given, directories
/// contribute their supported images in name order.
///
/// # Errors
///
/// Returns [`Error::Io`] if a directory cannot be read.
pub fn collect_inputs<P: AsRef<Path>>(inputs: &[P]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(input.to_path_buf());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
        assert!(is_supported_image(Path::new("anim.gif")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("clip.mp4")));
        assert!(!is_supported_image(Path::new("photo.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }

    #[test]
    fn decode_failure_names_the_file() {
        let err = decode_image("broken.png", b"not an image").unwrap_err();
        assert!(err.to_string().contains("broken.png"));
    }

    #[test]
    fn directories_expand_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let single = dir.path().join("notes.txt");
        let files = collect_inputs(&[dir.path().to_path_buf(), single.clone()]).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.jpg"), dir.path().join("b.png"), single]
        );
    }

    #[test]
    fn open_image_reports_size_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([9, 9, 9, 255]))
            .save(&path)
            .unwrap();
        let (file, img) = open_image(&path).unwrap();
        assert_eq!(file.name, "tiny.png");
        assert_eq!(file.size, std::fs::metadata(&path).unwrap().len());
        assert_eq!((img.width(), img.height()), (3, 2));
    }
}
