//! Error types for the imagemark crate.

use crate::batch::EntityId;

/// Errors that can occur while ingesting, rendering, or exporting images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source or logo file could not be decoded as a raster image.
    #[error("failed to decode {name}: {source}")]
    Decode {
        /// Name of the file that failed to decode.
        name: String,
        /// Underlying decoder error.
        source: image::ImageError,
    },

    /// A rendered raster could not be encoded for export.
    #[error("failed to encode {name}: {source}")]
    Encode {
        /// Output name of the raster being encoded.
        name: String,
        /// Underlying encoder error.
        source: image::ImageError,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested output format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// A color string is not `#RGB` or `#RRGGBB`.
    #[error("invalid color {0:?}: expected #RGB or #RRGGBB")]
    InvalidColor(String),

    /// Font data could not be parsed.
    #[error("failed to load font: {0}")]
    FontLoad(String),

    /// Text rendering was requested but no font face is registered.
    #[error("no font registered for text rendering")]
    NoFont,

    /// No entity with the given id exists in the workspace.
    #[error("unknown image entity {0}")]
    UnknownEntity(EntityId),

    /// A settings payload could not be parsed.
    #[error("invalid watermark settings: {0}")]
    Settings(#[from] serde_json::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let color = Error::InvalidColor("#12".to_string());
        assert!(color.to_string().contains("\"#12\""));

        let unknown = Error::UnknownEntity(EntityId::new(7));
        assert!(unknown.to_string().contains('7'));
    }

    #[test]
    fn decode_error_names_the_file() {
        let source = image::ImageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "truncated",
        ));
        let err = Error::Decode {
            name: "holiday.png".to_string(),
            source,
        };
        let msg = err.to_string();
        assert!(msg.contains("holiday.png"));
        assert!(msg.contains("truncated"));
    }
}
