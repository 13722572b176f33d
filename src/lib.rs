//! Apply text or logo watermarks to batches of raster images.
//!
//! A [`WatermarkSpec`] describes one watermark: text or logo, size, color,
//! opacity, rotation and position, all relative to the target image so the
//! same spec looks alike on images of any resolution. The [`Renderer`]
//! composites a spec onto a source image and always returns a fresh raster.
//!
//! # Quick Start
//!
//! ```no_run
//! use imagemark::{Renderer, WatermarkSpec};
//!
//! let renderer = Renderer::with_default_fonts().expect("embedded font");
//! let img = image::open("photo.jpg").unwrap().to_rgba8();
//! let spec = WatermarkSpec::default().with_text("© Studio").with_opacity(40.0);
//! let out = renderer.render(&img, &spec, None).unwrap();
//! out.save("watermarked-photo.png").unwrap();
//! ```
//!
//! # Batches
//!
//! A [`Workspace`] holds a working set of images sharing a global spec, with
//! optional per-image overrides. Global edits are debounced; the first image
//! of each ingested batch picks a light or dark fill from its brightness.
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Instant;
//! use imagemark::{export_batch, open_image, DirectorySink, Workspace};
//!
//! let mut ws = Workspace::with_defaults().unwrap();
//! let (file, img) = open_image(Path::new("photo.jpg")).unwrap();
//! ws.ingest(file, &img);
//! ws.edit_global(|s| s.with_rotation(0.0), Instant::now());
//! ws.refresh_now();
//! let mut sink = DirectorySink::new("out").unwrap();
//! let report = export_batch(ws.entities(), &mut sink);
//! println!("exported {} file(s)", report.exported.len());
//! ```

#![deny(missing_docs)]

pub mod batch;
pub mod blending;
pub mod brightness;
pub mod error;
pub mod export;
pub mod geometry;
pub mod ingest;
pub mod render;
pub mod scheduler;
pub mod settings;
pub mod spec;
pub mod text;

pub use batch::{
    refresh, EntityId, ImageEntity, RefreshSummary, SourceFile, Workspace, WorkspaceOptions,
};
pub use brightness::BrightnessAnalyzer;
pub use error::{Error, Result};
pub use export::{
    encode_png, export_batch, output_file_name, save_image, BatchExportReport, DirectorySink,
    ExportFailure, ExportSink, ExportedFile, MemorySink,
};
pub use geometry::Geometry;
pub use ingest::{collect_inputs, decode_image, is_supported_image, open_image};
pub use render::{Logo, Renderer};
pub use scheduler::RefreshScheduler;
pub use settings::{EntitySettings, GlobalWatermarkState};
pub use spec::{Color, ColorMode, PositionPreset, WatermarkKind, WatermarkSpec, POSITION_PRESETS};
pub use text::FontBook;
