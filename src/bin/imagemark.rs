use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use imagemark::{
    collect_inputs, export_batch, open_image, Color, ColorMode, DirectorySink, EntityId,
    ImageEntity, Logo, PositionPreset, Renderer, WatermarkKind, WatermarkSpec, Workspace,
    WorkspaceOptions,
};

#[derive(Parser)]
#[command(
    name = "imagemark",
    about = "Apply a text or logo watermark to a batch of images",
    version,
    after_help = "Simple usage: imagemark <images or dirs> -o <out_dir> --text \"© Studio\"\n\n\
                  Outputs are always PNG, named watermarked-{name}.png.\n\
                  Without --color-mode or --color the fill follows the first image's brightness."
)]
struct Cli {
    /// Input image files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    /// Base settings as a JSON file (flags below override its fields)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Watermark text
    #[arg(long, conflicts_with = "logo")]
    text: Option<String>,

    /// Use this image as a logo watermark
    #[arg(long)]
    logo: Option<PathBuf>,

    /// CSS-like font family list, e.g. "Inter, sans-serif"
    #[arg(long)]
    font_family: Option<String>,

    /// Register a font file under a family name (NAME=PATH, repeatable)
    #[arg(long = "font", value_name = "NAME=PATH", value_parser = parse_key_val)]
    fonts: Vec<(String, String)>,

    /// Font size in percent of the image width (5-30)
    #[arg(long)]
    font_size: Option<f32>,

    /// Fill color mode
    #[arg(long, value_enum)]
    color_mode: Option<ModeArg>,

    /// Custom fill color (#RGB or #RRGGBB), implies --color-mode custom
    #[arg(long, value_parser = Color::from_hex)]
    color: Option<Color>,

    /// Opacity in percent (1-100)
    #[arg(long)]
    opacity: Option<f32>,

    /// Rotation in degrees (-180 to 180)
    #[arg(long, allow_negative_numbers = true)]
    rotation: Option<f32>,

    /// Horizontal anchor in percent of the width
    #[arg(long, requires = "y", conflicts_with = "preset")]
    x: Option<f32>,

    /// Vertical anchor in percent of the height
    #[arg(long, requires = "x")]
    y: Option<f32>,

    /// Named position (top-left, top-center, ..., bottom-right)
    #[arg(long, value_parser = parse_preset)]
    preset: Option<&'static PositionPreset>,

    /// Logo width in percent of the image width (5-50)
    #[arg(long)]
    logo_size: Option<f32>,

    /// Per-image settings as FILE_NAME=JSON (repeatable)
    #[arg(long = "override", value_name = "FILE_NAME=JSON", value_parser = parse_key_val)]
    overrides: Vec<(String, String)>,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Light,
    Dark,
    Custom,
}

impl From<ModeArg> for ColorMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Light => ColorMode::Light,
            ModeArg::Dark => ColorMode::Dark,
            ModeArg::Custom => ColorMode::Custom,
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}

fn parse_preset(s: &str) -> Result<&'static PositionPreset, String> {
    PositionPreset::find(s).ok_or_else(|| format!("unknown position preset {s:?}"))
}

impl Cli {
    /// The starting spec, and whether its color mode was chosen explicitly
    /// (by flag or by a `fontMode` entry in the settings file).
    fn base_spec(&self) -> Result<(WatermarkSpec, bool), String> {
        let mut color_pinned = self.color_mode.is_some() || self.color.is_some();
        let mut spec = match &self.settings {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
                color_pinned |= names_color_mode(&json);
                WatermarkSpec::from_json(&json)
                    .map_err(|e| format!("{}: {e}", path.display()))?
            }
            None => WatermarkSpec::default(),
        };

        if let Some(text) = &self.text {
            spec = spec.with_kind(WatermarkKind::Text).with_text(text.clone());
        }
        if self.logo.is_some() {
            spec = spec.with_kind(WatermarkKind::Logo);
        }
        if let Some(family) = &self.font_family {
            spec = spec.with_font_family(family.clone());
        }
        if let Some(pct) = self.font_size {
            spec = spec.with_font_size(pct);
        }
        if let Some(mode) = self.color_mode {
            spec = spec.with_color_mode(mode.into());
        }
        if let Some(color) = self.color {
            spec = spec.with_custom_color(color);
        }
        if let Some(pct) = self.opacity {
            spec = spec.with_opacity(pct);
        }
        if let Some(deg) = self.rotation {
            spec = spec.with_rotation(deg);
        }
        if let (Some(x), Some(y)) = (self.x, self.y) {
            spec = spec.with_position(x, y);
        }
        if let Some(preset) = self.preset {
            spec = spec.with_preset(preset);
        }
        if let Some(pct) = self.logo_size {
            spec = spec.with_logo_size(pct);
        }
        Ok((spec, color_pinned))
    }
}

fn names_color_mode(json: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(json)
        .is_ok_and(|v| v.get("fontMode").is_some())
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let (spec, color_pinned) = cli.base_spec().unwrap_or_else(|e| fail(&e));

    let renderer = Renderer::with_default_fonts()
        .unwrap_or_else(|e| fail(&format!("Failed to initialize renderer: {e}")));
    let mut ws = Workspace::new(
        renderer,
        WorkspaceOptions {
            initial_spec: spec,
            analyze_brightness: !color_pinned,
            ..WorkspaceOptions::default()
        },
    );
    for (family, path) in &cli.fonts {
        if let Err(e) = ws
            .renderer_mut()
            .fonts_mut()
            .register_file(family, Path::new(path))
        {
            fail(&format!("Font {family}: {e}"));
        }
    }
    if let Some(path) = &cli.logo {
        let bytes = std::fs::read(path)
            .unwrap_or_else(|e| fail(&format!("Failed to read {}: {e}", path.display())));
        let logo = Logo::decode(&path.display().to_string(), &bytes)
            .unwrap_or_else(|e| fail(&e.to_string()));
        ws.set_logo(logo);
    }

    let files = collect_inputs(&cli.inputs).unwrap_or_else(|e| fail(&e.to_string()));
    if files.is_empty() {
        fail("No supported images found");
    }

    let mut decode_failures = 0usize;
    let mut decoded = Vec::new();
    for path in &files {
        match open_image(path) {
            Ok(pair) => decoded.push(pair),
            Err(e) => {
                decode_failures += 1;
                eprintln!("[FAIL] {}: {e}", path.display());
            }
        }
    }

    ws.ingest_all(decoded.iter().map(|(file, img)| (file.clone(), img)));

    apply_overrides(&mut ws, &cli.overrides);

    let mut sink = DirectorySink::new(&cli.output).unwrap_or_else(|e| {
        fail(&format!(
            "Failed to create output directory {}: {e}",
            cli.output.display()
        ))
    });
    let report = export_batch(ws.entities(), &mut sink);

    if !cli.quiet {
        for file in &report.exported {
            let source = source_name(ws.entities(), file.id);
            eprintln!("[OK] {source} -> {}", file.name);
        }
        for id in &report.skipped {
            eprintln!("[SKIP] {}: not rendered", source_name(ws.entities(), *id));
        }
    }
    for failure in &report.failed {
        eprintln!(
            "[FAIL] {}: {}",
            source_name(ws.entities(), failure.id),
            failure.error
        );
    }

    let fail_count = decode_failures + report.failed.len();
    if files.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Exported: {}", report.exported.len());
        if !report.skipped.is_empty() {
            eprint!(", Skipped: {}", report.skipped.len());
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", files.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn apply_overrides(ws: &mut Workspace, overrides: &[(String, String)]) {
    for (file_name, json) in overrides {
        let spec = WatermarkSpec::from_json(json)
            .unwrap_or_else(|e| fail(&format!("Override for {file_name}: {e}")));
        let ids: Vec<_> = ws
            .entities()
            .iter()
            .filter(|e| e.file().name == *file_name)
            .map(ImageEntity::id)
            .collect();
        if ids.is_empty() {
            eprintln!("[SKIP] override for {file_name}: no such input");
        }
        for id in ids {
            if let Err(e) = ws.set_override(id, spec.clone()) {
                fail(&e.to_string());
            }
        }
    }
}

fn source_name(entities: &[ImageEntity], id: EntityId) -> String {
    entities
        .iter()
        .find(|e| e.id() == id)
        .map_or_else(|| id.to_string(), |e| e.file().name.clone())
}
