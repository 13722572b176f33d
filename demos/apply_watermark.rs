//! Watermark a single image with text.
//!
//! Usage:
//! ```sh
//! cargo run --example apply_watermark -- input.jpg output.png "© Studio"
//! ```

use std::env;
use std::path::Path;
use std::process;

use imagemark::{open_image, save_image, BrightnessAnalyzer, Renderer, WatermarkSpec};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input> <output> [text]", args[0]);
        process::exit(1);
    }

    let text = args.get(3).map_or("Sample", String::as_str);
    let (file, img) = open_image(Path::new(&args[1])).expect("failed to open input");

    let mode = BrightnessAnalyzer::default().analyze(&img);
    let spec = WatermarkSpec::default()
        .with_text(text)
        .with_color_mode(mode)
        .with_opacity(35.0);

    let renderer = Renderer::with_default_fonts().expect("failed to load embedded font");
    let out = renderer
        .render(&img.to_rgba8(), &spec, None)
        .expect("failed to render");

    match save_image(&out, Path::new(&args[2])) {
        Ok(()) => println!("Done: {} ({mode:?} fill)", file.name),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
