//! Image entities and the batch orchestrator.
//!
//! A [`Workspace`] owns the working set of images, the global spec, the loaded
//! logo and the renderer. Every change to what an image should look like is
//! followed by a render pass, either immediately (ingestion, per-image saves,
//! logo changes, resets) or after a debounce delay (global edits).
//!
//! Each entity exclusively owns its source and its output. A render pass
//! replaces an entity's output with a freshly rendered raster; a failed render
//! degrades that entity to its unwatermarked source without affecting the rest
//! of the batch.

use std::fmt;
use std::time::{Duration, Instant};

use image::{DynamicImage, RgbaImage};
use tracing::{debug, info, warn};

use crate::brightness::{BrightnessAnalyzer, DEFAULT_SURFACE_SIZE};
use crate::error::{Error, Result};
use crate::render::{Logo, Renderer};
use crate::scheduler::{RefreshScheduler, DEFAULT_DEBOUNCE};
use crate::settings::{EntitySettings, GlobalWatermarkState};
use crate::spec::{ColorMode, WatermarkSpec};

/// Identifier of an image in a workspace, unique for the workspace's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata of the uploaded file an image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Original file name.
    pub name: String,
    /// Size of the original file in bytes.
    pub size: u64,
}

impl SourceFile {
    /// Metadata for a file called `name` of `size` bytes.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// One image in the working set.
#[derive(Clone)]
pub struct ImageEntity {
    id: EntityId,
    file: SourceFile,
    source: RgbaImage,
    settings: EntitySettings,
    output: Option<RgbaImage>,
}

impl fmt::Debug for ImageEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageEntity")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("dimensions", &self.source.dimensions())
            .field("settings", &self.settings)
            .field("rendered", &self.output.is_some())
            .finish()
    }
}

impl ImageEntity {
    /// A new entity with no override and no output yet.
    #[must_use]
    pub fn new(id: EntityId, file: SourceFile, source: RgbaImage) -> Self {
        Self {
            id,
            file,
            source,
            settings: EntitySettings::Inherited,
            output: None,
        }
    }

    /// The entity's id.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The uploaded file's metadata.
    #[must_use]
    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    /// The decoded source image.
    #[must_use]
    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    /// Inherited or overridden settings.
    #[must_use]
    pub fn settings(&self) -> &EntitySettings {
        &self.settings
    }

    /// The last rendered output, if a pass has run since ingestion.
    #[must_use]
    pub fn output(&self) -> Option<&RgbaImage> {
        self.output.as_ref()
    }

    /// What to show for this entity: the output, or the source until the
    /// first pass has run.
    #[must_use]
    pub fn display_image(&self) -> &RgbaImage {
        self.output.as_ref().unwrap_or(&self.source)
    }

    /// The spec this entity renders with.
    #[must_use]
    pub fn effective_spec<'a>(&'a self, global: &'a WatermarkSpec) -> &'a WatermarkSpec {
        self.settings.effective(global)
    }

    /// Store `spec` as this entity's override, or drop the override when
    /// `spec` equals `global`. Returns whether an override is now stored.
    pub fn set_override(&mut self, spec: WatermarkSpec, global: &WatermarkSpec) -> bool {
        self.settings = EntitySettings::resolve(spec, global);
        self.settings.is_overridden()
    }

    /// Go back to inheriting the global spec.
    pub fn clear_override(&mut self) {
        self.settings = EntitySettings::Inherited;
    }
}

/// Outcome of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshSummary {
    /// Entities rendered with their watermark.
    pub rendered: usize,
    /// Entities whose render failed and fell back to their source.
    pub degraded: usize,
}

/// Render one entity with its effective spec. Returns `false` when the render
/// failed and the entity fell back to its unwatermarked source.
pub fn render_entity(
    entity: &mut ImageEntity,
    global: &WatermarkSpec,
    logo: Option<&Logo>,
    renderer: &Renderer,
) -> bool {
    let spec = entity.settings.effective(global);
    match renderer.render(&entity.source, spec, logo) {
        Ok(output) => {
            entity.output = Some(output);
            true
        }
        Err(e) => {
            warn!(id = %entity.id, file = %entity.file.name, error = %e, "render failed, using base image");
            entity.output = Some(entity.source.clone());
            false
        }
    }
}

/// Re-render every entity, one after another.
pub fn refresh(
    entities: &mut [ImageEntity],
    global: &WatermarkSpec,
    logo: Option<&Logo>,
    renderer: &Renderer,
) -> RefreshSummary {
    let mut summary = RefreshSummary::default();
    for entity in entities.iter_mut() {
        if render_entity(entity, global, logo, renderer) {
            summary.rendered += 1;
        } else {
            summary.degraded += 1;
        }
    }
    summary
}

/// Tunables for a [`Workspace`].
#[derive(Debug, Clone)]
pub struct WorkspaceOptions {
    /// Delay between the last global edit and the refresh it triggers.
    pub debounce: Duration,
    /// Edge length of the brightness analysis surface.
    pub analysis_surface: u32,
    /// Global spec to start from.
    pub initial_spec: WatermarkSpec,
    /// Seed the global color mode from the first ingested image. Turn off
    /// when the initial spec's color mode was chosen explicitly.
    pub analyze_brightness: bool,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            analysis_surface: DEFAULT_SURFACE_SIZE,
            initial_spec: WatermarkSpec::default(),
            analyze_brightness: true,
        }
    }
}

/// The working set of images and the state they are rendered from.
#[derive(Debug)]
pub struct Workspace {
    renderer: Renderer,
    analyzer: BrightnessAnalyzer,
    scheduler: RefreshScheduler,
    initial_spec: WatermarkSpec,
    analyze_brightness: bool,
    global: GlobalWatermarkState,
    logo: Option<Logo>,
    entities: Vec<ImageEntity>,
    next_id: u64,
}

impl Workspace {
    /// An empty workspace.
    #[must_use]
    pub fn new(renderer: Renderer, options: WorkspaceOptions) -> Self {
        Self {
            renderer,
            analyzer: BrightnessAnalyzer::new(options.analysis_surface),
            scheduler: RefreshScheduler::new(options.debounce),
            global: GlobalWatermarkState::new(options.initial_spec.clone()),
            initial_spec: options.initial_spec,
            analyze_brightness: options.analyze_brightness,
            logo: None,
            entities: Vec::new(),
            next_id: 1,
        }
    }

    /// An empty workspace with the embedded font and default options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FontLoad`] if the embedded font cannot be parsed.
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(
            Renderer::with_default_fonts()?,
            WorkspaceOptions::default(),
        ))
    }

    /// The renderer.
    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Mutable renderer access, e.g. to register fonts. Call
    /// [`Workspace::refresh_now`] afterwards to apply the change.
    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    /// The global state.
    #[must_use]
    pub fn global(&self) -> &GlobalWatermarkState {
        &self.global
    }

    /// The global spec.
    #[must_use]
    pub fn global_spec(&self) -> &WatermarkSpec {
        self.global.spec()
    }

    /// All entities, in ingestion order.
    #[must_use]
    pub fn entities(&self) -> &[ImageEntity] {
        &self.entities
    }

    /// Look up an entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&ImageEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the working set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The loaded logo.
    #[must_use]
    pub fn logo(&self) -> Option<&Logo> {
        self.logo.as_ref()
    }

    /// Add one decoded image. See [`Workspace::ingest_all`].
    pub fn ingest(&mut self, file: SourceFile, image: &DynamicImage) -> EntityId {
        self.ingest_all(std::iter::once((file, image)))[0]
    }

    /// Add a batch of decoded images and render the whole working set.
    ///
    /// The first image of the batch seeds the global color mode from its
    /// brightness, unless the global spec already uses a custom color or
    /// [`WorkspaceOptions::analyze_brightness`] is off.
    pub fn ingest_all<'a, I>(&mut self, images: I) -> Vec<EntityId>
    where
        I: IntoIterator<Item = (SourceFile, &'a DynamicImage)>,
    {
        let mut ids = Vec::new();
        for (file, image) in images {
            if ids.is_empty()
                && self.analyze_brightness
                && self.global.spec().color_mode != ColorMode::Custom
            {
                let mode = self.analyzer.analyze(image);
                if mode != self.global.spec().color_mode {
                    self.global = self.global.update(|s| s.with_color_mode(mode));
                }
            }
            let id = EntityId::new(self.next_id);
            self.next_id += 1;
            debug!(%id, file = %file.name, width = image.width(), height = image.height(), "ingested image");
            self.entities
                .push(ImageEntity::new(id, file, image.to_rgba8()));
            ids.push(id);
        }
        if !ids.is_empty() {
            self.refresh_now();
        }
        ids
    }

    /// Remove an entity from the working set, returning it.
    pub fn remove(&mut self, id: EntityId) -> Option<ImageEntity> {
        let index = self.entities.iter().position(|e| e.id == id)?;
        Some(self.entities.remove(index))
    }

    /// Edit the global spec and schedule a debounced refresh from `now`.
    pub fn edit_global(&mut self, edit: impl FnOnce(WatermarkSpec) -> WatermarkSpec, now: Instant) {
        self.global = self.global.update(edit);
        self.scheduler.schedule(now);
    }

    /// Replace the global spec and refresh immediately.
    pub fn set_global(&mut self, spec: WatermarkSpec) -> RefreshSummary {
        self.global = self.global.with_spec(spec);
        self.refresh_now()
    }

    /// Restore the initial global spec and refresh immediately.
    pub fn reset_global(&mut self) -> RefreshSummary {
        self.set_global(self.initial_spec.clone())
    }

    /// Save per-image settings for `id` and re-render that image immediately.
    /// Settings equal to the global spec clear the override instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntity`] if no such entity exists.
    pub fn set_override(&mut self, id: EntityId, spec: WatermarkSpec) -> Result<bool> {
        let global = self.global.spec();
        let entity = self
            .entities
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(Error::UnknownEntity(id))?;
        let stored = entity.set_override(spec, global);
        render_entity(entity, global, self.logo.as_ref(), &self.renderer);
        Ok(stored)
    }

    /// Make `id` inherit the global spec again and re-render it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEntity`] if no such entity exists.
    pub fn clear_override(&mut self, id: EntityId) -> Result<()> {
        let global = self.global.spec();
        let entity = self
            .entities
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(Error::UnknownEntity(id))?;
        entity.clear_override();
        render_entity(entity, global, self.logo.as_ref(), &self.renderer);
        Ok(())
    }

    /// Install a logo and refresh immediately.
    pub fn set_logo(&mut self, logo: Logo) -> RefreshSummary {
        self.logo = Some(logo);
        self.refresh_now()
    }

    /// Remove the logo and refresh immediately.
    pub fn clear_logo(&mut self) -> RefreshSummary {
        self.logo = None;
        self.refresh_now()
    }

    /// Whether a debounced refresh is waiting.
    #[must_use]
    pub fn has_pending_refresh(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Run the debounced refresh if it is due at `now`.
    pub fn tick(&mut self, now: Instant) -> Option<RefreshSummary> {
        if self.scheduler.take_due(now) {
            Some(self.run_pass())
        } else {
            None
        }
    }

    /// Render every entity now, superseding any pending debounced pass.
    pub fn refresh_now(&mut self) -> RefreshSummary {
        self.scheduler.cancel();
        self.run_pass()
    }

    fn run_pass(&mut self) -> RefreshSummary {
        let summary = refresh(
            &mut self.entities,
            self.global.spec(),
            self.logo.as_ref(),
            &self.renderer,
        );
        info!(
            revision = self.global.revision(),
            rendered = summary.rendered,
            degraded = summary.degraded,
            "render pass complete"
        );
        summary
    }
}
