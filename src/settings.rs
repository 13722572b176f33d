//! Global settings and per-image overrides.
//!
//! Every image either inherits the global spec or carries its own override.
//! An override equal to the global spec is never stored: it collapses back to
//! [`EntitySettings::Inherited`] so later global edits keep reaching that image.

use crate::spec::WatermarkSpec;

/// Which spec an image renders with.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EntitySettings {
    /// Use the global spec.
    #[default]
    Inherited,
    /// Use this spec instead of the global one.
    Overridden(WatermarkSpec),
}

impl EntitySettings {
    /// Settings for `spec` relative to `global`: inherited when the two are
    /// structurally equal after sanitizing, overridden otherwise.
    #[must_use]
    pub fn resolve(spec: WatermarkSpec, global: &WatermarkSpec) -> Self {
        let spec = spec.sanitized();
        if spec == *global {
            Self::Inherited
        } else {
            Self::Overridden(spec)
        }
    }

    /// The spec actually used for rendering.
    #[must_use]
    pub fn effective<'a>(&'a self, global: &'a WatermarkSpec) -> &'a WatermarkSpec {
        match self {
            Self::Inherited => global,
            Self::Overridden(spec) => spec,
        }
    }

    /// The override, if any.
    #[must_use]
    pub fn override_spec(&self) -> Option<&WatermarkSpec> {
        match self {
            Self::Inherited => None,
            Self::Overridden(spec) => Some(spec),
        }
    }

    /// Whether an override is stored.
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        matches!(self, Self::Overridden(_))
    }
}

/// The spec shared by all images without an override.
///
/// Values are immutable: edits produce a new state with a higher revision,
/// which makes "did the global spec change" a single comparison.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlobalWatermarkState {
    spec: WatermarkSpec,
    revision: u64,
}

impl GlobalWatermarkState {
    /// Initial state holding `spec`.
    #[must_use]
    pub fn new(spec: WatermarkSpec) -> Self {
        Self {
            spec: spec.sanitized(),
            revision: 0,
        }
    }

    /// The current spec.
    #[must_use]
    pub fn spec(&self) -> &WatermarkSpec {
        &self.spec
    }

    /// Number of edits applied since creation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// A new state holding `spec`.
    #[must_use]
    pub fn with_spec(&self, spec: WatermarkSpec) -> Self {
        Self {
            spec: spec.sanitized(),
            revision: self.revision + 1,
        }
    }

    /// A new state with `edit` applied to a copy of the current spec.
    #[must_use]
    pub fn update(&self, edit: impl FnOnce(WatermarkSpec) -> WatermarkSpec) -> Self {
        self.with_spec(edit(self.spec.clone()))
    }
}
