//! Reference images and action sequences
//!
//! Templates are decoded once at startup from an asset table of the form
//! `sequence name -> action name -> base64 image`. Actions inside a sequence run
//! in lexicographic order of their names.

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GrayImage, RgbImage};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::{EngineError, Result};

/// Asset table: sequence name -> action name -> base64 encoded image
pub type AssetTable = BTreeMap<String, BTreeMap<String, String>>;

/// Identity of a template's pixel content
///
/// Two templates with identical pixels share an id, and therefore share a
/// scale cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(u64);

impl TemplateId {
    fn of(image: &RgbImage) -> Self {
        let mut hasher = DefaultHasher::new();
        image.dimensions().hash(&mut hasher);
        image.as_raw().hash(&mut hasher);
        TemplateId(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A decoded reference image
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    image: RgbImage,
    gray: GrayImage,
    id: TemplateId,
}

impl Template {
    /// Build a template from RGB pixels
    pub fn new(name: impl Into<String>, image: RgbImage) -> Self {
        let gray = image::imageops::grayscale(&image);
        let id = TemplateId::of(&image);
        Self {
            name: name.into(),
            image,
            gray,
            id,
        }
    }

    /// Build a template from any decoded image (alpha is dropped)
    pub fn from_dynamic(name: impl Into<String>, image: DynamicImage) -> Self {
        Self::new(name, image.to_rgb8())
    }

    /// Decode a base64 encoded image
    pub fn from_base64(sequence: &str, action: &str, data: &str) -> Result<Self> {
        let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|source| EngineError::InvalidBase64 {
                sequence: sequence.to_string(),
                action: action.to_string(),
                source,
            })?;
        let image = image::load_from_memory(&bytes).map_err(|source| EngineError::Decode {
            sequence: sequence.to_string(),
            action: action.to_string(),
            source,
        })?;
        Ok(Self::from_dynamic(action, image))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> TemplateId {
        self.id
    }

    /// RGB pixels
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Luma pixels, computed at load time
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Intrinsic size (width, height)
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// An ordered list of templates clicked through one after another
#[derive(Debug, Clone)]
pub struct ActionSequence {
    name: String,
    templates: Vec<Template>,
}

impl ActionSequence {
    /// Create a sequence; templates run in the given order
    pub fn new(name: impl Into<String>, templates: Vec<Template>) -> Self {
        Self {
            name: name.into(),
            templates,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Action names, index-aligned with `templates()`
    pub fn action_names(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.name()).collect()
    }

    pub fn action_count(&self) -> usize {
        self.templates.len()
    }

    /// The template that gates selection of this sequence
    pub fn first(&self) -> Option<&Template> {
        self.templates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// All sequences loaded from the asset table
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    sequences: Vec<ActionSequence>,
}

impl TemplateStore {
    /// Decode every image in the table
    ///
    /// Any undecodable image fails the whole load: it means the bundled assets
    /// are corrupt. Sequences without actions are skipped.
    pub fn from_assets(assets: &AssetTable) -> Result<Self> {
        let mut sequences = Vec::with_capacity(assets.len());

        for (sequence_name, actions) in assets {
            let templates = actions
                .iter()
                .map(|(action, data)| Template::from_base64(sequence_name, action, data))
                .collect::<Result<Vec<_>>>()?;

            if templates.is_empty() {
                log::warn!("Sequence '{}' has no actions, skipping", sequence_name);
                continue;
            }

            log::debug!(
                "Loaded sequence '{}' with {} action(s)",
                sequence_name,
                templates.len()
            );
            sequences.push(ActionSequence::new(sequence_name.clone(), templates));
        }

        log::info!("Loaded {} sequence(s)", sequences.len());
        Ok(Self { sequences })
    }

    /// Parse an asset table from JSON and decode it
    pub fn from_json(json: &str) -> Result<Self> {
        let assets: AssetTable = serde_json::from_str(json)?;
        Self::from_assets(&assets)
    }

    /// Load an asset table JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn sequences(&self) -> &[ActionSequence] {
        &self.sequences
    }

    pub fn into_sequences(self) -> Vec<ActionSequence> {
        self.sequences
    }

    /// Look up a sequence by name
    pub fn get(&self, name: &str) -> Option<&ActionSequence> {
        self.sequences.iter().find(|s| s.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sequences.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
