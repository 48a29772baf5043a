use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{controls::ButtonLayout, media::MediaSelector};

pub const DEFAULT_FADE_SECONDS: f64 = 2.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub fade_seconds: f64,
    pub apply_to_video: bool,
    /// Advisory only; recorded and persisted, no behaviour hangs off it yet.
    pub show_inline_if_overlay_fails: bool,
    pub universal_selector: bool,
    pub extra_left_offset_px: f64,
    pub button_layout: ButtonLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fade_seconds: DEFAULT_FADE_SECONDS,
            apply_to_video: false,
            show_inline_if_overlay_fails: true,
            universal_selector: true,
            extra_left_offset_px: 0.0,
            button_layout: ButtonLayout::Pill,
        }
    }
}

impl Settings {
    /// Merges persisted data over the defaults, coercing malformed values.
    ///
    /// Never fails: unknown keys are ignored, missing keys default, and
    /// values of the wrong shape are replaced by something usable.
    pub fn from_value(value: Option<Value>) -> Self {
        let mut settings = Self::default();
        let map = match value {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => return settings,
            Some(other) => {
                log::warn!("Ignoring persisted settings that are not an object: {other}");
                return settings;
            }
        };

        if let Some(raw) = map.get("fadeSeconds") {
            settings.fade_seconds = match to_number(raw) {
                Some(n) if n > 0.0 => n,
                _ => {
                    log::warn!("Invalid fadeSeconds {raw}; using {DEFAULT_FADE_SECONDS}");
                    DEFAULT_FADE_SECONDS
                }
            };
        }
        if let Some(raw) = map.get("extraLeftOffsetPx") {
            settings.extra_left_offset_px = to_number(raw).unwrap_or_else(|| {
                log::warn!("Invalid extraLeftOffsetPx {raw}; using 0");
                0.0
            });
        }
        if let Some(raw) = map.get("buttonLayout") {
            settings.button_layout = raw
                .as_str()
                .and_then(ButtonLayout::parse)
                .unwrap_or_else(|| {
                    log::warn!("Invalid buttonLayout {raw}; using pill");
                    ButtonLayout::Pill
                });
        }
        read_flag(&map, "applyToVideo", &mut settings.apply_to_video);
        read_flag(
            &map,
            "showInlineIfOverlayFails",
            &mut settings.show_inline_if_overlay_fails,
        );
        read_flag(&map, "universalSelector", &mut settings.universal_selector);

        settings
    }

    pub fn read(file: &mut impl Read) -> anyhow::Result<Self> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read settings file")?;

        let value: Value =
            serde_json::from_str(&contents).context("Failed to parse settings file")?;
        Ok(Self::from_value(Some(value)))
    }

    pub fn selector(&self) -> MediaSelector {
        MediaSelector {
            include_video: self.apply_to_video,
            require_native_controls: !self.universal_selector,
        }
    }
}

/// Lenient numeric coercion: numbers pass, numeric strings parse, booleans
/// count as 0/1, everything else is rejected.
fn to_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }?;
    n.is_finite().then_some(n)
}

fn read_flag(map: &Map<String, Value>, key: &str, target: &mut bool) {
    match map.get(key) {
        None => {}
        Some(Value::Bool(b)) => *target = *b,
        Some(raw) => log::warn!("Invalid {key} {raw}; keeping {target}"),
    }
}

/// Where settings live between sessions.
pub trait SettingsStore {
    /// The raw persisted object, or `None` if nothing was saved yet.
    fn load(&self) -> anyhow::Result<Option<Value>>;

    fn save(&self, settings: &Settings) -> anyhow::Result<()>;
}

impl<S: SettingsStore + ?Sized> SettingsStore for Arc<S> {
    fn load(&self) -> anyhow::Result<Option<Value>> {
        (**self).load()
    }

    fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        (**self).save(settings)
    }
}

/// Loads settings from `store`, falling back to defaults if the store fails.
pub fn load_settings(store: &dyn SettingsStore) -> Settings {
    match store.load() {
        Ok(raw) => Settings::from_value(raw),
        Err(err) => {
            log::warn!("Failed to load settings, using defaults: {err:?}");
            Settings::default()
        }
    }
}

/// JSON file next to the plugin, like the host's `data.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> anyhow::Result<Option<Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to read settings from {}", self.path.display())
                })
            }
        };
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", self.path.display()))?;
        Ok(Some(value))
    }

    fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let contents =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        log::info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

/// Settings store that never touches the disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: Value) -> Self {
        Self {
            saved: Mutex::new(Some(value)),
        }
    }

    pub fn saved(&self) -> Option<Value> {
        self.saved.lock().clone()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Option<Value>> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        *self.saved.lock() = Some(serde_json::to_value(settings)?);
        Ok(())
    }
}
