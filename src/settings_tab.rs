use crate::{config::Settings, controls::ButtonLayout, plugin::FadeStop};

/// One row of the settings form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    FadeSeconds,
    ButtonLayout,
    ApplyToVideo,
    UniversalSelector,
    ExtraLeftOffset,
    InlineFallback,
}

impl SettingField {
    pub const ALL: [SettingField; 6] = [
        Self::FadeSeconds,
        Self::ButtonLayout,
        Self::ApplyToVideo,
        Self::UniversalSelector,
        Self::ExtraLeftOffset,
        Self::InlineFallback,
    ];

    /// Key under which the value is persisted.
    pub fn key(self) -> &'static str {
        match self {
            Self::FadeSeconds => "fadeSeconds",
            Self::ButtonLayout => "buttonLayout",
            Self::ApplyToVideo => "applyToVideo",
            Self::UniversalSelector => "universalSelector",
            Self::ExtraLeftOffset => "extraLeftOffsetPx",
            Self::InlineFallback => "showInlineIfOverlayFails",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FadeSeconds => "Fade duration (seconds)",
            Self::ButtonLayout => "Button layout",
            Self::ApplyToVideo => "Also show on video elements",
            Self::UniversalSelector => "Universal selector (advanced)",
            Self::ExtraLeftOffset => "Button extra left offset (px)",
            Self::InlineFallback => "Fallback to inline button",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::FadeSeconds => "Supports decimals like 0.5, 1.2, etc.",
            Self::ButtonLayout => "Choose between Pill (icon + Fade) or Icon only",
            Self::ApplyToVideo => "Adds the Fade button to <video> players.",
            Self::UniversalSelector => {
                "Attach to any <audio>/<video>, even if 'controls' is missing (custom players)."
            }
            Self::ExtraLeftOffset => {
                "Default '0'. Recommended for 'Media Extended' or 'Second Window' plugin is '84'."
            }
            Self::InlineFallback => {
                "If overlay isn't visible, also places a small inline button next to the player."
            }
        }
    }

    pub fn current(self, settings: &Settings) -> String {
        match self {
            Self::FadeSeconds => settings.fade_seconds.to_string(),
            Self::ButtonLayout => settings.button_layout.as_str().to_string(),
            Self::ApplyToVideo => settings.apply_to_video.to_string(),
            Self::UniversalSelector => settings.universal_selector.to_string(),
            Self::ExtraLeftOffset => settings.extra_left_offset_px.to_string(),
            Self::InlineFallback => settings.show_inline_if_overlay_fails.to_string(),
        }
    }

    /// Returns the settings with this field changed to `raw`, or `None` when
    /// the input is unusable and the previous value should stay.
    pub fn apply(self, settings: &Settings, raw: &str) -> Option<Settings> {
        let raw = raw.trim();
        let mut next = settings.clone();
        match self {
            Self::FadeSeconds => {
                next.fade_seconds = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|n| *n > 0.0 && n.is_finite())?;
            }
            Self::ExtraLeftOffset => {
                next.extra_left_offset_px =
                    raw.parse::<f64>().ok().filter(|n| n.is_finite())?;
            }
            Self::ButtonLayout => {
                next.button_layout = ButtonLayout::parse(raw).unwrap_or_else(|| {
                    log::warn!("Unknown button layout {raw:?}; using pill");
                    ButtonLayout::Pill
                });
            }
            Self::ApplyToVideo => next.apply_to_video = parse_flag(raw)?,
            Self::UniversalSelector => next.universal_selector = parse_flag(raw)?,
            Self::InlineFallback => next.show_inline_if_overlay_fails = parse_flag(raw)?,
        }
        Some(next)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Applies a single form change with immediate save and re-render.
///
/// Returns whether the change was accepted.
pub fn change(plugin: &mut FadeStop, field: SettingField, raw: &str) -> bool {
    match field.apply(plugin.settings(), raw) {
        Some(settings) => {
            plugin.update_settings(settings);
            true
        }
        None => {
            log::warn!("Ignoring invalid value {raw:?} for {}", field.key());
            false
        }
    }
}
