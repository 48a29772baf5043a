use serde::{Deserialize, Serialize};

use crate::{id_type, media::Rect};

id_type!(ControlId);

pub const CONTROL_LABEL: &str = "Fade";

const COMPACT_MAX_WIDTH: f64 = 240.0;
const COMPACT_MAX_HEIGHT: f64 = 40.0;
const BASE_RIGHT_PAD_PX: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonLayout {
    /// Icon followed by a text label.
    #[default]
    Pill,
    Icon,
}

impl ButtonLayout {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pill" => Some(Self::Pill),
            "icon" => Some(Self::Icon),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pill => "pill",
            Self::Icon => "icon",
        }
    }

    pub fn shows_label(self) -> bool {
        matches!(self, Self::Pill)
    }
}

/// Everything the host needs to render a freshly attached control.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    pub title: &'static str,
    pub layout: ButtonLayout,
    pub compact: bool,
}

impl ControlSpec {
    pub fn for_media(layout: ButtonLayout, rect: Rect) -> Self {
        Self {
            title: CONTROL_LABEL,
            layout,
            compact: is_compact(rect),
        }
    }

    pub fn label(&self) -> Option<&'static str> {
        self.layout.shows_label().then_some(CONTROL_LABEL)
    }
}

pub fn is_compact(rect: Rect) -> bool {
    rect.width < COMPACT_MAX_WIDTH || rect.height < COMPACT_MAX_HEIGHT
}

/// Distance of the control from the right edge of its host.
pub fn right_offset_px(extra_left_offset_px: f64) -> f64 {
    let extra = if extra_left_offset_px.is_finite() {
        extra_left_offset_px
    } else {
        0.0
    };
    BASE_RIGHT_PAD_PX + extra
}
