use std::sync::{Arc, Weak};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Rendered size of an element, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("playback was blocked by the autoplay policy")]
    NotAllowed,

    #[error("the media element is not attached to a document")]
    Detached,

    #[error("playback failed: {0}")]
    Other(String),
}

/// A playable element owned by the host document.
///
/// Implementations use interior mutability; the engine only ever holds shared
/// or weak references.
pub trait MediaElement: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn has_native_controls(&self) -> bool;

    fn volume(&self) -> f64;

    fn set_volume(&self, volume: f64);

    fn is_paused(&self) -> bool;

    fn play(&self) -> Result<(), PlaybackError>;

    fn pause(&self) -> Result<(), PlaybackError>;

    /// Whether the element is still part of the live document.
    fn is_connected(&self) -> bool;

    fn bounding_rect(&self) -> Rect;

    /// Human readable name, used only for logging.
    fn label(&self) -> String {
        format!("{:?}", self.kind()).to_lowercase()
    }
}

pub type ElementRef = Arc<dyn MediaElement>;
pub type WeakElementRef = Weak<dyn MediaElement>;

/// Identity of a media element, derived from its allocation address.
///
/// Only meaningful while someone holds a strong or weak reference to the
/// element, which keeps the allocation (and therefore the address) reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey(usize);

impl ElementKey {
    pub fn of(element: &dyn MediaElement) -> Self {
        Self(element as *const dyn MediaElement as *const () as usize)
    }

    pub fn of_ref(element: &ElementRef) -> Self {
        Self(Arc::as_ptr(element) as *const () as usize)
    }

    pub fn of_weak(element: &WeakElementRef) -> Self {
        Self(Weak::as_ptr(element) as *const () as usize)
    }
}

/// Which media elements get a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaSelector {
    pub include_video: bool,
    pub require_native_controls: bool,
}

impl MediaSelector {
    pub fn matches(&self, element: &dyn MediaElement) -> bool {
        let kind_ok = match element.kind() {
            MediaKind::Audio => true,
            MediaKind::Video => self.include_video,
        };
        kind_ok && (!self.require_native_controls || element.has_native_controls())
    }
}
