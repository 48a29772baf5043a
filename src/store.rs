use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use crate::{
    controls::ControlId,
    fade::RampId,
    media::{ElementKey, ElementRef, MediaElement, WeakElementRef},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeState {
    pub faded: bool,
    pub last_volume: f64,
}

impl FadeState {
    /// State of an element that was never toggled.
    pub fn initial(element: &dyn MediaElement) -> Self {
        Self {
            faded: false,
            last_volume: audible_or_full(element.volume()),
        }
    }
}

/// A volume of zero (or garbage) would make the restore silent, so it reads
/// as full volume.
pub fn audible_or_full(volume: f64) -> f64 {
    if volume > 0.0 && volume.is_finite() {
        volume.min(1.0)
    } else {
        1.0
    }
}

/// How far the attachment layer got with an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attachment {
    #[default]
    Unseen,
    /// Activity listeners bound, but no control (the element had no parent).
    Tracked,
    Attached { control: ControlId, tracked: bool },
}

impl Attachment {
    pub fn control(self) -> Option<ControlId> {
        match self {
            Self::Attached { control, .. } => Some(control),
            Self::Unseen | Self::Tracked => None,
        }
    }

    pub fn is_tracked(self) -> bool {
        match self {
            Self::Unseen => false,
            Self::Tracked => true,
            Self::Attached { tracked, .. } => tracked,
        }
    }

    pub fn with_control(self, control: ControlId) -> Self {
        Self::Attached {
            control,
            tracked: self.is_tracked(),
        }
    }

    pub fn with_tracking(self) -> Self {
        match self {
            Self::Unseen | Self::Tracked => Self::Tracked,
            Self::Attached { control, .. } => Self::Attached {
                control,
                tracked: true,
            },
        }
    }
}

#[derive(Debug)]
pub struct ElementRecord {
    element: WeakElementRef,
    pub fade: Option<FadeState>,
    pub animating: Option<RampId>,
    pub attachment: Attachment,
}

impl ElementRecord {
    fn new(element: &ElementRef) -> Self {
        Self {
            element: Arc::downgrade(element),
            fade: None,
            animating: None,
            attachment: Attachment::default(),
        }
    }

    pub fn element(&self) -> Option<ElementRef> {
        self.element.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.element.strong_count() > 0
    }
}

/// Side table of per-element records keyed by element identity.
///
/// Records hold weak references only; an element dropped by the host simply
/// leaves a dead record behind until the next [`ElementStore::prune`].
#[derive(Debug, Default)]
pub struct ElementStore {
    records: HashMap<ElementKey, ElementRecord>,
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, element: &ElementRef) -> &mut ElementRecord {
        let key = ElementKey::of_ref(element);
        match self.records.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(ElementRecord::new(element)),
        }
    }

    pub fn get(&self, key: ElementKey) -> Option<&ElementRecord> {
        self.records.get(&key)
    }

    pub fn get_mut(&mut self, key: ElementKey) -> Option<&mut ElementRecord> {
        self.records.get_mut(&key)
    }

    pub fn element(&self, key: ElementKey) -> Option<ElementRef> {
        self.records.get(&key).and_then(ElementRecord::element)
    }

    /// Fade state of `element`, or the implied default if it was never toggled.
    pub fn fade_state(&self, element: &ElementRef) -> FadeState {
        self.records
            .get(&ElementKey::of_ref(element))
            .and_then(|record| record.fade)
            .unwrap_or_else(|| FadeState::initial(element.as_ref()))
    }

    pub fn is_animating(&self, key: ElementKey) -> bool {
        self.records
            .get(&key)
            .is_some_and(|record| record.animating.is_some())
    }

    pub fn find_by_control(&self, control: ControlId) -> Option<ElementKey> {
        self.records
            .iter()
            .find(|(_, record)| record.attachment.control() == Some(control))
            .map(|(key, _)| *key)
    }

    pub fn controls(&self) -> Vec<ControlId> {
        self.records
            .values()
            .filter_map(|record| record.attachment.control())
            .collect()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ElementRecord> {
        self.records.values_mut()
    }

    /// Drops records whose element is gone. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.is_alive());
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
