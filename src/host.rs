use tokio::sync::mpsc;

use crate::{
    controls::{ButtonLayout, ControlId, ControlSpec},
    media::{ElementKey, ElementRef},
};

/// What kind of user activity made an element the "last active" one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Play,
    Click,
    VolumeChange,
}

/// Summary of one delivered batch of tree mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationBatch {
    pub added_nodes: usize,
    pub removed_nodes: usize,
}

impl MutationBatch {
    pub fn touches_tree(&self) -> bool {
        self.added_nodes > 0 || self.removed_nodes > 0
    }
}

/// Callbacks from the host, delivered to the engine in arrival order.
#[derive(Debug, Clone)]
pub enum HostEvent {
    Mutations(MutationBatch),
    Activity(ElementKey, Activity),
    ControlClicked(ControlId),
}

pub type HostEventSender = mpsc::UnboundedSender<HostEvent>;
pub type HostEventReceiver = mpsc::UnboundedReceiver<HostEvent>;

/// The document the controls live in.
///
/// Subscriptions are tied to the sender: once the engine drops its receiver
/// the host must stop delivering to it.
pub trait Document {
    /// All media elements currently in the document, in document order.
    fn media_elements(&self) -> Vec<ElementRef>;

    /// Start delivering mutation batches for the whole body subtree.
    fn observe(&self, events: HostEventSender);

    /// Bind `play`, click and `volumechange` listeners on `media`.
    fn track_activity(&self, media: &ElementRef, events: HostEventSender);

    /// Append a control to the parent of `media` and mark the parent as a
    /// positioning host. Clicks on the control must not propagate to the media
    /// element. Returns `None` when `media` has no parent.
    fn attach_control(
        &self,
        media: &ElementRef,
        spec: &ControlSpec,
        events: HostEventSender,
    ) -> Option<ControlId>;

    fn set_control_layout(&self, control: ControlId, layout: ButtonLayout);

    fn position_control(&self, control: ControlId, right_px: f64);

    fn remove_control(&self, control: ControlId);

    /// Remove every control this plugin ever attached.
    fn remove_all_controls(&self);
}
