//! In-memory host: a flat document of containers holding media elements and
//! attached controls. Backs the simulator binary and the engine tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    controls::{ButtonLayout, ControlId, ControlSpec},
    host::{Activity, Document, HostEvent, HostEventSender, MutationBatch},
    id_type,
    media::{ElementKey, ElementRef, MediaElement, MediaKind, PlaybackError, Rect},
};

id_type!(ContainerId);

const DEFAULT_SIZE: Rect = Rect {
    width: 300.0,
    height: 54.0,
};

#[derive(Debug)]
struct MediaInner {
    volume: f64,
    paused: bool,
    connected: bool,
    playback_blocked: bool,
    volume_history: Vec<f64>,
    listeners: Vec<HostEventSender>,
}

#[derive(Debug)]
pub struct MemoryMedia {
    name: String,
    kind: MediaKind,
    controls: bool,
    rect: Rect,
    inner: Mutex<MediaInner>,
}

impl MemoryMedia {
    pub fn new(name: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            name: name.into(),
            kind,
            controls: false,
            rect: DEFAULT_SIZE,
            inner: Mutex::new(MediaInner {
                volume: 1.0,
                paused: true,
                connected: false,
                playback_blocked: false,
                volume_history: Vec::new(),
                listeners: Vec::new(),
            }),
        }
    }

    pub fn audio(name: impl Into<String>) -> Self {
        Self::new(name, MediaKind::Audio)
    }

    pub fn video(name: impl Into<String>) -> Self {
        Self::new(name, MediaKind::Video)
    }

    pub fn with_controls(mut self, controls: bool) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_volume(self, volume: f64) -> Self {
        self.inner.lock().volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.rect = Rect { width, height };
        self
    }

    /// Marks the element as part of a live document without inserting it.
    pub fn connected(self) -> Self {
        self.inner.lock().connected = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Makes every subsequent `play()` fail, like an autoplay policy would.
    pub fn block_playback(&self, blocked: bool) {
        self.inner.lock().playback_blocked = blocked;
    }

    pub fn volume_history(&self) -> Vec<f64> {
        self.inner.lock().volume_history.clone()
    }

    pub fn listener_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.listeners.retain(|tx| !tx.is_closed());
        inner.listeners.len()
    }

    /// A click on the element itself (not on an attached control).
    pub fn user_click(&self) {
        let mut inner = self.inner.lock();
        self.dispatch(&mut inner, Activity::Click);
    }

    fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    fn add_listener(&self, events: HostEventSender) {
        self.inner.lock().listeners.push(events);
    }

    fn dispatch(&self, inner: &mut MediaInner, activity: Activity) {
        let key = ElementKey::of(self);
        inner
            .listeners
            .retain(|tx| tx.send(HostEvent::Activity(key, activity)).is_ok());
    }
}

impl MediaElement for MemoryMedia {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn has_native_controls(&self) -> bool {
        self.controls
    }

    fn volume(&self) -> f64 {
        self.inner.lock().volume
    }

    fn set_volume(&self, volume: f64) {
        let mut inner = self.inner.lock();
        let volume = volume.clamp(0.0, 1.0);
        inner.volume_history.push(volume);
        if inner.volume != volume {
            inner.volume = volume;
            self.dispatch(&mut inner, Activity::VolumeChange);
        }
    }

    fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    fn play(&self) -> Result<(), PlaybackError> {
        let mut inner = self.inner.lock();
        if inner.playback_blocked {
            return Err(PlaybackError::NotAllowed);
        }
        if inner.paused {
            inner.paused = false;
            self.dispatch(&mut inner, Activity::Play);
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), PlaybackError> {
        self.inner.lock().paused = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    fn bounding_rect(&self) -> Rect {
        self.rect
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug)]
struct ControlNode {
    id: ControlId,
    media: ElementKey,
    spec: ControlSpec,
    right_px: Option<f64>,
    clicks: HostEventSender,
}

#[derive(Debug)]
enum Node {
    Media(Arc<MemoryMedia>),
    Control(ControlNode),
}

#[derive(Debug)]
struct Container {
    id: ContainerId,
    name: String,
    host: bool,
    children: Vec<Node>,
}

impl Container {
    fn holds(&self, key: ElementKey) -> bool {
        self.children.iter().any(|node| match node {
            Node::Media(media) => ElementKey::of(media.as_ref()) == key,
            Node::Control(_) => false,
        })
    }

    fn media(&self) -> impl Iterator<Item = &Arc<MemoryMedia>> {
        self.children.iter().filter_map(|node| match node {
            Node::Media(media) => Some(media),
            Node::Control(_) => None,
        })
    }

    fn controls_mut(&mut self) -> impl Iterator<Item = &mut ControlNode> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Control(control) => Some(control),
            Node::Media(_) => None,
        })
    }
}

/// Snapshot of an attached control, for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlView {
    pub id: ControlId,
    pub container: String,
    pub media: ElementKey,
    pub layout: ButtonLayout,
    pub label: Option<&'static str>,
    pub compact: bool,
    pub right_px: Option<f64>,
}

#[derive(Debug, Default)]
struct DocumentInner {
    containers: Vec<Container>,
    /// Connected media with no parent container.
    loose: Vec<Arc<MemoryMedia>>,
    observers: Vec<HostEventSender>,
}

impl DocumentInner {
    fn media(&self) -> impl Iterator<Item = &Arc<MemoryMedia>> {
        self.containers
            .iter()
            .flat_map(Container::media)
            .chain(self.loose.iter())
    }

    fn find(&self, key: ElementKey) -> Option<Arc<MemoryMedia>> {
        self.media()
            .find(|media| ElementKey::of(media.as_ref()) == key)
            .cloned()
    }

    fn emit(&mut self, batch: MutationBatch) {
        if !batch.touches_tree() {
            return;
        }
        self.observers
            .retain(|tx| tx.send(HostEvent::Mutations(batch)).is_ok());
    }

    fn container_mut(&mut self, id: ContainerId) -> Option<&mut Container> {
        self.containers.iter_mut().find(|container| container.id == id)
    }

    fn control_mut(&mut self, id: ControlId) -> Option<&mut ControlNode> {
        self.containers
            .iter_mut()
            .flat_map(Container::controls_mut)
            .find(|control| control.id == id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocument {
    inner: Mutex<DocumentInner>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, name: impl Into<String>) -> ContainerId {
        let id = ContainerId::new();
        let mut inner = self.inner.lock();
        inner.containers.push(Container {
            id,
            name: name.into(),
            host: false,
            children: Vec::new(),
        });
        inner.emit(MutationBatch {
            added_nodes: 1,
            removed_nodes: 0,
        });
        id
    }

    pub fn container_named(&self, name: &str) -> Option<ContainerId> {
        self.inner
            .lock()
            .containers
            .iter()
            .find(|container| container.name == name)
            .map(|container| container.id)
    }

    /// Appends `media` to `container`. Returns `None` if there is no such
    /// container.
    pub fn insert_media(
        &self,
        container: ContainerId,
        media: MemoryMedia,
    ) -> Option<Arc<MemoryMedia>> {
        let mut inner = self.inner.lock();
        let target = inner.container_mut(container)?;
        let media = Arc::new(media);
        media.set_connected(true);
        target.children.push(Node::Media(Arc::clone(&media)));
        inner.emit(MutationBatch {
            added_nodes: 1,
            removed_nodes: 0,
        });
        Some(media)
    }

    /// Adds `media` to the document without a parent, the way a detached
    /// shadow root or a bare body child would appear.
    pub fn insert_loose(&self, media: MemoryMedia) -> Arc<MemoryMedia> {
        let media = Arc::new(media);
        media.set_connected(true);
        let mut inner = self.inner.lock();
        inner.loose.push(Arc::clone(&media));
        inner.emit(MutationBatch {
            added_nodes: 1,
            removed_nodes: 0,
        });
        media
    }

    pub fn remove_media(&self, media: &MemoryMedia) -> bool {
        let key = ElementKey::of(media);
        let mut inner = self.inner.lock();
        let mut removed = false;
        for container in &mut inner.containers {
            container.children.retain(|node| match node {
                Node::Media(m) if ElementKey::of(m.as_ref()) == key => {
                    m.set_connected(false);
                    removed = true;
                    false
                }
                _ => true,
            });
        }
        inner.loose.retain(|m| {
            let matched = ElementKey::of(m.as_ref()) == key;
            if matched {
                m.set_connected(false);
                removed = true;
            }
            !matched
        });
        if removed {
            inner.emit(MutationBatch {
                added_nodes: 0,
                removed_nodes: 1,
            });
        }
        removed
    }

    pub fn remove_container(&self, id: ContainerId) -> bool {
        let mut inner = self.inner.lock();
        let Some(index) = inner.containers.iter().position(|c| c.id == id) else {
            return false;
        };
        let container = inner.containers.remove(index);
        for media in container.media() {
            media.set_connected(false);
        }
        inner.emit(MutationBatch {
            added_nodes: 0,
            removed_nodes: 1,
        });
        true
    }

    pub fn find_media(&self, name: &str) -> Option<Arc<MemoryMedia>> {
        self.inner
            .lock()
            .media()
            .find(|media| media.name() == name)
            .cloned()
    }

    pub fn all_media(&self) -> Vec<Arc<MemoryMedia>> {
        self.inner.lock().media().cloned().collect()
    }

    /// Clicks a control. The click does not reach the media element.
    pub fn click_control(&self, id: ControlId) -> bool {
        let mut inner = self.inner.lock();
        let Some(control) = inner.control_mut(id) else {
            return false;
        };
        control.clicks.send(HostEvent::ControlClicked(id)).is_ok()
    }

    pub fn controls(&self) -> Vec<ControlView> {
        let inner = self.inner.lock();
        inner
            .containers
            .iter()
            .flat_map(|container| {
                container.children.iter().filter_map(move |node| match node {
                    Node::Control(control) => Some(ControlView {
                        id: control.id,
                        container: container.name.clone(),
                        media: control.media,
                        layout: control.spec.layout,
                        label: control.spec.label(),
                        compact: control.spec.compact,
                        right_px: control.right_px,
                    }),
                    Node::Media(_) => None,
                })
            })
            .collect()
    }

    pub fn controls_for(&self, media: &MemoryMedia) -> Vec<ControlView> {
        let key = ElementKey::of(media);
        self.controls()
            .into_iter()
            .filter(|control| control.media == key)
            .collect()
    }

    pub fn is_host(&self, id: ContainerId) -> bool {
        self.inner
            .lock()
            .containers
            .iter()
            .any(|container| container.id == id && container.host)
    }

    pub fn observer_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.observers.retain(|tx| !tx.is_closed());
        inner.observers.len()
    }
}

impl Document for MemoryDocument {
    fn media_elements(&self) -> Vec<ElementRef> {
        self.all_media()
            .into_iter()
            .map(|media| media as ElementRef)
            .collect()
    }

    fn observe(&self, events: HostEventSender) {
        self.inner.lock().observers.push(events);
    }

    fn track_activity(&self, media: &ElementRef, events: HostEventSender) {
        let key = ElementKey::of_ref(media);
        let found = self.inner.lock().find(key);
        if let Some(found) = found {
            found.add_listener(events);
        }
    }

    fn attach_control(
        &self,
        media: &ElementRef,
        spec: &ControlSpec,
        events: HostEventSender,
    ) -> Option<ControlId> {
        let key = ElementKey::of_ref(media);
        let mut inner = self.inner.lock();
        let parent = inner
            .containers
            .iter_mut()
            .find(|container| container.holds(key))?;
        let id = ControlId::new();
        parent.host = true;
        parent.children.push(Node::Control(ControlNode {
            id,
            media: key,
            spec: spec.clone(),
            right_px: None,
            clicks: events,
        }));
        inner.emit(MutationBatch {
            added_nodes: 1,
            removed_nodes: 0,
        });
        Some(id)
    }

    fn set_control_layout(&self, control: ControlId, layout: ButtonLayout) {
        if let Some(control) = self.inner.lock().control_mut(control) {
            control.spec.layout = layout;
        }
    }

    fn position_control(&self, control: ControlId, right_px: f64) {
        if let Some(control) = self.inner.lock().control_mut(control) {
            control.right_px = Some(right_px);
        }
    }

    fn remove_control(&self, control: ControlId) {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        for container in &mut inner.containers {
            container.children.retain(|node| match node {
                Node::Control(c) if c.id == control => {
                    removed += 1;
                    false
                }
                _ => true,
            });
        }
        inner.emit(MutationBatch {
            added_nodes: 0,
            removed_nodes: removed,
        });
    }

    fn remove_all_controls(&self) {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        for container in &mut inner.containers {
            let before = container.children.len();
            container
                .children
                .retain(|node| !matches!(node, Node::Control(_)));
            removed += before - container.children.len();
        }
        inner.emit(MutationBatch {
            added_nodes: 0,
            removed_nodes: removed,
        });
    }
}
