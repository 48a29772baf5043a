use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::{
    commands::{CommandAction, CommandRegistry, FadeError, LogNotifier, Notifier},
    config::{load_settings, Settings, SettingsStore},
    controls::{right_offset_px, ControlId, ControlSpec},
    fade::{FadeController, Step, Toggle},
    frame::{Clock, FrameQueue, FrameTask, SystemClock},
    host::{Document, HostEvent, HostEventReceiver, HostEventSender},
    media::{ElementKey, ElementRef, WeakElementRef},
    store::{Attachment, ElementStore, FadeState},
    target,
};

/// Live subscription to the document. Dropping it disconnects every
/// listener the host still holds for us.
struct Observation {
    events_tx: HostEventSender,
    events_rx: HostEventReceiver,
}

/// The fade & stop engine: keeps a control on every qualifying media element
/// of a document and fades elements out and back in on request.
///
/// Everything runs on one thread. Host callbacks are queued as
/// [`HostEvent`]s and drained at the start of each [`FadeStop::tick`], after
/// which the work due this frame runs.
pub struct FadeStop {
    document: Arc<dyn Document>,
    settings: Settings,
    settings_store: Box<dyn SettingsStore>,
    notifier: Box<dyn Notifier>,
    clock: Box<dyn Clock>,
    commands: CommandRegistry,
    store: ElementStore,
    fader: FadeController,
    frames: FrameQueue<FrameTask>,
    observation: Option<Observation>,
    rescan_pending: bool,
    last_active: Option<WeakElementRef>,
    rescans: u64,
}

impl FadeStop {
    pub fn new(document: Arc<dyn Document>, settings_store: Box<dyn SettingsStore>) -> Self {
        let settings = load_settings(settings_store.as_ref());
        Self {
            document,
            settings,
            settings_store,
            notifier: Box::new(LogNotifier),
            clock: Box::new(SystemClock::default()),
            commands: CommandRegistry::new(),
            store: ElementStore::new(),
            fader: FadeController::new(),
            frames: FrameQueue::new(),
            observation: None,
            rescan_pending: false,
            last_active: None,
            rescans: 0,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Replaces the loaded settings for this session without persisting them.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.observation.is_some()
    }

    /// Subscribes to document mutations and attaches to what is already there.
    pub fn load(&mut self) {
        if self.is_loaded() {
            return;
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.document.observe(events_tx.clone());
        self.observation = Some(Observation {
            events_tx,
            events_rx,
        });
        info!(
            "Fade & stop loaded (fade {}s, layout {})",
            self.settings.fade_seconds,
            self.settings.button_layout.as_str()
        );
        self.scan_and_attach();
    }

    /// Disconnects from the document and removes every control.
    ///
    /// Ramps still in flight are completed on the spot so no element is left
    /// at an intermediate volume.
    pub fn unload(&mut self) {
        let finished = self.fader.finish_all(&mut self.store);
        self.frames.retain(|_| false);
        self.rescan_pending = false;

        let was_loaded = self.observation.take().is_some();
        self.document.remove_all_controls();
        for record in self.store.records_mut() {
            record.attachment = Attachment::Unseen;
        }
        if was_loaded {
            info!("Fade & stop unloaded ({finished} fade(s) completed early)");
        }
    }

    /// Drains queued host events, then runs the work due this frame.
    pub fn tick(&mut self) {
        self.pump_events();

        let now = self.clock.now_ms();
        for task in self.frames.begin_frame() {
            match task {
                FrameTask::Rescan => {
                    self.rescan_pending = false;
                    self.scan_and_attach();
                }
                FrameTask::Ramp(id) => {
                    if self.fader.step(&mut self.store, id, now) == Step::Continue {
                        self.frames.request(FrameTask::Ramp(id));
                    }
                }
                FrameTask::Position(control) => self.position(control),
            }
        }
    }

    pub fn pump_events(&mut self) {
        let Some(observation) = self.observation.as_mut() else {
            return;
        };
        let mut events = Vec::new();
        while let Ok(event) = observation.events_rx.try_recv() {
            events.push(event);
        }
        for event in events {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Mutations(batch) => {
                if batch.touches_tree() && !self.rescan_pending {
                    self.rescan_pending = true;
                    self.frames.request(FrameTask::Rescan);
                }
            }
            HostEvent::Activity(key, _) => {
                if let Some(element) = self.store.element(key) {
                    self.last_active = Some(Arc::downgrade(&element));
                }
            }
            HostEvent::ControlClicked(control) => {
                let element = self
                    .store
                    .find_by_control(control)
                    .and_then(|key| self.store.element(key));
                match element {
                    Some(element) => {
                        self.toggle(&element);
                    }
                    None => debug!("Click on control {control} with no live element"),
                }
            }
        }
    }

    /// Attaches controls and activity tracking to every qualifying element.
    pub fn scan_and_attach(&mut self) {
        let Some(observation) = self.observation.as_ref() else {
            debug!("Skipping scan: not loaded");
            return;
        };
        let events_tx = observation.events_tx.clone();
        self.rescans += 1;

        let elements = self.qualifying_elements();
        for element in &elements {
            self.attach_control(element, &events_tx);
        }
        for element in &elements {
            let record = self.store.entry(element);
            if !record.attachment.is_tracked() {
                self.document.track_activity(element, events_tx.clone());
                record.attachment = record.attachment.with_tracking();
            }
        }

        self.drop_orphaned_controls();
        let pruned = self.store.prune();
        debug!(
            "Rescan #{}: {} qualifying element(s), {pruned} stale record(s) pruned",
            self.rescans,
            elements.len()
        );
    }

    fn attach_control(&mut self, element: &ElementRef, events_tx: &HostEventSender) {
        let record = self.store.entry(element);
        if record.attachment.control().is_some() {
            return;
        }
        let spec = ControlSpec::for_media(self.settings.button_layout, element.bounding_rect());
        match self
            .document
            .attach_control(element, &spec, events_tx.clone())
        {
            Some(control) => {
                record.attachment = record.attachment.with_control(control);
                self.frames.request(FrameTask::Position(control));
                debug!("Attached control {control} to {}", element.label());
            }
            None => debug!("{} has no container; no control attached", element.label()),
        }
    }

    /// Removes controls whose element has left the document.
    fn drop_orphaned_controls(&mut self) {
        for record in self.store.records_mut() {
            let Some(control) = record.attachment.control() else {
                continue;
            };
            let live = record
                .element()
                .is_some_and(|element| element.is_connected());
            if !live {
                self.document.remove_control(control);
                record.attachment = if record.attachment.is_tracked() {
                    Attachment::Tracked
                } else {
                    Attachment::Unseen
                };
                debug!("Removed control {control} of a detached element");
            }
        }
    }

    fn position(&self, control: ControlId) {
        self.document
            .position_control(control, right_offset_px(self.settings.extra_left_offset_px));
    }

    pub fn qualifying_elements(&self) -> Vec<ElementRef> {
        let selector = self.settings.selector();
        self.document
            .media_elements()
            .into_iter()
            .filter(|element| selector.matches(element.as_ref()))
            .collect()
    }

    /// Starts a fade on `element` with the configured duration.
    pub fn toggle(&mut self, element: &ElementRef) -> Toggle {
        let now = self.clock.now_ms();
        let toggle = self
            .fader
            .toggle(&mut self.store, element, self.settings.fade_seconds, now);
        if let Toggle::Started(id, _) = toggle {
            self.frames.request(FrameTask::Ramp(id));
        }
        toggle
    }

    pub fn pick_target(&self) -> Option<ElementRef> {
        target::pick_target(self.last_active.as_ref(), &self.qualifying_elements())
    }

    /// Toggles whatever the user most plausibly means.
    pub fn toggle_current(&mut self) -> Result<Toggle, FadeError> {
        match self.pick_target() {
            Some(element) => Ok(self.toggle(&element)),
            None => {
                let err = FadeError::NoTargetFound;
                self.notifier.notice(&err.to_string());
                Err(err)
            }
        }
    }

    pub fn run_command(&mut self, id: &str) -> Result<(), FadeError> {
        let command = *self.commands.find(id)?;
        debug!("Running command {}", command.id);
        match command.action {
            CommandAction::FadeToggleCurrent => self.toggle_current().map(|_| ()),
        }
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies and persists new settings, then re-renders attached controls in
    /// place and rescans in case the selector changed.
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
        if let Err(err) = self.settings_store.save(&self.settings) {
            warn!("Failed to save settings: {err:?}");
        }
        for control in self.store.controls() {
            self.document
                .set_control_layout(control, self.settings.button_layout);
            self.position(control);
        }
        self.scan_and_attach();
    }

    pub fn fade_state(&self, element: &ElementRef) -> FadeState {
        self.store.fade_state(element)
    }

    pub fn is_animating(&self, element: &ElementRef) -> bool {
        self.store.is_animating(ElementKey::of_ref(element))
    }

    pub fn last_active(&self) -> Option<ElementRef> {
        self.last_active.as_ref().and_then(WeakElementRef::upgrade)
    }

    pub fn fades_in_flight(&self) -> usize {
        self.fader.in_flight()
    }

    pub fn rescan_count(&self) -> u64 {
        self.rescans
    }

    pub fn frame(&self) -> u64 {
        self.frames.frame()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        commands::CollectingNotifier,
        config::MemoryStore,
        controls::ButtonLayout,
        fade::Direction,
        frame::ManualClock,
        media::MediaElement,
        memory::{ContainerId, MemoryDocument, MemoryMedia},
    };

    const FRAME: Duration = Duration::from_millis(16);

    struct Harness {
        doc: Arc<MemoryDocument>,
        clock: ManualClock,
        plugin: FadeStop,
        notes: ContainerId,
    }

    impl Harness {
        fn new(settings: serde_json::Value) -> Self {
            let doc = Arc::new(MemoryDocument::new());
            let notes = doc.add_container("notes");
            let clock = ManualClock::new();
            let plugin = FadeStop::new(doc.clone(), Box::new(MemoryStore::with_value(settings)))
                .with_clock(clock.clone());
            Self {
                doc,
                clock,
                plugin,
                notes,
            }
        }

        fn audio(&self, name: &str, volume: f64) -> Arc<MemoryMedia> {
            self.doc
                .insert_media(
                    self.notes,
                    MemoryMedia::audio(name)
                        .with_controls(true)
                        .with_volume(volume),
                )
                .unwrap()
        }

        fn frames(&mut self, count: usize) {
            for _ in 0..count {
                self.clock.advance(FRAME);
                self.plugin.tick();
            }
        }

        fn run_for(&mut self, duration: Duration) {
            let count = (duration.as_millis() / FRAME.as_millis()) as usize + 2;
            self.frames(count);
        }
    }

    fn element(media: &Arc<MemoryMedia>) -> ElementRef {
        media.clone()
    }

    #[test]
    fn should_attach_one_control_per_element() {
        // given
        let mut h = Harness::new(json!({}));
        let a = h.audio("a", 1.0);
        let b = h.audio("b", 1.0);

        // when
        h.plugin.load();
        h.plugin.scan_and_attach();
        h.frames(3);

        // then
        assert_eq!(h.doc.controls_for(&a).len(), 1);
        assert_eq!(h.doc.controls_for(&b).len(), 1);
        assert_eq!(a.listener_count(), 1);
        assert_eq!(b.listener_count(), 1);
        assert!(h.doc.is_host(h.notes));
        assert!(h.doc.controls().iter().all(|c| c.right_px == Some(8.0)));
    }

    #[test]
    fn should_pick_up_elements_added_later() {
        // given
        let mut h = Harness::new(json!({}));
        h.plugin.load();

        // when
        let late = h.audio("late", 1.0);
        h.frames(1);

        // then
        assert_eq!(h.doc.controls_for(&late).len(), 1);
    }

    #[test]
    fn should_coalesce_mutation_bursts_into_one_rescan() {
        // given
        let mut h = Harness::new(json!({}));
        h.plugin.load();
        let before = h.plugin.rescan_count();

        // when
        for i in 0..50 {
            h.audio(&format!("track-{i}"), 1.0);
        }
        h.frames(1);

        // then
        assert_eq!(h.plugin.rescan_count(), before + 1);
        assert_eq!(h.doc.controls().len(), 50);
    }

    #[test]
    fn should_respect_selector_settings() {
        // given
        let mut h = Harness::new(json!({ "universalSelector": false }));
        let bare = h
            .doc
            .insert_media(h.notes, MemoryMedia::audio("bare"))
            .unwrap();
        let video = h
            .doc
            .insert_media(h.notes, MemoryMedia::video("clip").with_controls(true))
            .unwrap();
        let with_controls = h.audio("ok", 1.0);

        // when
        h.plugin.load();

        // then
        assert!(h.doc.controls_for(&bare).is_empty());
        assert!(h.doc.controls_for(&video).is_empty());
        assert_eq!(h.doc.controls_for(&with_controls).len(), 1);
    }

    #[test]
    fn should_fade_out_on_control_click() {
        // given
        let mut h = Harness::new(json!({ "fadeSeconds": 0.1 }));
        let media = h.audio("a", 1.0);
        media.play().unwrap();
        h.plugin.load();
        let control = h.doc.controls_for(&media)[0].id;

        // when
        assert!(h.doc.click_control(control));
        h.run_for(Duration::from_millis(100));

        // then
        let element = element(&media);
        assert!(media.is_paused());
        assert_eq!(media.volume(), 1.0);
        assert_eq!(media.volume_history().iter().rev().nth(1), Some(&0.0));
        assert_eq!(
            h.plugin.fade_state(&element),
            FadeState {
                faded: true,
                last_volume: 1.0
            }
        );
        assert!(!h.plugin.is_animating(&element));
    }

    #[test]
    fn should_fade_back_in_to_stored_volume() {
        // given
        let mut h = Harness::new(json!({ "fadeSeconds": 0.2 }));
        let media = h.audio("a", 0.6);
        h.plugin.load();
        let element = element(&media);
        h.plugin.toggle(&element);
        h.run_for(Duration::from_millis(200));
        assert!(h.plugin.fade_state(&element).faded);

        // when
        let toggle = h.plugin.toggle(&element);
        h.run_for(Duration::from_millis(200));

        // then
        assert!(matches!(toggle, Toggle::Started(_, Direction::In)));
        assert!((media.volume() - 0.6).abs() < 1e-9);
        assert!(!media.is_paused());
        assert!(!h.plugin.fade_state(&element).faded);
    }

    #[test]
    fn should_drop_rapid_second_click() {
        // given
        let mut h = Harness::new(json!({ "fadeSeconds": 1.0 }));
        let media = h.audio("a", 1.0);
        h.plugin.load();
        let control = h.doc.controls_for(&media)[0].id;

        // when
        h.doc.click_control(control);
        h.frames(2);
        h.doc.click_control(control);
        h.frames(2);

        // then
        assert_eq!(h.plugin.fades_in_flight(), 1);
        assert!(h.plugin.is_animating(&element(&media)));
        assert!(!h.plugin.fade_state(&element(&media)).faded);
    }

    #[test]
    fn should_fall_back_to_first_element_when_nothing_played() {
        // given
        let mut h = Harness::new(json!({}));
        let first = h.audio("first", 1.0);
        h.audio("second", 1.0);
        h.plugin.load();

        // when
        let target = h.plugin.pick_target();

        // then
        assert_eq!(
            target.as_ref().map(ElementKey::of_ref),
            Some(ElementKey::of_ref(&element(&first)))
        );
    }

    #[test]
    fn should_track_last_active_element() {
        // given
        let mut h = Harness::new(json!({}));
        h.audio("first", 1.0);
        let second = h.audio("second", 1.0);
        h.plugin.load();

        // when
        second.play().unwrap();
        h.frames(1);

        // then
        let target = h.plugin.pick_target().unwrap();
        assert_eq!(ElementKey::of_ref(&target), ElementKey::of_ref(&element(&second)));
        assert!(h.plugin.last_active().is_some());
    }

    #[test]
    fn should_ignore_stale_last_active_element() {
        // given
        let mut h = Harness::new(json!({}));
        let first = h.audio("first", 1.0);
        let gone = h.audio("gone", 1.0);
        h.plugin.load();
        gone.play().unwrap();
        h.frames(1);

        // when
        h.doc.remove_media(&gone);
        h.frames(1);

        // then
        let target = h.plugin.pick_target().unwrap();
        assert_eq!(ElementKey::of_ref(&target), ElementKey::of_ref(&element(&first)));
        assert!(h.doc.controls_for(&gone).is_empty());
    }

    #[test]
    fn should_report_missing_target() {
        // given
        let doc = Arc::new(MemoryDocument::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let mut plugin = FadeStop::new(doc, Box::new(MemoryStore::new()))
            .with_notifier(notifier.clone());
        plugin.load();

        // when
        let result = plugin.run_command("fade-toggle-current-media");

        // then
        assert_eq!(result, Err(FadeError::NoTargetFound));
        assert_eq!(notifier.notices(), vec!["No media element found.".to_string()]);
    }

    #[test]
    fn should_toggle_current_media_via_command() {
        // given
        let mut h = Harness::new(json!({ "fadeSeconds": 0.1 }));
        let media = h.audio("a", 0.8);
        h.plugin.load();

        // when
        h.plugin.run_command("fade-toggle-current-media").unwrap();
        h.run_for(Duration::from_millis(100));

        // then
        assert!(h.plugin.fade_state(&element(&media)).faded);
        assert!(media.is_paused());
    }

    #[test]
    fn should_restyle_controls_without_reattaching() {
        // given
        let mut h = Harness::new(json!({}));
        let media = h.audio("a", 1.0);
        h.plugin.load();
        h.frames(1);
        let before = h.doc.controls_for(&media)[0].id;

        // when
        let settings = Settings {
            button_layout: ButtonLayout::Icon,
            extra_left_offset_px: 84.0,
            ..h.plugin.settings().clone()
        };
        h.plugin.update_settings(settings);

        // then
        let controls = h.doc.controls_for(&media);
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].id, before);
        assert_eq!(controls[0].layout, ButtonLayout::Icon);
        assert_eq!(controls[0].label, None);
        assert_eq!(controls[0].right_px, Some(92.0));
    }

    #[test]
    fn should_not_hand_a_running_fade_to_a_new_element() {
        // given
        let mut h = Harness::new(json!({ "fadeSeconds": 0.2 }));
        let old = h.audio("old", 1.0);
        h.plugin.load();
        h.plugin.toggle(&element(&old));
        h.frames(2);
        h.doc.remove_media(&old);
        drop(old);
        let settings = h.plugin.settings().clone();
        h.plugin.update_settings(settings.clone());

        // when
        let fresh = h.audio("fresh", 0.9);
        fresh.play().unwrap();
        h.plugin.update_settings(settings);
        h.frames(12);

        // then
        let fresh_element = element(&fresh);
        assert_eq!(h.plugin.fades_in_flight(), 0);
        assert!(!h.plugin.is_animating(&fresh_element));
        assert!(!h.plugin.fade_state(&fresh_element).faded);
        assert!(!fresh.is_paused());
        assert!((fresh.volume() - 0.9).abs() < 1e-9);
        assert!(fresh.volume_history().is_empty());
    }

    #[test]
    fn should_attach_newly_qualifying_elements_after_settings_change() {
        // given
        let mut h = Harness::new(json!({ "applyToVideo": false }));
        let audio = h.audio("a", 1.0);
        let video = h
            .doc
            .insert_media(h.notes, MemoryMedia::video("clip").with_controls(true))
            .unwrap();
        h.plugin.load();
        h.frames(2);
        let audio_controls: Vec<ControlId> =
            h.doc.controls_for(&audio).iter().map(|c| c.id).collect();
        assert!(h.doc.controls_for(&video).is_empty());

        // when
        let settings = Settings {
            apply_to_video: true,
            ..h.plugin.settings().clone()
        };
        h.plugin.update_settings(settings);
        h.frames(2);

        // then
        assert_eq!(h.doc.controls_for(&video).len(), 1);
        let after: Vec<ControlId> = h.doc.controls_for(&audio).iter().map(|c| c.id).collect();
        assert_eq!(after, audio_controls);
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn should_track_parentless_elements_without_a_control() {
        // given
        let mut h = Harness::new(json!({}));
        let loose = h
            .doc
            .insert_loose(MemoryMedia::audio("loose").with_controls(true));
        h.plugin.load();
        h.frames(2);

        // when
        loose.play().unwrap();
        h.frames(1);

        // then
        assert!(h.doc.controls_for(&loose).is_empty());
        assert_eq!(loose.listener_count(), 1);
        let last = h.plugin.last_active().unwrap();
        assert_eq!(ElementKey::of_ref(&last), ElementKey::of_ref(&element(&loose)));
    }

    #[test]
    fn should_unload_cleanly_and_finish_fades() {
        // given
        let mut h = Harness::new(json!({ "fadeSeconds": 5.0 }));
        let media = h.audio("a", 0.7);
        h.plugin.load();
        h.plugin.toggle(&element(&media));
        h.frames(3);

        // when
        h.plugin.unload();
        h.plugin.unload();

        // then
        assert!(!h.plugin.is_loaded());
        assert!(h.doc.controls().is_empty());
        assert_eq!(h.doc.observer_count(), 0);
        assert_eq!(media.listener_count(), 0);
        assert_eq!(h.plugin.fades_in_flight(), 0);
        assert!(media.is_paused());
        assert!((media.volume() - 0.7).abs() < 1e-9);
        assert!(h.plugin.fade_state(&element(&media)).faded);
    }

    #[test]
    fn should_unload_safely_when_never_loaded() {
        // given
        let mut h = Harness::new(json!({}));

        // when
        h.plugin.unload();

        // then
        assert!(!h.plugin.is_loaded());
        assert!(h.doc.controls().is_empty());
    }

    #[test]
    fn should_reattach_after_reload() {
        // given
        let mut h = Harness::new(json!({}));
        let media = h.audio("a", 1.0);
        h.plugin.load();
        h.plugin.unload();

        // when
        h.plugin.load();

        // then
        assert_eq!(h.doc.controls_for(&media).len(), 1);
        assert_eq!(media.listener_count(), 1);
    }
}
