use std::{collections::HashMap, sync::Arc};

use log::debug;

use crate::{
    id_type,
    media::{ElementKey, ElementRef, MediaElement, WeakElementRef},
    ramp::Ramp,
    store::{audible_or_full, ElementStore, FadeState},
};

id_type!(RampId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Started(RampId, Direction),
    /// The element is mid-ramp; the request was dropped.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Re-submit the ramp for the next frame.
    Continue,
    Finished(Direction),
    /// The ramp or its element no longer exists.
    Abandoned,
}

/// A ramp in flight. The weak reference pins the element's allocation, so its
/// key cannot be handed to a newer element while the ramp exists.
#[derive(Debug)]
struct ActiveRamp {
    element: WeakElementRef,
    key: ElementKey,
    ramp: Ramp,
    direction: Direction,
}

/// Per-element fade state machine.
///
/// An element is either playing at its volume or faded (silent and paused).
/// A toggle starts a ramp towards the other state; the transition is committed
/// to the [`ElementStore`] only when the ramp completes. While a ramp is in
/// flight further toggles on the same element are ignored.
#[derive(Debug, Default)]
pub struct FadeController {
    ramps: HashMap<RampId, ActiveRamp>,
}

impl FadeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(
        &mut self,
        store: &mut ElementStore,
        element: &ElementRef,
        seconds: f64,
        now_ms: f64,
    ) -> Toggle {
        let key = ElementKey::of_ref(element);
        if store.is_animating(key) {
            debug!("Ignoring toggle on {}: fade in progress", element.label());
            return Toggle::Busy;
        }

        let state = store.fade_state(element);
        let (ramp, direction, state) = if state.faded {
            let target = audible_or_full(state.last_volume);
            element.set_volume(0.0);
            request_play(element.as_ref());
            (Ramp::new(0.0, target, seconds, now_ms), Direction::In, state)
        } else {
            let current = audible_or_full(element.volume());
            request_play(element.as_ref());
            (
                Ramp::new(current, 0.0, seconds, now_ms),
                Direction::Out,
                FadeState {
                    faded: false,
                    last_volume: current,
                },
            )
        };

        let id = RampId::new();
        let record = store.entry(element);
        record.fade = Some(state);
        record.animating = Some(id);
        self.ramps.insert(
            id,
            ActiveRamp {
                element: Arc::downgrade(element),
                key,
                ramp,
                direction,
            },
        );
        debug!(
            "Fading {} {direction:?} over {:.2}s",
            element.label(),
            ramp.duration_secs()
        );
        Toggle::Started(id, direction)
    }

    /// Advances ramp `id` to `now_ms`, committing the transition when done.
    pub fn step(&mut self, store: &mut ElementStore, id: RampId, now_ms: f64) -> Step {
        let Some(active) = self.ramps.get(&id) else {
            return Step::Abandoned;
        };
        let Some(element) = active.element.upgrade() else {
            let key = active.key;
            self.ramps.remove(&id);
            release(store, key, id);
            return Step::Abandoned;
        };

        let sample = active.ramp.sample(now_ms);
        element.set_volume(sample.volume);
        if !sample.done {
            if element.is_paused() {
                request_play(element.as_ref());
            }
            return Step::Continue;
        }

        let Some(active) = self.ramps.remove(&id) else {
            return Step::Abandoned;
        };
        commit(store, &element, active.direction);
        Step::Finished(active.direction)
    }

    /// Force-completes every in-flight ramp, jumping straight to its end state.
    pub fn finish_all(&mut self, store: &mut ElementStore) -> usize {
        let ramps: Vec<(RampId, ActiveRamp)> = self.ramps.drain().collect();
        let count = ramps.len();
        for (id, active) in ramps {
            match active.element.upgrade() {
                Some(element) => {
                    element.set_volume(active.ramp.end_volume());
                    commit(store, &element, active.direction);
                }
                None => release(store, active.key, id),
            }
        }
        count
    }

    pub fn in_flight(&self) -> usize {
        self.ramps.len()
    }

    pub fn is_running(&self, id: RampId) -> bool {
        self.ramps.contains_key(&id)
    }
}

/// Clears the animating marker left by ramp `id`, if it is still the owner.
fn release(store: &mut ElementStore, key: ElementKey, id: RampId) {
    if let Some(record) = store.get_mut(key) {
        if record.animating == Some(id) {
            record.animating = None;
        }
    }
}

fn commit(store: &mut ElementStore, element: &ElementRef, direction: Direction) {
    let record = store.entry(element);
    record.animating = None;
    let mut state = record
        .fade
        .unwrap_or_else(|| FadeState::initial(element.as_ref()));
    match direction {
        Direction::Out => {
            request_pause(element.as_ref());
            // Silence persists through the pause; the native volume control
            // keeps showing the level the user picked.
            element.set_volume(state.last_volume);
            state.faded = true;
        }
        Direction::In => state.faded = false,
    }
    record.fade = Some(state);
    debug!("Fade {direction:?} finished on {}", element.label());
}

fn request_play(element: &dyn MediaElement) {
    if let Err(err) = element.play() {
        debug!("Ignoring play failure on {}: {err}", element.label());
    }
}

fn request_pause(element: &dyn MediaElement) {
    if let Err(err) = element.pause() {
        debug!("Ignoring pause failure on {}: {err}", element.label());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryMedia;

    fn media(volume: f64) -> (Arc<MemoryMedia>, ElementRef) {
        let media = Arc::new(MemoryMedia::audio("track").with_volume(volume));
        let element: ElementRef = media.clone();
        (media, element)
    }

    /// Steps `id` at 16ms intervals until it stops continuing.
    fn run_to_end(
        fader: &mut FadeController,
        store: &mut ElementStore,
        id: RampId,
        start_ms: f64,
    ) -> (Step, f64) {
        let mut now = start_ms;
        loop {
            now += 16.0;
            match fader.step(store, id, now) {
                Step::Continue => continue,
                step => return (step, now),
            }
        }
    }

    #[test]
    fn should_fade_out_then_pause_and_restore_volume() {
        // given
        let mut store = ElementStore::new();
        let mut fader = FadeController::new();
        let (media, element) = media(1.0);

        // when
        let Toggle::Started(id, Direction::Out) = fader.toggle(&mut store, &element, 0.1, 0.0)
        else {
            panic!("fade-out should start");
        };
        let (step, end) = run_to_end(&mut fader, &mut store, id, 0.0);

        // then
        assert_eq!(step, Step::Finished(Direction::Out));
        assert!(end >= 100.0);
        assert!(media.is_paused());
        assert_eq!(media.volume(), 1.0);
        assert_eq!(media.volume_history().iter().rev().nth(1), Some(&0.0));
        assert_eq!(
            store.fade_state(&element),
            FadeState {
                faded: true,
                last_volume: 1.0
            }
        );
        assert!(!store.is_animating(ElementKey::of_ref(&element)));
    }

    #[test]
    fn should_fade_in_to_remembered_volume() {
        // given
        let mut store = ElementStore::new();
        let mut fader = FadeController::new();
        let (media, element) = media(0.6);
        media.pause().unwrap();
        store.entry(&element).fade = Some(FadeState {
            faded: true,
            last_volume: 0.6,
        });

        // when
        let Toggle::Started(id, Direction::In) = fader.toggle(&mut store, &element, 0.2, 0.0)
        else {
            panic!("fade-in should start");
        };

        // then
        assert_eq!(media.volume(), 0.0);
        assert!(!media.is_paused());
        let (step, _) = run_to_end(&mut fader, &mut store, id, 0.0);
        assert_eq!(step, Step::Finished(Direction::In));
        assert!((media.volume() - 0.6).abs() < 1e-9);
        assert!(!media.is_paused());
        assert!(!store.fade_state(&element).faded);
    }

    #[test]
    fn should_ignore_toggle_while_animating() {
        // given
        let mut store = ElementStore::new();
        let mut fader = FadeController::new();
        let (_media, element) = media(0.9);
        let first = fader.toggle(&mut store, &element, 1.0, 0.0);
        fader.step(&mut store, first_id(first), 100.0);

        // when
        let second = fader.toggle(&mut store, &element, 1.0, 120.0);

        // then
        assert_eq!(second, Toggle::Busy);
        assert_eq!(fader.in_flight(), 1);
        assert_eq!(
            store.fade_state(&element),
            FadeState {
                faded: false,
                last_volume: 0.9
            }
        );
    }

    #[test]
    fn should_round_trip_volume() {
        // given
        let mut store = ElementStore::new();
        let mut fader = FadeController::new();
        let (media, element) = media(0.8);

        // when
        let out = first_id(fader.toggle(&mut store, &element, 0.3, 0.0));
        let (_, now) = run_to_end(&mut fader, &mut store, out, 0.0);
        let back = first_id(fader.toggle(&mut store, &element, 0.3, now));
        run_to_end(&mut fader, &mut store, back, now);

        // then
        assert!((media.volume() - 0.8).abs() < 1e-9);
        assert!(!media.is_paused());
        assert!(!store.fade_state(&element).faded);
    }

    #[test]
    fn should_keep_fading_when_playback_is_blocked() {
        // given
        let mut store = ElementStore::new();
        let mut fader = FadeController::new();
        let (media, element) = media(0.5);
        media.block_playback(true);
        media.pause().unwrap();
        store.entry(&element).fade = Some(FadeState {
            faded: true,
            last_volume: 0.5,
        });

        // when
        let id = first_id(fader.toggle(&mut store, &element, 0.1, 0.0));
        let (step, _) = run_to_end(&mut fader, &mut store, id, 0.0);

        // then
        assert_eq!(step, Step::Finished(Direction::In));
        assert!(media.is_paused());
        assert!((media.volume() - 0.5).abs() < 1e-9);
        assert!(!store.fade_state(&element).faded);
    }

    #[test]
    fn should_replay_if_paused_mid_ramp() {
        // given
        let mut store = ElementStore::new();
        let mut fader = FadeController::new();
        let (media, element) = media(1.0);
        let id = first_id(fader.toggle(&mut store, &element, 1.0, 0.0));

        // when
        media.pause().unwrap();
        let step = fader.step(&mut store, id, 500.0);

        // then
        assert_eq!(step, Step::Continue);
        assert!(!media.is_paused());
    }

    #[test]
    fn should_finish_all_ramps_at_their_end_state() {
        // given
        let mut store = ElementStore::new();
        let mut fader = FadeController::new();
        let (media, element) = media(0.7);
        let id = first_id(fader.toggle(&mut store, &element, 5.0, 0.0));
        fader.step(&mut store, id, 1000.0);

        // when
        let finished = fader.finish_all(&mut store);

        // then
        assert_eq!(finished, 1);
        assert_eq!(fader.in_flight(), 0);
        assert!(!fader.is_running(id));
        assert!(media.is_paused());
        assert!((media.volume() - 0.7).abs() < 1e-9);
        assert!(store.fade_state(&element).faded);
        assert_eq!(fader.step(&mut store, id, 2000.0), Step::Abandoned);
    }

    #[test]
    fn should_abandon_ramp_of_dropped_element() {
        // given
        let mut store = ElementStore::new();
        let mut fader = FadeController::new();
        let (media, element) = media(0.7);
        let id = first_id(fader.toggle(&mut store, &element, 1.0, 0.0));

        // when
        drop(media);
        drop(element);

        // then
        assert_eq!(fader.step(&mut store, id, 100.0), Step::Abandoned);
        assert_eq!(fader.in_flight(), 0);
    }

    fn first_id(toggle: Toggle) -> RampId {
        match toggle {
            Toggle::Started(id, _) => id,
            Toggle::Busy => panic!("toggle should have started a ramp"),
        }
    }
}
