use crate::media::{ElementRef, WeakElementRef};

/// Picks the element a global toggle should act on.
///
/// Preference order: the last element the user interacted with, as long as it
/// is still in the document and playing; then the first playing candidate;
/// then the first candidate at all.
pub fn pick_target(
    last_active: Option<&WeakElementRef>,
    candidates: &[ElementRef],
) -> Option<ElementRef> {
    let last_active = last_active
        .and_then(WeakElementRef::upgrade)
        .filter(|element| element.is_connected() && !element.is_paused());
    if last_active.is_some() {
        return last_active;
    }

    candidates
        .iter()
        .find(|element| !element.is_paused())
        .or_else(|| candidates.first())
        .cloned()
}
