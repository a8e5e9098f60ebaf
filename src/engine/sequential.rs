//! Sequential unlock rules for ordered media items. Pure functions over a
//! record's `last_completed_index` and the learner's saved playback offsets;
//! state changes go through the progress store.

use std::collections::HashMap;

use crate::engine::types::ItemAccess;

/// Clamp a persisted index against the current catalog so a shrunken item
/// list never produces out-of-range reads. `-1` means nothing completed.
pub fn clamp_last_completed(last_completed: i64, item_count: usize) -> i64 {
    last_completed.clamp(-1, item_count as i64 - 1)
}

/// Access state for item `index` given the last sequentially completed index.
///
/// Anything at or before the frontier has been played; the item directly
/// after it is the one currently unlocked. Items beyond the frontier stay
/// locked unless a nonzero resume offset shows the learner already started
/// them; items with saved playback history stay replayable.
pub fn item_access(index: i64, last_completed: i64, resume_offset: Option<f64>) -> ItemAccess {
    if index <= last_completed {
        ItemAccess::Played
    } else if index == last_completed + 1 {
        ItemAccess::Playable
    } else if resume_offset.is_some_and(|position| position > 0.0) {
        ItemAccess::Played
    } else {
        ItemAccess::Locked
    }
}

/// Per-item access list for a whole module.
pub fn access_list(
    item_count: usize,
    last_completed: i64,
    resume_offsets: &HashMap<i64, f64>,
) -> Vec<ItemAccess> {
    let last_completed = clamp_last_completed(last_completed, item_count);
    (0..item_count as i64)
        .map(|index| item_access(index, last_completed, resume_offsets.get(&index).copied()))
        .collect()
}

/// Whether an end-of-playback event for `index` advances the frontier.
/// Replays and out-of-order finishes never move it.
pub fn should_advance(index: i64, last_completed: i64) -> bool {
    index == last_completed + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_only_first_playable() {
        let offsets = HashMap::new();
        let access = access_list(4, -1, &offsets);
        assert_eq!(access[0], ItemAccess::Playable);
        assert!(access[1..].iter().all(|a| *a == ItemAccess::Locked));
    }

    #[test]
    fn test_advance_unlocks_next() {
        assert!(should_advance(0, -1));
        let offsets = HashMap::new();
        let access = access_list(4, 0, &offsets);
        assert_eq!(access[0], ItemAccess::Played);
        assert_eq!(access[1], ItemAccess::Playable);
        assert_eq!(access[2], ItemAccess::Locked);
    }

    #[test]
    fn test_replay_does_not_advance() {
        assert!(!should_advance(0, 2));
        assert!(!should_advance(2, 2));
    }

    #[test]
    fn test_skip_ahead_does_not_advance() {
        assert!(!should_advance(3, 0));
    }

    #[test]
    fn test_resume_offset_keeps_item_accessible() {
        let mut offsets = HashMap::new();
        offsets.insert(3, 42.5);
        let access = access_list(5, 0, &offsets);
        assert_eq!(access[3], ItemAccess::Played);
        assert!(access[3].is_playable());
        assert_eq!(access[2], ItemAccess::Locked);
        assert_eq!(access[4], ItemAccess::Locked);
    }

    #[test]
    fn test_zero_offset_stays_locked() {
        let mut offsets = HashMap::new();
        offsets.insert(3, 0.0);
        let access = access_list(5, 0, &offsets);
        assert_eq!(access[3], ItemAccess::Locked);
    }

    #[test]
    fn test_clamp_against_shrunken_catalog() {
        assert_eq!(clamp_last_completed(7, 4), 3);
        assert_eq!(clamp_last_completed(-1, 4), -1);
        assert_eq!(clamp_last_completed(2, 4), 2);
        assert_eq!(clamp_last_completed(0, 0), -1);

        // A frontier past the end must not unlock phantom indices.
        let offsets = HashMap::new();
        let access = access_list(3, 9, &offsets);
        assert!(access.iter().all(|a| *a == ItemAccess::Played));
    }
}
