//! Property-based tests for the sequential unlock rules.
//!
//! Invariants checked:
//! - The frontier (`last_completed_index`) never regresses and never exceeds
//!   the item count, whatever order end-of-playback events arrive in.
//! - Implicit module completion fires at most once per module.
//! - The access list always exposes exactly one playable frontier item while
//!   the module is incomplete, absent resume offsets.

use proptest::prelude::*;

use selah_backend_rust::engine::sequential::{access_list, clamp_last_completed, should_advance};
use selah_backend_rust::engine::store::ProgressStore;
use selah_backend_rust::engine::ItemAccess;

fn arb_event_sequence() -> impl Strategy<Value = (usize, Vec<i64>)> {
    (1usize..=8).prop_flat_map(|item_count| {
        let events = prop::collection::vec(-2i64..=(item_count as i64 + 2), 0..40);
        (Just(item_count), events)
    })
}

proptest! {
    #[test]
    fn frontier_never_regresses_and_stays_in_bounds((item_count, events) in arb_event_sequence()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let store = ProgressStore::new(None);
            let mut previous = -1i64;
            let mut completions = 0u32;

            for index in events {
                let advance = store
                    .advance_sequential("u1", "module2", index, item_count)
                    .await;

                let current = advance.record.last_completed_index;
                prop_assert!(current >= previous, "frontier regressed");
                prop_assert!(current >= -1);
                prop_assert!(current < item_count as i64);

                if advance.advanced {
                    prop_assert_eq!(current, previous + 1);
                } else {
                    prop_assert_eq!(current, previous);
                }

                if advance.completed_now {
                    completions += 1;
                    prop_assert!(advance.record.completed);
                    prop_assert_eq!(current, item_count as i64 - 1);
                }

                previous = current;
            }

            prop_assert!(completions <= 1, "implicit completion fired more than once");
            Ok(())
        })?;
    }

    #[test]
    fn in_order_events_complete_the_module(item_count in 1usize..=8) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let store = ProgressStore::new(None);

            for index in 0..item_count as i64 {
                let advance = store
                    .advance_sequential("u1", "module2", index, item_count)
                    .await;
                prop_assert!(advance.advanced);
                prop_assert_eq!(advance.completed_now, index == item_count as i64 - 1);
            }

            let record = store.get_module_state("u1", "module2").await;
            prop_assert!(record.completed);
            prop_assert_eq!(record.last_completed_index, item_count as i64 - 1);
            Ok(())
        })?;
    }

    #[test]
    fn access_list_has_single_playable_frontier(
        item_count in 1usize..=12,
        last_completed in -3i64..=14,
    ) {
        let offsets = std::collections::HashMap::new();
        let access = access_list(item_count, last_completed, &offsets);
        prop_assert_eq!(access.len(), item_count);

        let clamped = clamp_last_completed(last_completed, item_count);
        let playable: Vec<usize> = access
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == ItemAccess::Playable)
            .map(|(idx, _)| idx)
            .collect();

        if clamped == item_count as i64 - 1 {
            prop_assert!(playable.is_empty());
        } else {
            prop_assert_eq!(playable, vec![(clamped + 1) as usize]);
        }

        for (idx, state) in access.iter().enumerate() {
            prop_assert_eq!(
                *state == ItemAccess::Played,
                (idx as i64) <= clamped,
                "played set must match the frontier"
            );
        }
    }

    #[test]
    fn should_advance_only_at_frontier(index in -5i64..=20, last in -5i64..=20) {
        prop_assert_eq!(should_advance(index, last), index == last + 1);
    }
}
