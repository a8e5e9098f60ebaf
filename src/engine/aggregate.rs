//! Derived dashboard metrics computed from the set of completed modules.
//! Display-only values; nothing here feeds back into gating.

use std::collections::HashSet;

use crate::engine::types::CORE_MODULES;

/// Rounded completion percentage over the given catalog. An empty catalog
/// yields 0 rather than dividing by zero.
pub fn percent_complete(catalog: &[&str], completed: &HashSet<String>) -> u8 {
    if catalog.is_empty() {
        return 0;
    }
    let done = catalog
        .iter()
        .filter(|module_id| completed.contains(**module_id))
        .count();
    ((done as f64 / catalog.len() as f64) * 100.0).round() as u8
}

pub fn active_module_count(catalog: &[&str], completed: &HashSet<String>) -> usize {
    let done = catalog
        .iter()
        .filter(|module_id| completed.contains(**module_id))
        .count();
    catalog.len() - done
}

/// Index of the first core module not yet completed, or the last index once
/// everything is done.
pub fn current_module_index(completed: &HashSet<String>) -> usize {
    CORE_MODULES
        .iter()
        .position(|module_id| !completed.contains(*module_id))
        .unwrap_or(CORE_MODULES.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_percent_complete_rounding() {
        let catalog = ["m1", "m2", "m3"];
        assert_eq!(percent_complete(&catalog, &set(&["m1"])), 33);
        assert_eq!(percent_complete(&catalog, &set(&["m1", "m2"])), 67);
        assert_eq!(percent_complete(&catalog, &set(&["m1", "m2", "m3"])), 100);
    }

    #[test]
    fn test_percent_complete_empty_catalog() {
        assert_eq!(percent_complete(&[], &set(&[])), 0);
        assert_eq!(percent_complete(&[], &set(&["m1"])), 0);
    }

    #[test]
    fn test_percent_ignores_unknown_modules() {
        let catalog = ["m1", "m2"];
        assert_eq!(percent_complete(&catalog, &set(&["m1", "stray"])), 50);
    }

    #[test]
    fn test_active_module_count() {
        let catalog = ["m1", "m2", "m3"];
        assert_eq!(active_module_count(&catalog, &set(&[])), 3);
        assert_eq!(active_module_count(&catalog, &set(&["m2"])), 2);
        assert_eq!(active_module_count(&catalog, &set(&["m1", "m2", "m3"])), 0);
    }

    #[test]
    fn test_current_module_index() {
        assert_eq!(current_module_index(&set(&[])), 0);
        assert_eq!(current_module_index(&set(&["module1"])), 1);
        assert_eq!(current_module_index(&set(&["module1", "module2"])), 2);
        assert_eq!(
            current_module_index(&set(&["module1", "module2", "module3"])),
            2
        );
        // Out-of-order completion still points at the earliest gap.
        assert_eq!(current_module_index(&set(&["module2"])), 0);
    }
}
