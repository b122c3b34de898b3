//! # Dependency resolver: safe visitation order with cycle detection.
//!
//! [`resolve_order`] computes, for a set of requested keys, the dependency
//! closure in an order where every dependency precedes its dependents.
//! Traversal is depth-first post-order with a **per-branch ancestor path**
//! rather than a global visited set: diamond dependencies are revisited
//! safely across sibling branches, while a revisit within the current path
//! raises a cycle error carrying the offending target and the path.
//!
//! Errors are raised eagerly — before any module is touched — so resolution
//! is all-or-nothing.

use indexmap::IndexSet;

use crate::error::LifecycleError;

use super::module::{ModuleKey, SystemMap};

/// Returns the dependency closure of `keys` in dependency-first order.
///
/// The result across multiple input keys is the concatenation of each key's
/// closure, deduplicated keeping first occurrence — a valid topological order,
/// since anything a later key depends on is either new (emitted before the
/// later key) or already emitted by an earlier key.
///
/// # Errors
/// - [`LifecycleError::Cycle`] when a dependency chain loops back into the
///   current path (a module depending on itself included);
/// - [`LifecycleError::Unknown`] when a requested key or declared dependency
///   is not defined in the system map.
pub fn resolve_order(
    system: &SystemMap,
    keys: &[ModuleKey],
) -> Result<Vec<ModuleKey>, LifecycleError> {
    let mut order: IndexSet<ModuleKey> = IndexSet::new();
    for key in keys {
        let mut path: IndexSet<ModuleKey> = IndexSet::new();
        visit(system, key, None, &mut path, &mut order)?;
    }
    Ok(order.into_iter().collect())
}

fn visit(
    system: &SystemMap,
    key: &ModuleKey,
    required_by: Option<&ModuleKey>,
    path: &mut IndexSet<ModuleKey>,
    order: &mut IndexSet<ModuleKey>,
) -> Result<(), LifecycleError> {
    if path.contains(key.as_ref()) {
        return Err(LifecycleError::Cycle {
            target: key.clone(),
            path: path.iter().cloned().collect(),
        });
    }
    if order.contains(key.as_ref()) {
        // Already fully enumerated (and cycle-checked) under an earlier
        // branch; keeping the first occurrence preserves the order.
        return Ok(());
    }
    let Some(module) = system.get(key) else {
        return Err(LifecycleError::Unknown {
            key: key.clone(),
            required_by: required_by.cloned(),
        });
    };

    path.insert(key.clone());
    for dep in module.deps() {
        visit(system, dep, Some(key), path, order)?;
    }
    path.pop();

    order.insert(key.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Module;

    fn keys(list: &[&str]) -> Vec<ModuleKey> {
        list.iter().map(|k| ModuleKey::from(*k)).collect()
    }

    fn names(order: &[ModuleKey]) -> Vec<&str> {
        order.iter().map(|k| k.as_ref()).collect()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let system = SystemMap::new()
            .with("db", Module::new())
            .with("cache", Module::new().with_deps(["db"]))
            .with("web", Module::new().with_deps(["cache", "db"]));

        let order = resolve_order(&system, &keys(&["web"])).unwrap();
        assert_eq!(names(&order), vec!["db", "cache", "web"]);
    }

    #[test]
    fn test_diamond_emits_no_duplicates() {
        let system = SystemMap::new()
            .with("base", Module::new())
            .with("left", Module::new().with_deps(["base"]))
            .with("right", Module::new().with_deps(["base"]))
            .with("top", Module::new().with_deps(["left", "right"]));

        let order = resolve_order(&system, &keys(&["top"])).unwrap();
        assert_eq!(names(&order), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn test_multi_key_concatenation_keeps_first_occurrence() {
        let system = SystemMap::new()
            .with("shared", Module::new())
            .with("a", Module::new().with_deps(["shared"]))
            .with("b", Module::new().with_deps(["shared"]));

        let order = resolve_order(&system, &keys(&["a", "b"])).unwrap();
        assert_eq!(names(&order), vec!["shared", "a", "b"]);
    }

    #[test]
    fn test_requested_key_with_no_deps() {
        let system = SystemMap::new().with("solo", Module::new());
        let order = resolve_order(&system, &keys(&["solo"])).unwrap();
        assert_eq!(names(&order), vec!["solo"]);
    }

    #[test]
    fn test_cycle_is_detected_with_path() {
        let system = SystemMap::new()
            .with("a", Module::new().with_deps(["b"]))
            .with("b", Module::new().with_deps(["c"]))
            .with("c", Module::new().with_deps(["a"]));

        match resolve_order(&system, &keys(&["a"])) {
            Err(LifecycleError::Cycle { target, path }) => {
                assert_eq!(target.as_ref(), "a");
                assert_eq!(names(&path), vec!["a", "b", "c"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let system = SystemMap::new().with("narcissus", Module::new().with_deps(["narcissus"]));
        match resolve_order(&system, &keys(&["narcissus"])) {
            Err(LifecycleError::Cycle { target, .. }) => {
                assert_eq!(target.as_ref(), "narcissus");
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency_names_the_dependent() {
        let system = SystemMap::new().with("web", Module::new().with_deps(["ghost"]));
        match resolve_order(&system, &keys(&["web"])) {
            Err(LifecycleError::Unknown { key, required_by }) => {
                assert_eq!(key.as_ref(), "ghost");
                assert_eq!(required_by.as_deref(), Some("web"));
            }
            other => panic!("expected unknown-module error, got {other:?}"),
        }
    }

    #[test]
    fn test_diamond_with_cycle_still_detected() {
        // The cycle hides behind a shared dependency.
        let system = SystemMap::new()
            .with("a", Module::new().with_deps(["b", "c"]))
            .with("b", Module::new().with_deps(["d"]))
            .with("c", Module::new().with_deps(["d"]))
            .with("d", Module::new().with_deps(["a"]));

        assert!(matches!(
            resolve_order(&system, &keys(&["a"])),
            Err(LifecycleError::Cycle { .. })
        ));
    }
}
