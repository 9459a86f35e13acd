//! Materialized path helpers.

/// Separator between node names in a cached path (`"Unit / Center / Team"`).
pub const PATH_SEPARATOR: &str = " / ";

/// Path of a node named `name` under a parent with `parent_path`.
pub fn compose_path(parent_path: Option<&str>, name: &str) -> String {
    match parent_path {
        Some(parent) => format!("{parent}{PATH_SEPARATOR}{name}"),
        None => name.to_string(),
    }
}

/// Whether `path` is `ancestor_path` itself or lies below it.
///
/// A plain prefix test would also accept a sibling whose name starts with the
/// ancestor's name ("Ops" vs "Ops-2"), so the separator is part of the match.
pub fn is_within(path: &str, ancestor_path: &str) -> bool {
    match path.strip_prefix(ancestor_path) {
        Some("") => true,
        Some(rest) => rest.starts_with(PATH_SEPARATOR),
        None => false,
    }
}

/// Re-root `path` from `old_prefix` to `new_prefix`.
///
/// Returns `None` when `path` is not within `old_prefix`.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if !is_within(path, old_prefix) {
        return None;
    }
    let rest = &path[old_prefix.len()..];
    Some(format!("{new_prefix}{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn root_path_is_its_name() {
        assert_eq!(compose_path(None, "Unit A"), "Unit A");
        assert_eq!(compose_path(Some("Unit A"), "Team 1"), "Unit A / Team 1");
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_within() {
        assert!(is_within("Ops", "Ops"));
        assert!(is_within("Ops / Team", "Ops"));
        assert!(!is_within("Ops-2", "Ops"));
        assert!(!is_within("Ops-2 / Team", "Ops"));
        assert!(!is_within("Op", "Ops"));
    }

    #[test]
    fn rebase_moves_descendants() {
        assert_eq!(
            rebase("A / B / C", "A / B", "X / B").as_deref(),
            Some("X / B / C")
        );
        assert_eq!(rebase("A / BB", "A / B", "X"), None);
    }

    fn name() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 _-]{1,12}".prop_filter("no separator", |s| !s.contains(PATH_SEPARATOR))
    }

    proptest! {
        #[test]
        fn composed_child_is_within_parent(parent in name(), child in name()) {
            let child_path = compose_path(Some(&parent), &child);
            prop_assert!(is_within(&child_path, &parent));
            prop_assert!(!is_within(&parent, &child_path));
        }

        #[test]
        fn rebase_preserves_suffix(a in name(), b in name(), c in name(), x in name()) {
            let old = compose_path(Some(&a), &b);
            let path = compose_path(Some(&old), &c);
            let new_prefix = compose_path(Some(&x), &b);
            let moved = rebase(&path, &old, &new_prefix).unwrap();
            prop_assert_eq!(moved, compose_path(Some(&new_prefix), &c));
        }
    }
}
