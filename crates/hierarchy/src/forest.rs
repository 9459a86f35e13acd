//! In-memory view of the whole hierarchy used to validate and plan writes.
//!
//! Stores load every node (the tree is small: hundreds of units, not
//! millions), ask the forest what a create or update means, then persist the
//! returned rows in one transaction.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::Serialize;

use calculaud_core::{DomainError, DomainResult, HierarchyId};

use crate::node::{Hierarchy, HierarchyPatch, HierarchyType, NewHierarchy, normalize_name};
use crate::path::compose_path;

/// A validated node that is ready to be inserted (the store assigns the id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedHierarchy {
    pub kind: HierarchyType,
    pub name: String,
    pub parent_id: Option<HierarchyId>,
    pub path: String,
}

impl PreparedHierarchy {
    pub fn into_hierarchy(self, id: HierarchyId) -> Hierarchy {
        Hierarchy {
            id,
            kind: self.kind,
            name: self.name,
            parent_id: self.parent_id,
            path: self.path,
        }
    }
}

/// Nested tree node as returned by the tree endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyTree {
    #[serde(flatten)]
    pub node: Hierarchy,
    pub children: Vec<HierarchyTree>,
}

#[derive(Debug, Clone, Default)]
pub struct HierarchyForest {
    nodes: BTreeMap<HierarchyId, Hierarchy>,
    children: HashMap<Option<HierarchyId>, Vec<HierarchyId>>,
}

impl HierarchyForest {
    pub fn new(nodes: impl IntoIterator<Item = Hierarchy>) -> Self {
        let nodes: BTreeMap<_, _> = nodes.into_iter().map(|n| (n.id, n)).collect();
        let mut children: HashMap<Option<HierarchyId>, Vec<HierarchyId>> = HashMap::new();
        for node in nodes.values() {
            children.entry(node.parent_id).or_default().push(node.id);
        }
        for ids in children.values_mut() {
            ids.sort_by(|a, b| nodes[a].name.cmp(&nodes[b].name).then(a.cmp(b)));
        }
        Self { nodes, children }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: HierarchyId) -> Option<&Hierarchy> {
        self.nodes.get(&id)
    }

    pub fn require(&self, id: HierarchyId) -> DomainResult<&Hierarchy> {
        self.get(id)
            .ok_or_else(|| DomainError::missing("Hierarchy", id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hierarchy> {
        self.nodes.values()
    }

    /// Direct children of `parent` (`None` = roots), sorted by name.
    pub fn children(&self, parent: Option<HierarchyId>) -> Vec<&Hierarchy> {
        self.children
            .get(&parent)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Ancestors of `id`, nearest first. Stops if the stored data has a cycle.
    pub fn ancestors(&self, id: HierarchyId) -> Vec<HierarchyId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.nodes.get(&id).and_then(|n| n.parent_id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            out.push(parent);
            current = self.nodes.get(&parent).and_then(|n| n.parent_id);
        }
        out
    }

    /// All nodes below `id` in breadth-first order (excluding `id`).
    pub fn descendants(&self, id: HierarchyId) -> Vec<HierarchyId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            for child in self.children.get(&Some(next)).into_iter().flatten() {
                if seen.insert(*child) {
                    out.push(*child);
                    queue.push_back(*child);
                }
            }
        }
        out
    }

    /// `id` followed by all of its descendants.
    pub fn subtree_ids(&self, id: HierarchyId) -> Vec<HierarchyId> {
        let mut ids = vec![id];
        ids.extend(self.descendants(id));
        ids
    }

    /// Path derived by walking the parent chain (ignores cached paths).
    ///
    /// `None` for unknown nodes and for nodes caught in a parent cycle.
    pub fn walked_path(&self, id: HierarchyId) -> Option<String> {
        let node = self.nodes.get(&id)?;
        let mut names = vec![node.name.as_str()];
        let mut seen = HashSet::from([id]);
        let mut current = node.parent_id;
        while let Some(parent) = current {
            if !seen.insert(parent) {
                return None;
            }
            let p = self.nodes.get(&parent)?;
            names.push(p.name.as_str());
            current = p.parent_id;
        }
        names.reverse();
        Some(names.join(crate::PATH_SEPARATOR))
    }

    /// Nodes whose cached path disagrees with their parent chain, with the
    /// corrected path. Used to backfill paths after bulk imports.
    pub fn stale_paths(&self) -> Vec<Hierarchy> {
        self.nodes
            .values()
            .filter_map(|node| {
                let walked = self.walked_path(node.id)?;
                (walked != node.path).then(|| Hierarchy {
                    path: walked,
                    ..node.clone()
                })
            })
            .collect()
    }

    /// Validate a new node and compute its path.
    pub fn prepare_create(&self, new: &NewHierarchy) -> DomainResult<PreparedHierarchy> {
        let name = normalize_name(&new.name)?;
        let parent_path = match new.parent_id {
            Some(parent_id) => Some(self.require_parent(parent_id)?.path.as_str()),
            None => None,
        };
        self.ensure_unique_sibling(new.parent_id, &name, None)?;

        Ok(PreparedHierarchy {
            kind: new.kind,
            path: compose_path(parent_path, &name),
            name,
            parent_id: new.parent_id,
        })
    }

    /// Validate an update and return every row it changes.
    ///
    /// The first element is the updated node itself; the rest are descendants
    /// whose path changed because the node was renamed or moved.
    pub fn prepare_update(
        &self,
        id: HierarchyId,
        patch: &HierarchyPatch,
    ) -> DomainResult<Vec<Hierarchy>> {
        let current = self.require(id)?;

        let name = match &patch.name {
            Some(name) => normalize_name(name)?,
            None => current.name.clone(),
        };
        let parent_id = patch.parent_id.unwrap_or(current.parent_id);

        let parent_path = match parent_id {
            Some(parent_id) if parent_id == id => {
                return Err(DomainError::invariant("Hierarchy cannot be its own parent"));
            }
            Some(parent_id) => {
                let parent = self.require_parent(parent_id)?;
                if self.ancestors(parent_id).contains(&id) {
                    return Err(DomainError::invariant(
                        "Cannot move hierarchy under its own descendant",
                    ));
                }
                Some(parent.path.as_str())
            }
            None => None,
        };

        if name != current.name || parent_id != current.parent_id {
            self.ensure_unique_sibling(parent_id, &name, Some(id))?;
        }

        let path = compose_path(parent_path, &name);
        let path_changed = path != current.path;

        let mut changed = vec![Hierarchy {
            id,
            kind: patch.kind.unwrap_or(current.kind),
            name,
            parent_id,
            path: path.clone(),
        }];
        if path_changed {
            self.repath_children(id, &path, &mut changed);
        }
        Ok(changed)
    }

    /// Refuse deleting a node that still has children.
    ///
    /// Purpose ownership is checked by the caller (purposes are not part of
    /// the forest).
    pub fn ensure_deletable(&self, id: HierarchyId) -> DomainResult<()> {
        self.require(id)?;
        let children = self.children(Some(id)).len();
        if children > 0 {
            return Err(DomainError::invariant(format!(
                "Cannot delete hierarchy with {children} children. Please delete children first."
            )));
        }
        Ok(())
    }

    /// Nested tree of all roots, or of the subtree rooted at `root`.
    pub fn tree(&self, root: Option<HierarchyId>) -> DomainResult<Vec<HierarchyTree>> {
        let mut seen = HashSet::new();
        match root {
            Some(id) => {
                let node = self.require(id)?;
                Ok(vec![self.build_tree(node, &mut seen)])
            }
            None => Ok(self
                .children(None)
                .into_iter()
                .map(|node| self.build_tree(node, &mut seen))
                .collect()),
        }
    }

    fn build_tree(&self, node: &Hierarchy, seen: &mut HashSet<HierarchyId>) -> HierarchyTree {
        seen.insert(node.id);
        let children = self
            .children(Some(node.id))
            .into_iter()
            .filter(|child| !seen.contains(&child.id))
            .collect::<Vec<_>>();
        HierarchyTree {
            node: node.clone(),
            children: children
                .into_iter()
                .map(|child| self.build_tree(child, seen))
                .collect(),
        }
    }

    fn repath_children(&self, id: HierarchyId, path: &str, out: &mut Vec<Hierarchy>) {
        for child in self.children(Some(id)) {
            if out.iter().any(|n| n.id == child.id) {
                continue;
            }
            let child_path = compose_path(Some(path), &child.name);
            out.push(Hierarchy {
                path: child_path.clone(),
                ..child.clone()
            });
            self.repath_children(child.id, &child_path, out);
        }
    }

    fn require_parent(&self, parent_id: HierarchyId) -> DomainResult<&Hierarchy> {
        self.get(parent_id)
            .ok_or_else(|| DomainError::missing("Parent hierarchy", parent_id))
    }

    fn ensure_unique_sibling(
        &self,
        parent_id: Option<HierarchyId>,
        name: &str,
        exclude: Option<HierarchyId>,
    ) -> DomainResult<()> {
        let taken = self
            .children(parent_id)
            .into_iter()
            .any(|sibling| Some(sibling.id) != exclude && sibling.name == name);
        if taken {
            return Err(DomainError::conflict(format!(
                "Hierarchy with name '{name}' already exists under this parent"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, kind: HierarchyType, name: &str, parent: Option<i64>, path: &str) -> Hierarchy {
        Hierarchy {
            id: HierarchyId::new(id),
            kind,
            name: name.to_string(),
            parent_id: parent.map(HierarchyId::new),
            path: path.to_string(),
        }
    }

    /// Unit A
    /// ├── Center B
    /// │   └── Team C
    /// └── Center D
    fn fixture() -> HierarchyForest {
        HierarchyForest::new([
            node(1, HierarchyType::Unit, "Unit A", None, "Unit A"),
            node(2, HierarchyType::Center, "Center B", Some(1), "Unit A / Center B"),
            node(3, HierarchyType::Team, "Team C", Some(2), "Unit A / Center B / Team C"),
            node(4, HierarchyType::Center, "Center D", Some(1), "Unit A / Center D"),
        ])
    }

    fn id(v: i64) -> HierarchyId {
        HierarchyId::new(v)
    }

    #[test]
    fn create_under_parent_extends_path() {
        let forest = fixture();
        let prepared = forest
            .prepare_create(&NewHierarchy {
                kind: HierarchyType::Team,
                name: " Team E ".into(),
                parent_id: Some(id(4)),
            })
            .unwrap();
        assert_eq!(prepared.name, "Team E");
        assert_eq!(prepared.path, "Unit A / Center D / Team E");
    }

    #[test]
    fn create_with_missing_parent_is_not_found() {
        let err = fixture()
            .prepare_create(&NewHierarchy {
                kind: HierarchyType::Team,
                name: "X".into(),
                parent_id: Some(id(99)),
            })
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound("Parent hierarchy with ID 99 not found".into()));
    }

    #[test]
    fn duplicate_sibling_name_is_conflict() {
        let err = fixture()
            .prepare_create(&NewHierarchy {
                kind: HierarchyType::Center,
                name: "Center B".into(),
                parent_id: Some(id(1)),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        // Same name elsewhere in the tree is fine.
        assert!(fixture()
            .prepare_create(&NewHierarchy {
                kind: HierarchyType::Center,
                name: "Center B".into(),
                parent_id: Some(id(4)),
            })
            .is_ok());
    }

    #[test]
    fn rename_recomputes_descendant_paths() {
        let forest = fixture();
        let changed = forest
            .prepare_update(
                id(2),
                &HierarchyPatch {
                    name: Some("Center Bee".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let paths: Vec<_> = changed.iter().map(|n| (n.id.get(), n.path.as_str())).collect();
        assert_eq!(
            paths,
            vec![
                (2, "Unit A / Center Bee"),
                (3, "Unit A / Center Bee / Team C"),
            ]
        );
    }

    #[test]
    fn move_to_root_and_under_sibling() {
        let forest = fixture();
        let to_root = forest
            .prepare_update(
                id(2),
                &HierarchyPatch {
                    parent_id: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(to_root[0].path, "Center B");
        assert_eq!(to_root[0].parent_id, None);
        assert_eq!(to_root[1].path, "Center B / Team C");

        let under_d = forest
            .prepare_update(
                id(2),
                &HierarchyPatch {
                    parent_id: Some(Some(id(4))),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(under_d[1].path, "Unit A / Center D / Center B / Team C");
    }

    #[test]
    fn cycles_are_rejected() {
        let forest = fixture();
        let own = forest
            .prepare_update(
                id(2),
                &HierarchyPatch {
                    parent_id: Some(Some(id(2))),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(own, DomainError::invariant("Hierarchy cannot be its own parent"));

        let descendant = forest
            .prepare_update(
                id(1),
                &HierarchyPatch {
                    parent_id: Some(Some(id(3))),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(
            descendant,
            DomainError::invariant("Cannot move hierarchy under its own descendant")
        );
    }

    #[test]
    fn type_only_update_changes_one_row() {
        let changed = fixture()
            .prepare_update(
                id(3),
                &HierarchyPatch {
                    kind: Some(HierarchyType::Mador),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].kind, HierarchyType::Mador);
    }

    #[test]
    fn delete_requires_no_children() {
        let forest = fixture();
        let err = forest.ensure_deletable(id(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot delete hierarchy with 2 children. Please delete children first."
        );
        assert!(forest.ensure_deletable(id(3)).is_ok());
    }

    #[test]
    fn tree_nests_children_by_name() {
        let forest = fixture();
        let roots = forest.tree(None).unwrap();
        assert_eq!(roots.len(), 1);
        let names: Vec<_> = roots[0].children.iter().map(|c| c.node.name.as_str()).collect();
        assert_eq!(names, vec!["Center B", "Center D"]);
        assert_eq!(roots[0].children[0].children[0].node.name, "Team C");

        let sub = forest.tree(Some(id(2))).unwrap();
        assert_eq!(sub[0].children.len(), 1);
        assert!(forest.tree(Some(id(42))).is_err());
    }

    #[test]
    fn subtree_and_ancestors() {
        let forest = fixture();
        let mut sub = forest.subtree_ids(id(1));
        sub.sort();
        assert_eq!(sub, vec![id(1), id(2), id(3), id(4)]);
        assert_eq!(forest.ancestors(id(3)), vec![id(2), id(1)]);
    }

    #[test]
    fn stale_paths_are_detected() {
        let forest = HierarchyForest::new([
            node(1, HierarchyType::Unit, "Unit A", None, "Unit A"),
            node(2, HierarchyType::Center, "Center B", Some(1), "Old / Center B"),
        ]);
        let stale = forest.stale_paths();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].path, "Unit A / Center B");
    }

    #[test]
    fn corrupt_cycle_does_not_loop() {
        let forest = HierarchyForest::new([
            node(1, HierarchyType::Unit, "A", Some(2), "A"),
            node(2, HierarchyType::Unit, "B", Some(1), "B"),
        ]);
        assert_eq!(forest.walked_path(id(1)), None);
        assert_eq!(forest.ancestors(id(1)), vec![id(2)]);
        assert_eq!(forest.tree(Some(id(1))).unwrap()[0].children.len(), 1);
    }
}
