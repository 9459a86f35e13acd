//! Filtering and sorting for the hierarchy list endpoint.

use serde::Deserialize;

use calculaud_core::{HierarchyId, SortOrder};

use crate::node::{Hierarchy, HierarchyType};

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchySort {
    Id,
    Name,
    #[default]
    Path,
    Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyQuery {
    pub kind: Option<HierarchyType>,
    pub parent_id: Option<HierarchyId>,
    /// Case-insensitive substring of name or path.
    pub search: Option<String>,
    pub sort_by: HierarchySort,
    pub sort_order: SortOrder,
}

impl Default for HierarchyQuery {
    fn default() -> Self {
        Self {
            kind: None,
            parent_id: None,
            search: None,
            sort_by: HierarchySort::Path,
            sort_order: SortOrder::Asc,
        }
    }
}

impl HierarchyQuery {
    pub fn matches(&self, node: &Hierarchy) -> bool {
        if self.kind.is_some_and(|k| k != node.kind) {
            return false;
        }
        if self.parent_id.is_some() && self.parent_id != node.parent_id {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                node.name.to_lowercase().contains(&term) || node.path.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }

    /// Filter then sort; ties fall back to id so pages are stable.
    pub fn apply<'a>(&self, nodes: impl IntoIterator<Item = &'a Hierarchy>) -> Vec<Hierarchy> {
        let mut out: Vec<Hierarchy> = nodes.into_iter().filter(|n| self.matches(n)).cloned().collect();
        out.sort_by(|a, b| {
            let primary = match self.sort_by {
                HierarchySort::Id => a.id.cmp(&b.id),
                HierarchySort::Name => a.name.cmp(&b.name),
                HierarchySort::Path => a.path.cmp(&b.path),
                HierarchySort::Type => a.kind.cmp(&b.kind),
            };
            self.sort_order.apply(primary.then(a.id.cmp(&b.id)))
        });
        out
    }
}
