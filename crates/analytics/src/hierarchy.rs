//! Purpose counts per organizational unit for drill-down charts.

use calculaud_core::HierarchyId;
use calculaud_hierarchy::{Hierarchy, HierarchyForest, HierarchyType, is_within};
use calculaud_purposes::PurposeRecord;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyItem {
    pub id: HierarchyId,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: HierarchyType,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyDistribution {
    pub items: Vec<HierarchyItem>,
    pub level: Option<HierarchyType>,
    pub parent_name: Option<String>,
}

/// Picks the nodes to chart and counts the purposes under each one.
///
/// * parent and level: descendants of the parent at that level
/// * parent only: direct children of the parent
/// * neither: every node at `level`, UNIT when unset
///
/// An unknown parent yields no items.
pub fn hierarchy_distribution(
    forest: &HierarchyForest,
    records: &[PurposeRecord],
    parent_id: Option<HierarchyId>,
    level: Option<HierarchyType>,
) -> HierarchyDistribution {
    let (nodes, level, parent_name): (Vec<&Hierarchy>, _, _) = match (parent_id, level) {
        (Some(parent_id), level) => {
            let Some(parent) = forest.get(parent_id) else {
                return HierarchyDistribution { items: Vec::new(), level, parent_name: None };
            };
            let nodes = match level {
                Some(level) => forest
                    .descendants(parent_id)
                    .into_iter()
                    .filter_map(|id| forest.get(id))
                    .filter(|node| node.kind == level)
                    .collect(),
                None => forest.children(Some(parent_id)),
            };
            (nodes, level, Some(parent.name.clone()))
        }
        (None, level) => {
            let level = level.unwrap_or(HierarchyType::Unit);
            let nodes = forest.iter().filter(|node| node.kind == level).collect();
            (nodes, Some(level), None)
        }
    };

    let purpose_paths: Vec<&str> = records
        .iter()
        .filter_map(|record| {
            record
                .purpose
                .hierarchy_id
                .and_then(|id| forest.get(id))
                .or(record.hierarchy.as_ref())
                .map(|h| h.path.as_str())
        })
        .collect();

    let mut items: Vec<_> = nodes
        .into_iter()
        .map(|node| HierarchyItem {
            id: node.id,
            name: node.name.clone(),
            path: node.path.clone(),
            kind: node.kind,
            count: purpose_paths.iter().filter(|p| is_within(p, &node.path)).count() as u64,
        })
        .collect();
    items.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    HierarchyDistribution { items, level, parent_name }
}
