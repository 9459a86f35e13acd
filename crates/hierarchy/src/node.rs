use core::str::FromStr;

use serde::{Deserialize, Serialize};

use calculaud_core::error::check_length;
use calculaud_core::{DomainError, DomainResult, Entity, HierarchyId};

use crate::path::PATH_SEPARATOR;

pub const NAME_MAX_LEN: usize = 200;

/// Organizational level of a node.
///
/// Declaration order is the conventional top-down nesting, though the tree
/// does not enforce it (a TEAM may sit directly under a UNIT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HierarchyType {
    Unit,
    Center,
    Anaf,
    Mador,
    Team,
}

impl HierarchyType {
    pub const ALL: [HierarchyType; 5] = [
        HierarchyType::Unit,
        HierarchyType::Center,
        HierarchyType::Anaf,
        HierarchyType::Mador,
        HierarchyType::Team,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HierarchyType::Unit => "UNIT",
            HierarchyType::Center => "CENTER",
            HierarchyType::Anaf => "ANAF",
            HierarchyType::Mador => "MADOR",
            HierarchyType::Team => "TEAM",
        }
    }
}

impl core::fmt::Display for HierarchyType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HierarchyType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "invalid hierarchy type '{s}' (expected one of UNIT, CENTER, ANAF, MADOR, TEAM)"
                ))
            })
    }
}

/// A node of the organizational tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub id: HierarchyId,
    #[serde(rename = "type")]
    pub kind: HierarchyType,
    pub name: String,
    pub parent_id: Option<HierarchyId>,
    /// Cached `"Root / ... / name"`; maintained by [`crate::HierarchyForest`].
    pub path: String,
}

impl Entity for Hierarchy {
    type Id = HierarchyId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Input for creating a node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewHierarchy {
    #[serde(rename = "type")]
    pub kind: HierarchyType,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<HierarchyId>,
}

/// Partial update of a node.
///
/// `parent_id` distinguishes "not given" (`None`) from "move to root"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyPatch {
    pub kind: Option<HierarchyType>,
    pub name: Option<String>,
    pub parent_id: Option<Option<HierarchyId>>,
}

/// Trim and validate a node name.
pub fn normalize_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    check_length("name", name, 1, NAME_MAX_LEN)?;
    if name.contains(PATH_SEPARATOR) {
        return Err(DomainError::validation(format!(
            "name must not contain the path separator '{}'",
            PATH_SEPARATOR.trim()
        )));
    }
    Ok(name.to_string())
}
