//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Entities in this system are relational rows keyed by an integer surrogate,
/// so identifiers are cheap `Copy` values with a total order (stores keep
/// them in ordered maps to get deterministic listing).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
