//! Purposes domain module.
//!
//! A purpose is a procurement request owned by one hierarchy node. It carries
//! a status lifecycle with history, the catalog services being procured, and
//! EMF financial documents whose costs are tracked in three currencies.
//!
//! Everything here is deterministic domain logic (no IO, no HTTP, no storage).
//! Time is always passed in by the caller.

pub mod cost;
pub mod currency;
pub mod emf;
pub mod filter;
pub mod purpose;
pub mod record;
pub mod status;
pub mod stuck;

pub use cost::{Cost, CostPatch, NewCost};
pub use currency::{Currency, CurrencyAmounts, ExchangeRate, MultiCurrencyAmount};
pub use emf::{Emf, EmfPatch, NewEmf};
pub use filter::{PurposeFilter, PurposeQuery, PurposeSort};
pub use purpose::{ContentLine, NewPurpose, Purpose, PurposeChange, PurposePatch};
pub use record::{PurposeContent, PurposeRecord};
pub use status::{PurposeStatus, StatusChange};
pub use stuck::{StuckPolicy, StuckReport};
