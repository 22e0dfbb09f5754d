//! Reachability logic: given the static world data, compute for every flag
//! and item check the DNF requirement (in terms of other flags and items)
//! sufficient to reach and collect it.
//!
//! The build is a single synchronous pass: terrain derivation, tile
//! canonicalization, neighbor indexing, a worklist fixpoint over routes, and
//! finally check resolution into the requirement map consumed by the item
//! placement search.

pub mod requirement;
pub mod settings;
pub mod terrain;
pub mod tile;
pub mod union_find;
pub mod world;

pub use requirement::{Condition, Requirement, RequirementBuilder, Route};
pub use settings::LogicSettings;
pub use world::{ItemInfo, LocationList, SlotInfo, World};
