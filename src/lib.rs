//! EVE industry bill-of-materials engine
//!
//! Expands an item into its production tree from user recipes and the SDE,
//! flattens the tree into raw material totals and sequences the
//! manufacturing jobs it implies.

pub mod builder;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod db;
pub mod efficiency;
pub mod error;
pub mod flatten;
pub mod logging;
pub mod models;
pub mod report;
pub mod repository;
pub mod sde;
pub mod sequencer;

pub use builder::{BomEngine, BomRequest};
pub use cache::ResolutionCache;
pub use classifier::RawMaterialClassifier;
pub use config::{EngineConfig, FacilityConstraints};
pub use error::{BomError, Result};
pub use flatten::flatten;
pub use models::{FlatBom, ItemId, MaterialNode, Operation, RecipeSource, SourceKind};
pub use repository::{MemoryRepository, RecipeRepository, SqliteRepository};
pub use sequencer::{sequence, Schedule, SlotConflict};
