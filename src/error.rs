//! Error types for BOM resolution

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BomError>;

/// Hard failures abort the whole build; soft conditions (unresolved items,
/// slot conflicts) are reported on the result instead.
#[derive(Debug, Error)]
pub enum BomError {
    #[error("cycle detected in recipe chain: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("maximum depth {max_depth} reached at: {}", .path.join(" -> "))]
    DepthExceeded { max_depth: usize, path: Vec<String> },

    #[error("invalid quantity {quantity} requested for '{item}'")]
    InvalidQuantity { item: String, quantity: f64 },

    #[error("invalid item name '{0}'")]
    InvalidItemName(String),

    #[error("recipe for '{item}' lists '{material}' with invalid quantity {quantity}")]
    InvalidMaterial {
        item: String,
        material: String,
        quantity: f64,
    },

    #[error("invalid facility constraint: {0}")]
    InvalidConstraint(String),

    #[error("recipe store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("malformed stored material list: {0}")]
    Json(#[from] serde_json::Error),
}

impl BomError {
    /// Item path attached to cycle and depth failures
    pub fn item_path(&self) -> Option<&[String]> {
        match self {
            BomError::CycleDetected { path } | BomError::DepthExceeded { path, .. } => Some(path),
            _ => None,
        }
    }
}
