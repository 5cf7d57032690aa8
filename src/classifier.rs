//! Raw material classification

use std::collections::HashSet;

use crate::models::{ItemId, RecipeResult};

/// Minerals, moon materials, planetary commodities, datacores and fuel
/// basics that are bought or mined rather than manufactured.
const BUILTIN_RAW_MATERIALS: &[&str] = &[
    // Minerals
    "Tritanium",
    "Pyerite",
    "Mexallon",
    "Isogen",
    "Nocxium",
    "Zydrine",
    "Megacyte",
    "Morphite",
    // Advanced materials
    "Crystalline Carbonide",
    "Titanium Carbide",
    "Tungsten Carbide",
    "Fernite Carbide",
    "Sylramic Fibers",
    "Fullerides",
    "Phenolic Composites",
    // Moon materials
    "Atmospheric Gases",
    "Evaporite Deposits",
    "Hydrocarbons",
    "Silicates",
    "Cobalt",
    "Scandium",
    "Titanium",
    "Tungsten",
    // Planetary commodities
    "Plasmoids",
    "Oxides",
    "Oxygen",
    "Hydrogen",
    "Helium",
    "Water",
    // Datacores
    "Datacore - Mechanical Engineering",
    "Datacore - Electronic Engineering",
    "Datacore - Rocket Science",
    "Datacore - Nuclear Physics",
];

/// Decides whether an item terminates the expansion
#[derive(Debug, Clone)]
pub struct RawMaterialClassifier {
    allow_list: HashSet<ItemId>,
}

impl Default for RawMaterialClassifier {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl RawMaterialClassifier {
    /// Classifier with no allow-list at all
    pub fn empty() -> Self {
        Self {
            allow_list: HashSet::new(),
        }
    }

    pub fn with_builtin() -> Self {
        let mut classifier = Self::empty();
        classifier.extend(
            BUILTIN_RAW_MATERIALS
                .iter()
                .filter_map(|name| ItemId::new(*name).ok()),
        );
        classifier
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = ItemId>) {
        self.allow_list.extend(items);
    }

    pub fn is_allow_listed(&self, item: &ItemId) -> bool {
        self.allow_list.contains(item)
    }

    /// An item is raw when it is allow-listed, has no recipe, or its recipe
    /// has no inputs. The allow-list wins over any recipe.
    pub fn is_raw(&self, item: &ItemId, lookup: &RecipeResult) -> bool {
        if self.is_allow_listed(item) {
            return true;
        }
        match lookup {
            RecipeResult::NotFound => true,
            RecipeResult::Found(recipe) => recipe.materials().is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.allow_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allow_list.is_empty()
    }
}
