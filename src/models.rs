//! Data models for recipes, BOM trees and manufacturing operations

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result as AnyResult};
use regex::Regex;
use serde::Serialize;

use crate::error::{BomError, Result};

/// Validated item name as it appears in recipes and the SDE `types` table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        // The SDE exports missing names as "nan"
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("nan")
            || trimmed.chars().any(char::is_control)
        {
            return Err(BomError::InvalidItemName(name));
        }
        if trimmed.len() == name.len() {
            Ok(Self(name))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for ItemId {
    type Err = BomError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// One input of a recipe: `quantity` units of `item` per run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialLine {
    pub item: ItemId,
    pub quantity: f64,
}

/// Validate raw `(name, quantity)` pairs coming out of storage or user input.
///
/// Duplicate names are merged by summing, first occurrence keeps its position.
pub fn validate_materials<I, S>(owner: &str, entries: I) -> Result<Vec<MaterialLine>>
where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
{
    let mut lines: Vec<MaterialLine> = Vec::new();
    for (name, quantity) in entries {
        let name = name.into();
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(BomError::InvalidMaterial {
                item: owner.to_string(),
                material: name,
                quantity,
            });
        }
        let item = ItemId::new(name)?;
        match lines.iter_mut().find(|line| line.item == item) {
            Some(existing) => existing.quantity += quantity,
            None => lines.push(MaterialLine { item, quantity }),
        }
    }
    Ok(lines)
}

/// Parse a material list such as `"Tritanium:2000, Pyerite:1000"`.
///
/// Accepts `:`, `=` or `x` as the separator between name and quantity.
pub fn parse_material_list(owner: &str, text: &str) -> AnyResult<Vec<MaterialLine>> {
    let entry_re = Regex::new(r"^\s*(.+?)\s*(?::|=|\sx)\s*([0-9]+(?:\.[0-9]+)?)\s*$")?;

    let mut entries = Vec::new();
    for raw in text.split(',').filter(|s| !s.trim().is_empty()) {
        let cap = entry_re
            .captures(raw)
            .ok_or_else(|| anyhow!("cannot parse material entry '{}'", raw.trim()))?;
        let quantity: f64 = cap[2].parse()?;
        entries.push((cap[1].to_string(), quantity));
    }

    Ok(validate_materials(owner, entries)?)
}

/// Kind of user-authored recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecipeKind {
    /// Blueprint original
    Bpo,
    /// Blueprint copy
    Bpc,
    /// Planetary interaction schematic
    Pi,
}

impl RecipeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeKind::Bpo => "BPO",
            RecipeKind::Bpc => "BPC",
            RecipeKind::Pi => "PI",
        }
    }
}

impl FromStr for RecipeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> AnyResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BPO" => Ok(RecipeKind::Bpo),
            "BPC" => Ok(RecipeKind::Bpc),
            "PI" => Ok(RecipeKind::Pi),
            other => Err(anyhow!("unknown recipe type '{}' (expected BPO, BPC or PI)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecipe {
    pub name: ItemId,
    pub kind: RecipeKind,
    pub base_item: Option<String>,
    /// ME level the material quantities were recorded at
    pub me_level: u8,
    /// TE level the production time was recorded at
    pub te_level: u8,
    pub output_per_run: u32,
    pub production_time_s: Option<f64>,
    pub materials: Vec<MaterialLine>,
    /// Informational only
    pub upgrade_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillRequirement {
    pub skill_type_id: i64,
    pub level: u8,
}

/// Manufacturing activity of one SDE blueprint
#[derive(Debug, Clone, PartialEq)]
pub struct SdeRecipe {
    pub blueprint_type_id: i64,
    pub blueprint_name: String,
    pub product: ItemId,
    pub output_per_run: u32,
    pub base_time_s: f64,
    pub materials: Vec<MaterialLine>,
    /// Informational only
    pub skills: Vec<SkillRequirement>,
}

/// Where a recipe may be looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecipeSource {
    UserRecipe,
    SdeReference,
}

impl FromStr for RecipeSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> AnyResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "recipe" | "user_recipe" => Ok(RecipeSource::UserRecipe),
            "sde" | "reference" | "sde_reference" => Ok(RecipeSource::SdeReference),
            other => Err(anyhow!("unknown recipe source '{}' (expected user or sde)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recipe {
    User(UserRecipe),
    Sde(SdeRecipe),
}

impl Recipe {
    pub fn source(&self) -> RecipeSource {
        match self {
            Recipe::User(_) => RecipeSource::UserRecipe,
            Recipe::Sde(_) => RecipeSource::SdeReference,
        }
    }

    pub fn materials(&self) -> &[MaterialLine] {
        match self {
            Recipe::User(r) => &r.materials,
            Recipe::Sde(r) => &r.materials,
        }
    }

    pub fn output_per_run(&self) -> u32 {
        let declared = match self {
            Recipe::User(r) => r.output_per_run,
            Recipe::Sde(r) => r.output_per_run,
        };
        declared.max(1)
    }

    /// ME level the stored quantities assume. SDE rows are unresearched.
    pub fn recorded_me_level(&self) -> u8 {
        match self {
            Recipe::User(r) => r.me_level,
            Recipe::Sde(_) => 0,
        }
    }

    pub fn recorded_te_level(&self) -> u8 {
        match self {
            Recipe::User(r) => r.te_level,
            Recipe::Sde(_) => 0,
        }
    }

    pub fn time_per_run_s(&self) -> f64 {
        match self {
            Recipe::User(r) => r.production_time_s.unwrap_or(0.0),
            Recipe::Sde(r) => r.base_time_s,
        }
    }
}

/// Outcome of a recipe lookup
#[derive(Debug, Clone, PartialEq)]
pub enum RecipeResult {
    Found(Recipe),
    NotFound,
}

impl RecipeResult {
    pub fn recipe(&self) -> Option<&Recipe> {
        match self {
            RecipeResult::Found(recipe) => Some(recipe),
            RecipeResult::NotFound => None,
        }
    }
}

/// Provenance of a node in the BOM tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    UserRecipe,
    SdeReference,
    /// Allow-listed raw material, never expanded
    RawMaterial,
    /// No recipe found anywhere; treated as raw but flagged
    Unresolved,
}

impl From<RecipeSource> for SourceKind {
    fn from(source: RecipeSource) -> Self {
        match source {
            RecipeSource::UserRecipe => SourceKind::UserRecipe,
            RecipeSource::SdeReference => SourceKind::SdeReference,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceKind::UserRecipe => "recipe",
            SourceKind::SdeReference => "sde",
            SourceKind::RawMaterial => "raw",
            SourceKind::Unresolved => "unresolved",
        };
        f.write_str(label)
    }
}

/// One item at one point of the expansion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialNode {
    pub item_name: ItemId,
    pub quantity_required: f64,
    pub is_raw_material: bool,
    pub source_kind: SourceKind,
    pub output_per_run: u32,
    /// TE-adjusted duration of a single run
    pub time_per_run_seconds: f64,
    pub production_time_seconds: f64,
    pub children: Vec<MaterialNode>,
}

impl MaterialNode {
    pub fn is_unresolved(&self) -> bool {
        self.source_kind == SourceKind::Unresolved
    }

    /// Number of nodes in this subtree, including `self`
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(MaterialNode::node_count).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(MaterialNode::depth).max().unwrap_or(0)
    }
}

/// Totals derived from a BOM tree
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatBom {
    /// Raw material -> total quantity across the whole tree
    pub raw_materials: BTreeMap<ItemId, f64>,
    /// Manufactured sub-component -> total quantity built (root excluded)
    pub intermediates: BTreeMap<ItemId, f64>,
    /// Leaves that had no recipe data
    pub unresolved: BTreeSet<ItemId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ActivityKind {
    Manufacturing,
    /// Never sequenced; only selects a facility's research slot count
    Research,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::Manufacturing => f.write_str("manufacturing"),
            ActivityKind::Research => f.write_str("research"),
        }
    }
}

/// One scheduled manufacturing job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub id: usize,
    pub item_name: ItemId,
    pub kind: ActivityKind,
    pub run_count: u32,
    pub duration_seconds: f64,
    pub depends_on: BTreeSet<usize>,
    pub earliest_start_seconds: f64,
    pub finish_seconds: f64,
}

/// A station or structure that hosts industry jobs
#[derive(Debug, Clone, PartialEq)]
pub struct Facility {
    pub name: String,
    pub system: Option<String>,
    pub manufacturing_slots: u32,
    pub research_slots: u32,
    pub time_bonus_fraction: f64,
}
