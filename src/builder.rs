//! BOM tree construction
//!
//! Expands a requested item depth-first into its full production tree,
//! mixing user recipes and SDE blueprints. Quantities scale continuously;
//! discrete runs are only introduced by the sequencer.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{Fragment, FragmentKey, LookupKey, ResolutionCache};
use crate::classifier::RawMaterialClassifier;
use crate::config::{EngineConfig, DEFAULT_MAX_DEPTH};
use crate::efficiency;
use crate::error::{BomError, Result};
use crate::models::{ItemId, MaterialLine, MaterialNode, RecipeResult, RecipeSource, SourceKind};
use crate::repository::RecipeRepository;

/// Parameters of one BOM query
#[derive(Debug, Clone, PartialEq)]
pub struct BomRequest {
    pub item: String,
    pub quantity: f64,
    pub me_level: Option<u8>,
    pub te_level: Option<u8>,
    pub max_depth: usize,
    pub source_preference: Option<RecipeSource>,
}

impl BomRequest {
    pub fn new(item: impl Into<String>, quantity: f64) -> Self {
        Self {
            item: item.into(),
            quantity,
            me_level: None,
            te_level: None,
            max_depth: DEFAULT_MAX_DEPTH,
            source_preference: None,
        }
    }

    pub fn me_level(mut self, level: u8) -> Self {
        self.me_level = Some(level);
        self
    }

    pub fn te_level(mut self, level: u8) -> Self {
        self.te_level = Some(level);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn prefer(mut self, source: RecipeSource) -> Self {
        self.source_preference = Some(source);
        self
    }
}

/// Ancestors of the node being expanded, root first
#[derive(Default)]
struct AncestorPath {
    order: Vec<ItemId>,
    members: HashSet<ItemId>,
}

impl AncestorPath {
    fn contains(&self, item: &ItemId) -> bool {
        self.members.contains(item)
    }

    fn push(&mut self, item: ItemId) {
        self.members.insert(item.clone());
        self.order.push(item);
    }

    fn pop(&mut self) {
        if let Some(item) = self.order.pop() {
            self.members.remove(&item);
        }
    }

    /// The path with `last` appended, for error reports
    fn trail(&self, last: &ItemId) -> Vec<String> {
        self.order
            .iter()
            .chain(std::iter::once(last))
            .map(|item| item.to_string())
            .collect()
    }
}

pub struct BomEngine<R> {
    repository: R,
    classifier: RawMaterialClassifier,
    cache: Arc<ResolutionCache>,
    config: EngineConfig,
}

impl<R: RecipeRepository> BomEngine<R> {
    pub fn new(repository: R, classifier: RawMaterialClassifier, config: EngineConfig) -> Self {
        Self {
            repository,
            classifier,
            cache: Arc::new(ResolutionCache::new()),
            config,
        }
    }

    /// Share a cache with other engines over the same data
    pub fn with_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// A request carrying this engine's configured defaults
    pub fn request(&self, item: impl Into<String>, quantity: f64) -> BomRequest {
        BomRequest {
            item: item.into(),
            quantity,
            me_level: self.config.me_level,
            te_level: self.config.te_level,
            max_depth: self.config.max_depth,
            source_preference: self.config.source_preference,
        }
    }

    /// Build the production tree for `request`
    pub fn build(&self, request: &BomRequest) -> Result<MaterialNode> {
        let item = ItemId::new(request.item.as_str())?;
        if !request.quantity.is_finite() || request.quantity <= 0.0 {
            return Err(BomError::InvalidQuantity {
                item: item.to_string(),
                quantity: request.quantity,
            });
        }

        let mut path = AncestorPath::default();
        let root = self.expand(item, request.quantity, 0, request, &mut path)?;

        let stats = self.cache.stats();
        info!(
            item = %root.item_name,
            quantity = request.quantity,
            nodes = root.node_count(),
            depth = root.depth(),
            cache_hits = stats.hits,
            cache_misses = stats.misses,
            "BOM tree built"
        );
        Ok(root)
    }

    fn expand(
        &self,
        item: ItemId,
        quantity: f64,
        depth: usize,
        request: &BomRequest,
        path: &mut AncestorPath,
    ) -> Result<MaterialNode> {
        if path.contains(&item) {
            return Err(BomError::CycleDetected {
                path: path.trail(&item),
            });
        }
        if depth >= request.max_depth {
            return Err(BomError::DepthExceeded {
                max_depth: request.max_depth,
                path: path.trail(&item),
            });
        }

        let fragment = self.resolve(&item, request)?;

        if fragment.is_raw {
            if fragment.source_kind == SourceKind::Unresolved {
                warn!(item = %item, "no recipe found; treating as raw material");
            }
            return Ok(MaterialNode {
                item_name: item,
                quantity_required: quantity,
                is_raw_material: true,
                source_kind: fragment.source_kind,
                output_per_run: fragment.output_per_run,
                time_per_run_seconds: 0.0,
                production_time_seconds: 0.0,
                children: Vec::new(),
            });
        }

        let runs = quantity / f64::from(fragment.output_per_run);
        debug!(item = %item, quantity, runs, source = %fragment.source_kind, depth, "expanding");

        path.push(item.clone());
        let mut children = Vec::with_capacity(fragment.materials.len());
        for line in &fragment.materials {
            let required = runs * line.quantity;
            children.push(self.expand(line.item.clone(), required, depth + 1, request, path)?);
        }
        path.pop();

        Ok(MaterialNode {
            item_name: item,
            quantity_required: quantity,
            is_raw_material: false,
            source_kind: fragment.source_kind,
            output_per_run: fragment.output_per_run,
            time_per_run_seconds: fragment.time_per_run_seconds,
            production_time_seconds: fragment.time_per_run_seconds * runs,
            children,
        })
    }

    /// One level of expansion for `item`, memoized per efficiency levels
    pub fn resolve(&self, item: &ItemId, request: &BomRequest) -> Result<Arc<Fragment>> {
        let key = FragmentKey {
            item: item.clone(),
            me_level: request.me_level,
            te_level: request.te_level,
            preferred: request.source_preference,
        };
        if let Some(fragment) = self.cache.fragment(&key) {
            return Ok(fragment);
        }

        let generation = self.cache.generation();
        let lookup = self.lookup(item, request.source_preference)?;
        let fragment = self.make_fragment(item, &lookup, request);
        Ok(self.cache.store_fragment(key, fragment, generation))
    }

    fn lookup(&self, item: &ItemId, preferred: Option<RecipeSource>) -> Result<Arc<RecipeResult>> {
        let key = LookupKey {
            item: item.clone(),
            preferred,
        };
        if let Some(result) = self.cache.lookup(&key) {
            return Ok(result);
        }
        // Not under the lock; an invalidation during the read discards the insert
        let generation = self.cache.generation();
        let result = self.repository.lookup(item, preferred)?;
        Ok(self.cache.store_lookup(key, result, generation))
    }

    fn make_fragment(&self, item: &ItemId, lookup: &RecipeResult, request: &BomRequest) -> Fragment {
        let is_raw = self.classifier.is_raw(item, lookup);
        let source_kind = if self.classifier.is_allow_listed(item) {
            SourceKind::RawMaterial
        } else {
            match lookup {
                RecipeResult::Found(recipe) => recipe.source().into(),
                RecipeResult::NotFound => SourceKind::Unresolved,
            }
        };

        let Some(recipe) = lookup.recipe().filter(|_| !is_raw) else {
            return Fragment {
                source_kind,
                is_raw: true,
                output_per_run: 1,
                time_per_run_seconds: 0.0,
                materials: Vec::new(),
            };
        };

        let recorded_me = recipe.recorded_me_level();
        let materials = recipe
            .materials()
            .iter()
            .map(|line| MaterialLine {
                item: line.item.clone(),
                quantity: efficiency::material_quantity(line.quantity, recorded_me, request.me_level),
            })
            .collect();

        Fragment {
            source_kind,
            is_raw: false,
            output_per_run: recipe.output_per_run(),
            time_per_run_seconds: efficiency::run_time(
                recipe.time_per_run_s(),
                recipe.recorded_te_level(),
                request.te_level,
            ),
            materials,
        }
    }
}
