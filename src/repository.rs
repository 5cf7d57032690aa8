//! Uniform recipe lookup across user recipes and the SDE

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::trace;

use crate::db;
use crate::error::Result;
use crate::models::{ItemId, Recipe, RecipeResult, RecipeSource, SdeRecipe, UserRecipe};

/// Read-only source of "how is this item produced"
pub trait RecipeRepository {
    fn find_user_recipe(&self, item: &ItemId) -> Result<Option<UserRecipe>>;

    fn find_sde_recipe(&self, item: &ItemId) -> Result<Option<SdeRecipe>>;

    /// Try `preferred` first, otherwise user recipes then the SDE.
    fn lookup(&self, item: &ItemId, preferred: Option<RecipeSource>) -> Result<RecipeResult> {
        let order = match preferred {
            Some(RecipeSource::SdeReference) => [RecipeSource::SdeReference, RecipeSource::UserRecipe],
            Some(RecipeSource::UserRecipe) | None => {
                [RecipeSource::UserRecipe, RecipeSource::SdeReference]
            }
        };

        for source in order {
            let found = match source {
                RecipeSource::UserRecipe => self.find_user_recipe(item)?.map(Recipe::User),
                RecipeSource::SdeReference => self.find_sde_recipe(item)?.map(Recipe::Sde),
            };
            if let Some(recipe) = found {
                trace!(item = %item, ?source, "recipe found");
                return Ok(RecipeResult::Found(recipe));
            }
        }

        Ok(RecipeResult::NotFound)
    }
}

impl<T: RecipeRepository + ?Sized> RecipeRepository for &T {
    fn find_user_recipe(&self, item: &ItemId) -> Result<Option<UserRecipe>> {
        (**self).find_user_recipe(item)
    }

    fn find_sde_recipe(&self, item: &ItemId) -> Result<Option<SdeRecipe>> {
        (**self).find_sde_recipe(item)
    }
}

/// Repository backed by the SQLite store
pub struct SqliteRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl RecipeRepository for SqliteRepository<'_> {
    fn find_user_recipe(&self, item: &ItemId) -> Result<Option<UserRecipe>> {
        db::get_recipe(self.conn, item.as_str())
    }

    fn find_sde_recipe(&self, item: &ItemId) -> Result<Option<SdeRecipe>> {
        db::find_sde_recipe(self.conn, item.as_str())
    }
}

/// Repository over already-loaded data; `Send + Sync`
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    user: HashMap<ItemId, UserRecipe>,
    sde: HashMap<ItemId, SdeRecipe>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every user recipe from the store
    pub fn from_store(conn: &Connection) -> Result<Self> {
        let mut repo = Self::new();
        for recipe in db::list_recipes(conn)? {
            repo.insert_user(recipe);
        }
        Ok(repo)
    }

    /// Replaces any recipe with the same name
    pub fn insert_user(&mut self, recipe: UserRecipe) -> Option<UserRecipe> {
        self.user.insert(recipe.name.clone(), recipe)
    }

    pub fn insert_sde(&mut self, recipe: SdeRecipe) -> Option<SdeRecipe> {
        self.sde.insert(recipe.product.clone(), recipe)
    }

    pub fn len(&self) -> usize {
        self.user.len() + self.sde.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecipeRepository for MemoryRepository {
    fn find_user_recipe(&self, item: &ItemId) -> Result<Option<UserRecipe>> {
        Ok(self.user.get(item).cloned())
    }

    fn find_sde_recipe(&self, item: &ItemId) -> Result<Option<SdeRecipe>> {
        Ok(self.sde.get(item).cloned())
    }
}
