//! Recipe retrieval, reconciliation and editing.
//!
//! A user sees their own recipes plus the shared predefined set. The two are
//! fetched separately and merged client-side: owned recipes come first and
//! only the first recipe with a given name is kept, so a user's copy of a
//! predefined recipe hides the shared one.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::auth::AuthGateway;
use crate::error::{Error, Result};
use crate::predefined::predefined_recipes;
use crate::recipe::{ImageHandle, Recipe, RecipeDraft, PREDEFINED_OWNER};
use crate::store::{new_document_id, Direction, Document, DocumentStore, Query, SetMode, RECIPES};
use crate::subscription::{self, Subscription, WatchScope};

const VIEW_RECIPES: &str = "User must be logged in to view recipes";
const ADD_RECIPES: &str = "User must be logged in to add recipes";
const RECIPE_NOT_FOUND: &str = "Recipe not found";

/// Result of [`RecipeBook::seed_predefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Predefined recipes were already present; nothing was written.
    AlreadySeeded,
    /// Recipes were written.
    Inserted {
        /// Recipes stored.
        inserted: usize,
        /// Recipes that failed to store.
        failed: usize,
    },
}

/// Merge owned and predefined recipes into one list with one recipe per
/// name, resolving every recipe's display image.
///
/// Owned recipes come first, so they win over predefined ones with the same
/// name. Names compare exactly.
#[must_use]
pub fn merge_by_name(owned: Vec<Recipe>, predefined: Vec<Recipe>) -> Vec<Recipe> {
    let mut seen = HashSet::new();
    owned
        .into_iter()
        .chain(predefined)
        .filter(|recipe| seen.insert(recipe.name.clone()))
        .map(|mut recipe| {
            recipe.image = Some(ImageHandle::resolve(&recipe));
            recipe
        })
        .collect()
}

/// Decode recipe documents, skipping any that don't decode.
fn decode_recipes(docs: &[Document]) -> Vec<Recipe> {
    docs.iter()
        .filter_map(|doc| match Recipe::from_document(doc) {
            Ok(recipe) => Some(recipe),
            Err(e) => {
                warn!("Skipping malformed recipe {}: {}", doc.id, e);
                None
            }
        })
        .collect()
}

/// Recipe service.
#[derive(Debug, Clone)]
pub struct RecipeBook {
    store: Arc<dyn DocumentStore>,
    auth: AuthGateway,
    channel_capacity: usize,
}

impl RecipeBook {
    /// Create a recipe service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, auth: AuthGateway, channel_capacity: usize) -> Self {
        Self {
            store,
            auth,
            channel_capacity,
        }
    }

    async fn query(&self, query: &Query) -> Result<Vec<Recipe>> {
        let docs = self
            .store
            .query(RECIPES, query)
            .await
            .map_err(Error::into_store)?;
        Ok(decode_recipes(&docs))
    }

    /// The signed-in user's recipes merged with the predefined ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] when nobody is signed in, or a
    /// store error.
    pub async fn recipes_for_current_user(&self) -> Result<Vec<Recipe>> {
        let user = self.auth.require_user(VIEW_RECIPES)?;
        self.recipes_for_user(&user.uid).await
    }

    /// A user's recipes merged with the predefined ones.
    ///
    /// # Errors
    ///
    /// Returns a store error if either query fails.
    pub async fn recipes_for_user(&self, uid: &str) -> Result<Vec<Recipe>> {
        let owned = self.query(&Query::new().where_eq("userId", uid)).await?;
        let predefined = self
            .query(&Query::new().where_eq("userId", PREDEFINED_OWNER))
            .await?;

        debug!(
            "Merging {} owned and {} predefined recipes",
            owned.len(),
            predefined.len()
        );
        // Owned recipes go first so they win name collisions
        Ok(merge_by_name(owned, predefined))
    }

    /// A user's own recipes, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    pub async fn user_recipes(&self, uid: &str) -> Result<Vec<Recipe>> {
        let mut recipes = self
            .query(
                &Query::new()
                    .where_eq("userId", uid)
                    .order_by("createdAt", Direction::Descending),
            )
            .await?;
        for recipe in &mut recipes {
            recipe.image = Some(ImageHandle::resolve(recipe));
        }
        Ok(recipes)
    }

    /// The signed-in user's own recipes, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] when nobody is signed in, or a
    /// store error.
    pub async fn current_user_recipes(&self) -> Result<Vec<Recipe>> {
        let user = self.auth.require_user(VIEW_RECIPES)?;
        self.user_recipes(&user.uid).await
    }

    /// Read one recipe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the recipe doesn't exist.
    pub async fn get_recipe(&self, id: &str) -> Result<Recipe> {
        self.find_recipe(id)
            .await?
            .ok_or_else(|| Error::not_found(RECIPE_NOT_FOUND))
    }

    async fn find_recipe(&self, id: &str) -> Result<Option<Recipe>> {
        let doc = self
            .store
            .get(RECIPES, id)
            .await
            .map_err(Error::into_store)?;
        doc.map(|doc| {
            let mut recipe = Recipe::from_document(&doc)?;
            recipe.image = Some(ImageHandle::resolve(&recipe));
            Ok(recipe)
        })
        .transpose()
    }

    /// Check that the recipes collection is readable.
    ///
    /// Returns the number of documents seen, at most one.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn probe(&self) -> Result<usize> {
        let docs = self
            .store
            .query(RECIPES, &Query::new().limit(1))
            .await
            .map_err(Error::into_store)?;
        Ok(docs.len())
    }

    /// Create a recipe owned by the signed-in user. Returns the new id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an incomplete draft,
    /// [`Error::NotAuthenticated`] when nobody is signed in, or a store error.
    pub async fn create_recipe(&self, draft: RecipeDraft) -> Result<String> {
        draft.validate()?;
        let user = self.auth.require_user(ADD_RECIPES)?;
        let recipe = draft.into_recipe(&user.uid, Utc::now());
        let id = self.save_recipe(recipe).await?;
        info!("Created recipe {}", id);
        Ok(id)
    }

    /// Store a recipe under a new id, which is also written into the
    /// recipe's `id` field.
    async fn save_recipe(&self, mut recipe: Recipe) -> Result<String> {
        let id = new_document_id();
        recipe.id.clone_from(&id);
        self.store
            .set(RECIPES, &id, recipe.to_fields()?, SetMode::Overwrite)
            .await
            .map_err(Error::into_store)?;
        Ok(id)
    }

    /// Replace a stored recipe, bumping its update time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the recipe doesn't exist, or a store error.
    pub async fn update_recipe(&self, recipe: &Recipe) -> Result<()> {
        if recipe.id.is_empty() || self.find_recipe(&recipe.id).await?.is_none() {
            return Err(Error::not_found(RECIPE_NOT_FOUND));
        }

        let mut recipe = recipe.clone();
        recipe.updated_at = Utc::now();
        self.store
            .set(RECIPES, &recipe.id, recipe.to_fields()?, SetMode::Overwrite)
            .await
            .map_err(Error::into_store)?;
        debug!("Updated recipe {}", recipe.id);
        Ok(())
    }

    /// Delete a recipe. Favorites pointing at it are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the recipe doesn't exist, or a store error.
    pub async fn delete_recipe(&self, id: &str) -> Result<()> {
        let deleted = self
            .store
            .delete(RECIPES, id)
            .await
            .map_err(Error::into_store)?;
        if !deleted {
            return Err(Error::not_found(RECIPE_NOT_FOUND));
        }
        info!("Deleted recipe {}", id);
        Ok(())
    }

    /// Store the built-in recipes unless some are already present.
    ///
    /// Not transactional: single failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error if the probe fails, or an error if no recipe at
    /// all could be stored.
    pub async fn seed_predefined(&self) -> Result<SeedOutcome> {
        // One predefined recipe is enough to know seeding already ran
        let existing = self
            .store
            .query(
                RECIPES,
                &Query::new().where_eq("userId", PREDEFINED_OWNER).limit(1),
            )
            .await
            .map_err(Error::into_store)?;
        if !existing.is_empty() {
            debug!("Predefined recipes already present");
            return Ok(SeedOutcome::AlreadySeeded);
        }

        // Not transactional: a failed insert is logged and the rest still go in
        let mut inserted = 0;
        let mut failed = 0;
        for recipe in predefined_recipes(Utc::now())? {
            let name = recipe.name.clone();
            match self.save_recipe(recipe).await {
                Ok(_) => inserted += 1,
                Err(e) => {
                    warn!("Failed to add predefined recipe {}: {}", name, e);
                    failed += 1;
                }
            }
        }

        if inserted == 0 {
            return Err(Error::store("Failed to add any predefined recipes"));
        }

        info!("Seeded {} predefined recipes ({} failed)", inserted, failed);
        Ok(SeedOutcome::Inserted { inserted, failed })
    }

    /// Follow one recipe. Yields `None` while the recipe doesn't exist.
    #[must_use]
    pub fn watch_recipe(&self, id: &str) -> Subscription<Option<Recipe>> {
        let book = self.clone();
        let id = id.to_string();
        subscription::watch(
            self.store.changes(),
            vec![WatchScope::document(RECIPES, id.clone())],
            self.channel_capacity,
            move || {
                let book = book.clone();
                let id = id.clone();
                async move { book.find_recipe(&id).await }
            },
        )
    }

    /// Follow a user's own recipes, newest first.
    #[must_use]
    pub fn watch_user_recipes(&self, uid: &str) -> Subscription<Vec<Recipe>> {
        let book = self.clone();
        let uid = uid.to_string();
        subscription::watch(
            self.store.changes(),
            vec![WatchScope::collection(RECIPES)],
            self.channel_capacity,
            move || {
                let book = book.clone();
                let uid = uid.clone();
                async move { book.user_recipes(&uid).await }
            },
        )
    }

    /// Follow the merged recipe list of a user.
    #[must_use]
    pub fn watch_recipes_for_user(&self, uid: &str) -> Subscription<Vec<Recipe>> {
        let book = self.clone();
        let uid = uid.to_string();
        subscription::watch(
            self.store.changes(),
            vec![WatchScope::collection(RECIPES)],
            self.channel_capacity,
            move || {
                let book = book.clone();
                let uid = uid.clone();
                async move { book.recipes_for_user(&uid).await }
            },
        )
    }
}
