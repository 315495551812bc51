//! Favorite recipes.
//!
//! Favorites are kept in two places that nothing forces to agree:
//!
//! - one document per favorite in the `users/<uid>/favorites` subcollection,
//!   keyed by recipe id, which is what toggling and the favorites list use;
//! - a `favorites` array field on the `users/<uid>` document, written in one
//!   go from a client-side set.
//!
//! [`Favorites::sync_array_from_subcollection`] rewrites the array from the
//! subcollection when the two need to be brought back in line.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::AuthGateway;
use crate::error::{Error, Result};
use crate::recipe::{ImageHandle, Recipe};
use crate::store::{
    server_timestamp, subcollection, to_fields, DocumentStore, Query, SetMode, FAVORITES,
    RECIPES, USERS,
};
use crate::subscription::{self, Subscription, WatchScope};

const SAVE_FAVORITES: &str = "User must be logged in to save favorites";

/// A set of favorite recipe ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FavoriteSet(BTreeSet<String>);

impl FavoriteSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a recipe is a favorite.
    #[must_use]
    pub fn contains(&self, recipe_id: &str) -> bool {
        self.0.contains(recipe_id)
    }

    /// Flip membership of a recipe, returning whether it is now a favorite.
    pub fn toggle(&mut self, recipe_id: &str) -> bool {
        if self.0.remove(recipe_id) {
            false
        } else {
            self.0.insert(recipe_id.to_string());
            true
        }
    }

    /// Number of favorites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no favorites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the ids in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// The ids in sorted order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().cloned().collect()
    }

    /// Keep the recipes in the set, in order.
    #[must_use]
    pub fn filter(&self, recipes: Vec<Recipe>) -> Vec<Recipe> {
        recipes
            .into_iter()
            .filter(|recipe| self.contains(&recipe.id))
            .collect()
    }
}

impl FromIterator<String> for FavoriteSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Favorites service.
#[derive(Debug, Clone)]
pub struct Favorites {
    store: Arc<dyn DocumentStore>,
    auth: AuthGateway,
    channel_capacity: usize,
}

impl Favorites {
    /// Create a favorites service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, auth: AuthGateway, channel_capacity: usize) -> Self {
        Self {
            store,
            auth,
            channel_capacity,
        }
    }

    // === Subcollection ===

    /// Mark a recipe as a favorite.
    ///
    /// # Errors
    ///
    /// Returns a store error if the write fails.
    pub async fn add_favorite(&self, uid: &str, recipe_id: &str) -> Result<()> {
        let fields = to_fields(&json!({
            "recipeId": recipe_id,
            "addedAt": server_timestamp(),
        }))?;
        self.store
            .set(&favorites_path(uid), recipe_id, fields, SetMode::Overwrite)
            .await
            .map_err(Error::into_store)?;
        debug!("Added favorite {} for {}", recipe_id, uid);
        Ok(())
    }

    /// Unmark a recipe as a favorite. Removing a non-favorite is not an error.
    ///
    /// # Errors
    ///
    /// Returns a store error if the delete fails.
    pub async fn remove_favorite(&self, uid: &str, recipe_id: &str) -> Result<()> {
        self.store
            .delete(&favorites_path(uid), recipe_id)
            .await
            .map_err(Error::into_store)?;
        debug!("Removed favorite {} for {}", recipe_id, uid);
        Ok(())
    }

    /// Flip a recipe's favorite state, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read or write fails.
    pub async fn toggle_favorite(&self, uid: &str, recipe_id: &str) -> Result<bool> {
        let current = self
            .store
            .get(&favorites_path(uid), recipe_id)
            .await
            .map_err(Error::into_store)?;

        if current.is_some() {
            self.remove_favorite(uid, recipe_id).await?;
            Ok(false)
        } else {
            self.add_favorite(uid, recipe_id).await?;
            Ok(true)
        }
    }

    /// The ids in a user's favorites subcollection.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    pub async fn favorite_ids(&self, uid: &str) -> Result<FavoriteSet> {
        let docs = self
            .store
            .query(&favorites_path(uid), &Query::new())
            .await
            .map_err(Error::into_store)?;
        Ok(docs.into_iter().map(|doc| doc.id).collect())
    }

    /// The recipes a user has favorited. Favorites pointing at deleted
    /// recipes are left out.
    ///
    /// # Errors
    ///
    /// Returns a store error if a query fails.
    pub async fn favorite_recipes(&self, uid: &str) -> Result<Vec<Recipe>> {
        let ids = self.favorite_ids(uid).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self
            .store
            .query(RECIPES, &Query::new().where_id_in(ids.iter().cloned()))
            .await
            .map_err(Error::into_store)?;

        Ok(docs
            .iter()
            .filter_map(|doc| match Recipe::from_document(doc) {
                Ok(mut recipe) => {
                    recipe.image = Some(ImageHandle::resolve(&recipe));
                    Some(recipe)
                }
                Err(e) => {
                    warn!("Skipping malformed recipe {}: {}", doc.id, e);
                    None
                }
            })
            .collect())
    }

    /// Follow the recipes a user has favorited.
    #[must_use]
    pub fn watch_favorite_recipes(&self, uid: &str) -> Subscription<Vec<Recipe>> {
        let favorites = self.clone();
        let uid = uid.to_string();
        subscription::watch(
            self.store.changes(),
            vec![
                WatchScope::collection(favorites_path(&uid)),
                WatchScope::collection(RECIPES),
            ],
            self.channel_capacity,
            move || {
                let favorites = favorites.clone();
                let uid = uid.clone();
                async move { favorites.favorite_recipes(&uid).await }
            },
        )
    }

    // === Array field ===

    /// Overwrite a user document with the given favorites array.
    ///
    /// Other fields on the user document are dropped.
    ///
    /// # Errors
    ///
    /// Returns a store error if the write fails.
    pub async fn save_user_favorites(&self, uid: &str, ids: &[String]) -> Result<()> {
        self.store
            .set(USERS, uid, favorites_fields(ids)?, SetMode::Overwrite)
            .await
            .map_err(Error::into_store)
    }

    /// The favorites array of a user. A missing document or field reads as
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn user_favorites(&self, uid: &str) -> Result<Vec<String>> {
        let doc = self
            .store
            .get(USERS, uid)
            .await
            .map_err(Error::into_store)?;
        Ok(doc
            .and_then(|doc| doc.get(FAVORITES).cloned())
            .map(favorites_from_value)
            .unwrap_or_default())
    }

    /// Follow a user's favorites array.
    ///
    /// The user document is created with an empty array first if it doesn't
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns a store error if the user document can't be read or created.
    pub async fn watch_user_favorites(&self, uid: &str) -> Result<Subscription<Vec<String>>> {
        let existing = self
            .store
            .get(USERS, uid)
            .await
            .map_err(Error::into_store)?;
        if existing.is_none() {
            debug!("Creating user document for {}", uid);
            self.save_user_favorites(uid, &[]).await?;
        }

        let favorites = self.clone();
        let uid = uid.to_string();
        Ok(subscription::watch(
            self.store.changes(),
            vec![WatchScope::document(USERS, uid.clone())],
            self.channel_capacity,
            move || {
                let favorites = favorites.clone();
                let uid = uid.clone();
                async move { favorites.user_favorites(&uid).await }
            },
        ))
    }

    /// Save the signed-in user's favorites array.
    ///
    /// Blank ids and ids that don't match a stored recipe are dropped; other
    /// fields on the user document are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] when nobody is signed in, or a
    /// store error.
    pub async fn save_current_user_favorites(&self, ids: &[String]) -> Result<Vec<String>> {
        let user = self.auth.require_user(SAVE_FAVORITES)?;
        let valid = self.existing_recipe_ids(ids).await?;
        if valid.len() < ids.len() {
            debug!("Dropped {} unknown favorite ids", ids.len() - valid.len());
        }

        // Merge keeps any other fields on the user document
        self.store
            .set(USERS, &user.uid, favorites_fields(&valid)?, SetMode::Merge)
            .await
            .map_err(Error::into_store)?;
        Ok(valid)
    }

    /// Rewrite a user's favorites array from the subcollection, dropping ids
    /// of recipes that no longer exist. Returns the ids written.
    ///
    /// # Errors
    ///
    /// Returns a store error if a read or the write fails.
    pub async fn sync_array_from_subcollection(&self, uid: &str) -> Result<Vec<String>> {
        let ids = self.favorite_ids(uid).await?.to_vec();
        let valid = self.existing_recipe_ids(&ids).await?;

        self.store
            .set(USERS, uid, favorites_fields(&valid)?, SetMode::Merge)
            .await
            .map_err(Error::into_store)?;
        debug!("Synced {} favorites into array for {}", valid.len(), uid);
        Ok(valid)
    }

    /// The ids among `ids` that name stored recipes, deduplicated, in input
    /// order.
    async fn existing_recipe_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        // Blank and repeated ids never reach the store
        let mut seen = BTreeSet::new();
        let candidates: Vec<String> = ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(*id))
            .map(str::to_string)
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let found: BTreeSet<String> = self
            .store
            .query(RECIPES, &Query::new().where_id_in(candidates.iter().cloned()))
            .await
            .map_err(Error::into_store)?
            .into_iter()
            .map(|doc| doc.id)
            .collect();

        Ok(candidates
            .into_iter()
            .filter(|id| found.contains(id))
            .collect())
    }
}

fn favorites_path(uid: &str) -> String {
    subcollection(USERS, uid, FAVORITES)
}

fn favorites_fields(ids: &[String]) -> Result<crate::store::Fields> {
    to_fields(&json!({ FAVORITES: ids }))
}

fn favorites_from_value(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{app, signed_in_app};
    use crate::recipe::RecipeDraft;
    use std::time::Duration;

    async fn create(app: &crate::App, name: &str) -> String {
        app.recipes
            .create_recipe(RecipeDraft {
                name: name.to_string(),
                description: "Tasty".to_string(),
                ..RecipeDraft::default()
            })
            .await
            .unwrap()
    }

    async fn next<T>(sub: &mut Subscription<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("timed out waiting for snapshot")
            .expect("subscription ended")
            .expect("load failed")
    }

    #[test]
    fn test_favorite_set_toggle_twice_restores() {
        let mut set: FavoriteSet = ["a".to_string()].into_iter().collect();
        let original = set.clone();

        assert!(set.toggle("b"));
        assert!(set.contains("b"));
        assert!(!set.toggle("b"));
        assert_eq!(set, original);
    }

    #[test]
    fn test_favorite_set_filter() {
        let set: FavoriteSet = ["r2".to_string()].into_iter().collect();
        let recipes = vec![
            Recipe {
                id: "r1".to_string(),
                ..Recipe::default()
            },
            Recipe {
                id: "r2".to_string(),
                ..Recipe::default()
            },
        ];
        let kept = set.filter(recipes);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "r2");
    }

    #[tokio::test]
    async fn test_favorite_then_unfavorite_leaves_empty() {
        let app = app();
        assert!(app.favorites.toggle_favorite("u1", "r1").await.unwrap());
        assert!(app.favorites.favorite_ids("u1").await.unwrap().contains("r1"));

        assert!(!app.favorites.toggle_favorite("u1", "r1").await.unwrap());
        assert!(app.favorites.favorite_ids("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_favorite_document_shape() {
        let app = app();
        app.favorites.add_favorite("u1", "r1").await.unwrap();

        let doc = app
            .store
            .get("users/u1/favorites", "r1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get("recipeId"), Some(&json!("r1")));
        assert!(doc.get("addedAt").and_then(Value::as_str).is_some());
    }

    #[tokio::test]
    async fn test_remove_missing_favorite_is_ok() {
        let app = app();
        app.favorites.remove_favorite("u1", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_favorite_recipes_skips_deleted() {
        let (app, user) = signed_in_app().await;
        let soup = create(&app, "Soup").await;
        let stew = create(&app, "Stew").await;
        app.favorites.add_favorite(&user.uid, &soup).await.unwrap();
        app.favorites.add_favorite(&user.uid, &stew).await.unwrap();
        app.recipes.delete_recipe(&stew).await.unwrap();

        let recipes = app.favorites.favorite_recipes(&user.uid).await.unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].id, soup);
    }

    #[tokio::test]
    async fn test_favorite_recipes_empty() {
        let app = app();
        assert!(app.favorites.favorite_recipes("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_favorite_recipes() {
        let (app, user) = signed_in_app().await;
        let soup = create(&app, "Soup").await;

        let mut sub = app.favorites.watch_favorite_recipes(&user.uid);
        assert!(next(&mut sub).await.is_empty());

        app.favorites.toggle_favorite(&user.uid, &soup).await.unwrap();
        let recipes = next(&mut sub).await;
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].name, "Soup");
    }

    #[tokio::test]
    async fn test_save_and_read_user_favorites() {
        let app = app();
        assert!(app.favorites.user_favorites("u1").await.unwrap().is_empty());

        let ids = vec!["r1".to_string(), "r2".to_string()];
        app.favorites.save_user_favorites("u1", &ids).await.unwrap();
        assert_eq!(app.favorites.user_favorites("u1").await.unwrap(), ids);
    }

    #[tokio::test]
    async fn test_watch_user_favorites_creates_document() {
        let app = app();
        let mut sub = app.favorites.watch_user_favorites("u1").await.unwrap();
        assert!(next(&mut sub).await.is_empty());
        assert!(app.store.get(USERS, "u1").await.unwrap().is_some());

        app.favorites
            .save_user_favorites("u1", &["r9".to_string()])
            .await
            .unwrap();
        assert_eq!(next(&mut sub).await, vec!["r9".to_string()]);
    }

    #[tokio::test]
    async fn test_save_current_user_favorites_filters_ids() {
        let (app, user) = signed_in_app().await;
        let soup = create(&app, "Soup").await;
        app.store
            .set(
                USERS,
                &user.uid,
                to_fields(&json!({"nickname": "chef"})).unwrap(),
                SetMode::Overwrite,
            )
            .await
            .unwrap();

        let saved = app
            .favorites
            .save_current_user_favorites(&[
                soup.clone(),
                " ".to_string(),
                "missing".to_string(),
                soup.clone(),
            ])
            .await
            .unwrap();
        assert_eq!(saved, vec![soup.clone()]);

        let doc = app.store.get(USERS, &user.uid).await.unwrap().unwrap();
        assert_eq!(doc.get("favorites"), Some(&json!([soup])));
        assert_eq!(doc.get("nickname"), Some(&json!("chef")));
    }

    #[tokio::test]
    async fn test_save_current_user_favorites_requires_user() {
        let app = app();
        let err = app
            .favorites
            .save_current_user_favorites(&[])
            .await
            .unwrap_err();
        assert!(err.is_not_authenticated());
    }

    #[tokio::test]
    async fn test_sync_array_from_subcollection() {
        let (app, user) = signed_in_app().await;
        let soup = create(&app, "Soup").await;
        app.favorites.add_favorite(&user.uid, &soup).await.unwrap();
        app.favorites.add_favorite(&user.uid, "deleted").await.unwrap();
        app.favorites
            .save_user_favorites(&user.uid, &["stale".to_string()])
            .await
            .unwrap();

        let synced = app
            .favorites
            .sync_array_from_subcollection(&user.uid)
            .await
            .unwrap();
        assert_eq!(synced, vec![soup.clone()]);
        assert_eq!(
            app.favorites.user_favorites(&user.uid).await.unwrap(),
            vec![soup]
        );
    }
}
