//! Recipe list filtering.

use std::collections::BTreeSet;

use super::{Recipe, RecipeCategory};
use crate::favorites::FavoriteSet;

/// Filter applied to a recipe list.
///
/// A recipe passes when its category is selected (or `ALL` is), the search
/// text is empty or appears in its name or description ignoring case, and,
/// if a favorites restriction is set, it is a favorite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFilter {
    categories: BTreeSet<RecipeCategory>,
    query: String,
    favorites: Option<FavoriteSet>,
}

impl Default for RecipeFilter {
    fn default() -> Self {
        Self {
            categories: BTreeSet::from([RecipeCategory::All]),
            query: String::new(),
            favorites: None,
        }
    }
}

impl RecipeFilter {
    /// A filter that passes everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given categories. An empty list selects `ALL`.
    #[must_use]
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = RecipeCategory>) -> Self {
        self.categories = categories.into_iter().collect();
        if self.categories.is_empty() {
            self.categories.insert(RecipeCategory::All);
        }
        self
    }

    /// Restrict to recipes whose name or description contains `query`.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into().trim().to_lowercase();
        self
    }

    /// Restrict to favorites.
    #[must_use]
    pub fn with_favorites(mut self, favorites: FavoriteSet) -> Self {
        self.favorites = Some(favorites);
        self
    }

    /// Check a single recipe.
    #[must_use]
    pub fn matches(&self, recipe: &Recipe) -> bool {
        let category_ok = self.categories.contains(&RecipeCategory::All)
            || self.categories.contains(&recipe.category);

        let query_ok = self.query.is_empty()
            || recipe.name.to_lowercase().contains(&self.query)
            || recipe.description.to_lowercase().contains(&self.query);

        let favorite_ok = self
            .favorites
            .as_ref()
            .map_or(true, |favorites| favorites.contains(&recipe.id));

        category_ok && query_ok && favorite_ok
    }

    /// Keep the recipes that pass, in order.
    #[must_use]
    pub fn apply(&self, recipes: Vec<Recipe>) -> Vec<Recipe> {
        recipes.into_iter().filter(|r| self.matches(r)).collect()
    }
}
