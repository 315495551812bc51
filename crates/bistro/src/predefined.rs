//! Built-in recipes shared by every user.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::recipe::{Recipe, PREDEFINED_OWNER};

const PREDEFINED_JSON: &str = include_str!("../data/predefined_recipes.json");

/// Number of built-in recipes.
pub const PREDEFINED_COUNT: usize = 20;

/// The built-in recipes, owned by [`PREDEFINED_OWNER`] and stamped with `now`.
///
/// # Errors
///
/// Returns an error if the bundled data fails to parse.
pub fn predefined_recipes(now: DateTime<Utc>) -> Result<Vec<Recipe>> {
    let mut recipes: Vec<Recipe> = serde_json::from_str(PREDEFINED_JSON)?;
    for recipe in &mut recipes {
        recipe.owner = PREDEFINED_OWNER.to_string();
        recipe.created_at = now;
        recipe.updated_at = now;
    }
    Ok(recipes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::RecipeCategory;
    use std::collections::HashSet;

    #[test]
    fn test_bundled_data_parses() {
        let recipes = predefined_recipes(Utc::now()).unwrap();
        assert_eq!(recipes.len(), PREDEFINED_COUNT);
    }

    #[test]
    fn test_names_are_unique() {
        let recipes = predefined_recipes(Utc::now()).unwrap();
        let names: HashSet<_> = recipes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), recipes.len());
    }

    #[test]
    fn test_all_owned_by_predefined() {
        let now = Utc::now();
        for recipe in predefined_recipes(now).unwrap() {
            assert!(recipe.is_predefined());
            assert_eq!(recipe.created_at, now);
            assert!(recipe.id.is_empty());
            assert!(!recipe.ingredients.is_empty());
            assert!(!recipe.instructions.is_empty());
            assert_ne!(recipe.category, RecipeCategory::All);
        }
    }

    #[test]
    fn test_known_recipe_fields() {
        let recipes = predefined_recipes(Utc::now()).unwrap();
        let cake = recipes
            .iter()
            .find(|r| r.name == "Chocolate Dream Cake")
            .unwrap();
        assert_eq!(cake.category, RecipeCategory::Dessert);
        assert_eq!(cake.cook_time, "60");
        assert_eq!(cake.review_count, 150);
        assert!((cake.rating - 4.9).abs() < f32::EPSILON);
    }
}
