//! Recipe data model.
//!
//! [`Recipe`] is the persisted shape of a document in the `recipes`
//! collection. Field names on disk are camelCase (`userId`, `cookTime`,
//! `cookingInstructions`) and timestamps are epoch milliseconds, so documents
//! order correctly when sorted by `createdAt`.

mod filter;
mod image;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::store::{self, Document, Fields};
use crate::validation::split_lines;

pub use filter::RecipeFilter;
pub use image::ImageHandle;

/// Owner id of the shared recipes every user sees.
pub const PREDEFINED_OWNER: &str = "predefined";

/// Recipe categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum RecipeCategory {
    /// Matches everything in filters; also the fallback for unknown values.
    #[default]
    All,
    /// Breakfast.
    Breakfast,
    /// Lunch.
    Lunch,
    /// Dinner.
    Dinner,
    /// Dessert.
    Dessert,
    /// Italian.
    Italian,
    /// French.
    French,
    /// Vegan.
    Vegan,
    /// Gluten free.
    GlutenFree,
    /// Vegetarian.
    Vegetarian,
    /// Salad.
    Salad,
}

impl RecipeCategory {
    /// Every category, in display order.
    pub const ALL: [Self; 11] = [
        Self::All,
        Self::Breakfast,
        Self::Lunch,
        Self::Dinner,
        Self::Dessert,
        Self::Italian,
        Self::French,
        Self::Vegan,
        Self::GlutenFree,
        Self::Vegetarian,
        Self::Salad,
    ];

    /// The stored name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Breakfast => "BREAKFAST",
            Self::Lunch => "LUNCH",
            Self::Dinner => "DINNER",
            Self::Dessert => "DESSERT",
            Self::Italian => "ITALIAN",
            Self::French => "FRENCH",
            Self::Vegan => "VEGAN",
            Self::GlutenFree => "GLUTEN_FREE",
            Self::Vegetarian => "VEGETARIAN",
            Self::Salad => "SALAD",
        }
    }
}

impl fmt::Display for RecipeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipeCategory {
    type Err = Error;

    /// Parse a category name, ignoring case and accepting `-` for `_`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| Error::validation("category", format!("Unknown category: {s}")))
    }
}

impl Serialize for RecipeCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecipeCategory {
    /// Unknown stored values read as [`RecipeCategory::All`].
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(value.parse().unwrap_or_default())
    }
}

/// A recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recipe {
    /// Document id. Also written into the document for clients that read it
    /// back from the fields.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Owning user id, or [`PREDEFINED_OWNER`].
    #[serde(rename = "userId")]
    pub owner: String,
    /// Recipe name; merged recipe lists hold one recipe per name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Free-text cook time, minutes in the built-in recipes.
    pub cook_time: String,
    /// Category.
    pub category: RecipeCategory,
    /// Average rating.
    pub rating: f32,
    /// Number of reviews behind the rating.
    pub review_count: u32,
    /// Ingredient lines.
    pub ingredients: Vec<String>,
    /// Instruction steps.
    #[serde(rename = "cookingInstructions")]
    pub instructions: Vec<String>,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last update time.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    /// Display image. Never persisted; see [`ImageHandle::resolve`].
    #[serde(skip)]
    pub image: Option<ImageHandle>,
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            id: String::new(),
            owner: String::new(),
            name: String::new(),
            description: String::new(),
            cook_time: String::new(),
            category: RecipeCategory::All,
            rating: 0.0,
            review_count: 0,
            ingredients: Vec::new(),
            instructions: Vec::new(),
            created_at: DateTime::UNIX_EPOCH,
            updated_at: DateTime::UNIX_EPOCH,
            image: None,
        }
    }
}

impl Recipe {
    /// Decode a recipe from a stored document. The document id wins over any
    /// `id` field.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields have the wrong types.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut recipe: Self = doc.decode()?;
        recipe.id.clone_from(&doc.id);
        Ok(recipe)
    }

    /// Encode the recipe as document fields.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_fields(&self) -> Result<Fields> {
        store::to_fields(self)
    }

    /// Check if this is one of the shared built-in recipes.
    #[must_use]
    pub fn is_predefined(&self) -> bool {
        self.owner == PREDEFINED_OWNER
    }

    /// The image to display, resolving it if it hasn't been.
    #[must_use]
    pub fn display_image(&self) -> ImageHandle {
        ImageHandle::resolve(self)
    }
}

/// The editable part of a recipe, as entered by a user.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecipeDraft {
    /// Recipe name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Free-text cook time.
    pub cook_time: String,
    /// Category.
    pub category: RecipeCategory,
    /// Ingredient lines.
    pub ingredients: Vec<String>,
    /// Instruction steps.
    pub instructions: Vec<String>,
}

impl RecipeDraft {
    /// Build a draft from form text, one ingredient or step per line.
    #[must_use]
    pub fn from_form(
        name: &str,
        description: &str,
        cook_time: &str,
        category: RecipeCategory,
        ingredients: &str,
        instructions: &str,
    ) -> Self {
        Self {
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            cook_time: cook_time.trim().to_string(),
            category,
            ingredients: split_lines(ingredients),
            instructions: split_lines(instructions),
        }
    }

    /// Check the required fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the name or description is blank.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "Name is required"));
        }
        if self.description.trim().is_empty() {
            return Err(Error::validation("description", "Description is required"));
        }
        Ok(())
    }

    /// Turn the draft into a new recipe owned by `owner`.
    #[must_use]
    pub fn into_recipe(self, owner: &str, now: DateTime<Utc>) -> Recipe {
        Recipe {
            owner: owner.to_string(),
            name: self.name,
            description: self.description,
            cook_time: self.cook_time,
            category: self.category,
            ingredients: self.ingredients,
            instructions: self.instructions,
            created_at: now,
            updated_at: now,
            ..Recipe::default()
        }
    }

    /// Copy the draft's fields over an existing recipe.
    pub fn apply_to(self, recipe: &mut Recipe) {
        recipe.name = self.name;
        recipe.description = self.description;
        recipe.cook_time = self.cook_time;
        recipe.category = self.category;
        recipe.ingredients = self.ingredients;
        recipe.instructions = self.instructions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(value: serde_json::Value) -> Document {
        Document {
            id: "doc-1".to_string(),
            fields: store::to_fields(&value).unwrap(),
        }
    }

    #[test]
    fn test_category_parse_and_display() {
        assert_eq!("DESSERT".parse::<RecipeCategory>().unwrap(), RecipeCategory::Dessert);
        assert_eq!("dessert".parse::<RecipeCategory>().unwrap(), RecipeCategory::Dessert);
        assert_eq!(
            "gluten-free".parse::<RecipeCategory>().unwrap(),
            RecipeCategory::GlutenFree
        );
        assert_eq!(RecipeCategory::GlutenFree.to_string(), "GLUTEN_FREE");
        assert!("BRUNCH".parse::<RecipeCategory>().is_err());
    }

    #[test]
    fn test_category_round_trips_through_names() {
        for category in RecipeCategory::ALL {
            assert_eq!(category.as_str().parse::<RecipeCategory>().unwrap(), category);
        }
    }

    #[test]
    fn test_unknown_stored_category_reads_as_all() {
        let category: RecipeCategory = serde_json::from_value(json!("BRUNCH")).unwrap();
        assert_eq!(category, RecipeCategory::All);
    }

    #[test]
    fn test_recipe_persisted_field_names() {
        let recipe = Recipe {
            id: "r1".to_string(),
            owner: "u1".to_string(),
            name: "Tacos".to_string(),
            cook_time: "20".to_string(),
            category: RecipeCategory::Lunch,
            review_count: 3,
            instructions: vec!["Warm tortillas".to_string()],
            created_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            ..Recipe::default()
        };

        let fields = recipe.to_fields().unwrap();
        assert_eq!(fields["id"], json!("r1"));
        assert_eq!(fields["userId"], json!("u1"));
        assert_eq!(fields["cookTime"], json!("20"));
        assert_eq!(fields["category"], json!("LUNCH"));
        assert_eq!(fields["reviewCount"], json!(3));
        assert_eq!(fields["cookingInstructions"], json!(["Warm tortillas"]));
        assert_eq!(fields["createdAt"], json!(1_700_000_000_000_i64));
        assert!(!fields.contains_key("image"));
        assert!(!fields.contains_key("owner"));
    }

    #[test]
    fn test_empty_id_is_not_written() {
        let fields = Recipe::default().to_fields().unwrap();
        assert!(!fields.contains_key("id"));
    }

    #[test]
    fn test_from_document_uses_document_id() {
        let doc = document(json!({"id": "stale", "name": "Risotto", "userId": "u1"}));
        let recipe = Recipe::from_document(&doc).unwrap();
        assert_eq!(recipe.id, "doc-1");
        assert_eq!(recipe.owner, "u1");
    }

    #[test]
    fn test_from_document_tolerates_missing_and_extra_fields() {
        let doc = document(json!({"name": "Pancakes", "imageUrl": "x", "likes": 9}));
        let recipe = Recipe::from_document(&doc).unwrap();
        assert_eq!(recipe.name, "Pancakes");
        assert_eq!(recipe.category, RecipeCategory::All);
        assert!(recipe.ingredients.is_empty());
        assert_eq!(recipe.created_at, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_from_document_rejects_wrong_types() {
        let doc = document(json!({"name": 42}));
        assert!(Recipe::from_document(&doc).is_err());
    }

    #[test]
    fn test_is_predefined() {
        let recipe = Recipe {
            owner: PREDEFINED_OWNER.to_string(),
            ..Recipe::default()
        };
        assert!(recipe.is_predefined());
        assert!(!Recipe::default().is_predefined());
    }

    #[test]
    fn test_draft_from_form_splits_lines() {
        let draft = RecipeDraft::from_form(
            " Soup ",
            "Warm",
            "15",
            RecipeCategory::Vegan,
            "water\n\nsalt\n",
            "boil\n  stir ",
        );
        assert_eq!(draft.name, "Soup");
        assert_eq!(draft.ingredients, vec!["water", "salt"]);
        assert_eq!(draft.instructions, vec!["boil", "stir"]);
    }

    #[test]
    fn test_draft_validation() {
        let mut draft = RecipeDraft {
            name: "Soup".to_string(),
            description: "Warm".to_string(),
            ..RecipeDraft::default()
        };
        assert!(draft.validate().is_ok());

        draft.description = "  ".to_string();
        assert_eq!(
            draft.validate().unwrap_err().user_message(),
            "Description is required"
        );

        draft.name = String::new();
        assert_eq!(draft.validate().unwrap_err().user_message(), "Name is required");
    }

    #[test]
    fn test_draft_into_recipe() {
        let now = Utc::now();
        let draft = RecipeDraft {
            name: "Soup".to_string(),
            description: "Warm".to_string(),
            category: RecipeCategory::Dinner,
            ..RecipeDraft::default()
        };
        let recipe = draft.into_recipe("u1", now);
        assert_eq!(recipe.owner, "u1");
        assert_eq!(recipe.created_at, now);
        assert_eq!(recipe.updated_at, now);
        assert!(recipe.id.is_empty());
    }
}
