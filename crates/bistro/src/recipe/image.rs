//! Display image resolution.
//!
//! Images are never stored with a recipe. They are picked at read time from
//! the recipe's category, then its name, then a fallback, so every recipe
//! always has something to show.

use std::fmt;

use serde::Serialize;

use super::{Recipe, RecipeCategory};

/// Name of a bundled image asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ImageHandle(&'static str);

/// Category images. Categories not listed fall through to the name table.
const CATEGORY_IMAGES: &[(RecipeCategory, &str)] = &[
    (RecipeCategory::Breakfast, "avocado_toast_image"),
    (RecipeCategory::Lunch, "salad_image"),
    (RecipeCategory::Dinner, "beef_bourguignon_image"),
    (RecipeCategory::Dessert, "chocolate_lava_cake_image"),
    (RecipeCategory::Italian, "pasta_primavera_image"),
    (RecipeCategory::French, "ratatouille_image"),
];

/// Images keyed by lower-cased recipe name.
const NAME_IMAGES: &[(&str, &str)] = &[
    ("classic margherita pizza", "margherita_pizza_image"),
    ("greek salad", "greek_salad_image"),
    ("chocolate cake", "cake_image"),
    ("spaghetti bolognese", "pasta_image"),
    ("caesar salad", "caesar_salad_image"),
    ("classic caesar salad", "caesar_salad_image"),
    ("berry smoothie", "berry_smoothie"),
    ("chicken parmesan", "chicken_parmesan_image"),
    ("vegetable curry", "vegetable_curry_image"),
    ("stir fry", "stir_fry_image"),
    ("grilled salmon", "grilled_salmon_image"),
    ("stuffed pepper", "stuffed_pepper"),
    ("vegetable lasagna", "vegetable_lasagna"),
    ("tacos", "tacos_image"),
    ("salmon bowl", "salmon_bowl_image"),
    ("risotto", "risotto_image"),
    ("ratatouille", "ratatouille_image"),
    ("pasta primavera", "pasta_primavera_image"),
    ("pancakes", "pancakes_image"),
    ("chocolate mousse", "chocolate_mousse_image"),
    ("chocolate lava cake", "chocolate_lava_cake_image"),
    ("buddha bowl", "buddha_bowl_image"),
    ("beef bourguignon", "beef_bourguignon_image"),
    ("banana bread", "banana_bread_image"),
    ("avocado toast", "avocado_toast_image"),
    ("blueberry pancakes", "pancakes_image"),
    ("grilled salmon bowl", "salmon_bowl_image"),
    ("mushroom risotto", "risotto_image"),
    ("vegan buddha bowl", "buddha_bowl_image"),
    ("gluten-free pasta primavera", "pasta_primavera_image"),
    ("vegan chocolate mousse", "chocolate_mousse_image"),
    ("gluten-free banana bread", "banana_bread_image"),
    ("stuffed bell peppers", "stuffed_pepper"),
    ("vegetable stir fry", "stir_fry_image"),
];

impl ImageHandle {
    /// Image shown when nothing else matches.
    pub const FALLBACK: Self = Self("cake_image");

    /// Asset name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.0
    }

    /// Image for a category, if the category has one.
    #[must_use]
    pub fn for_category(category: RecipeCategory) -> Option<Self> {
        CATEGORY_IMAGES
            .iter()
            .find(|(c, _)| *c == category)
            .map(|&(_, image)| Self(image))
    }

    /// Image for a recipe name. Matching is exact after lower-casing.
    #[must_use]
    pub fn for_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        NAME_IMAGES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, image)| Self(image))
    }

    /// Pick the image for a recipe.
    ///
    /// An image already set on the recipe wins unless it is the fallback;
    /// then the category table, the name table, and finally
    /// [`ImageHandle::FALLBACK`].
    #[must_use]
    pub fn resolve(recipe: &Recipe) -> Self {
        recipe
            .image
            .filter(|image| *image != Self::FALLBACK)
            .or_else(|| Self::for_category(recipe.category))
            .or_else(|| Self::for_name(&recipe.name))
            .unwrap_or(Self::FALLBACK)
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(name: &str, category: RecipeCategory) -> Recipe {
        Recipe {
            name: name.to_string(),
            category,
            ..Recipe::default()
        }
    }

    #[test]
    fn test_category_takes_precedence_over_name() {
        let r = recipe("Greek Salad", RecipeCategory::Dinner);
        assert_eq!(ImageHandle::resolve(&r).name(), "beef_bourguignon_image");
    }

    #[test]
    fn test_name_used_when_category_has_no_image() {
        let r = recipe("Greek Salad", RecipeCategory::Salad);
        assert_eq!(ImageHandle::resolve(&r).name(), "greek_salad_image");

        let r = recipe("VEGETABLE CURRY", RecipeCategory::Vegetarian);
        assert_eq!(ImageHandle::resolve(&r).name(), "vegetable_curry_image");
    }

    #[test]
    fn test_name_match_is_exact() {
        assert!(ImageHandle::for_name("Greek Salad Deluxe").is_none());
        assert!(ImageHandle::for_name("greek salad").is_some());
    }

    #[test]
    fn test_fallback() {
        let r = recipe("Mystery Stew", RecipeCategory::Vegan);
        assert_eq!(ImageHandle::resolve(&r), ImageHandle::FALLBACK);
        assert_eq!(ImageHandle::FALLBACK.to_string(), "cake_image");
    }

    #[test]
    fn test_explicit_image_wins() {
        let mut r = recipe("Greek Salad", RecipeCategory::Dinner);
        r.image = ImageHandle::for_name("tacos");
        assert_eq!(ImageHandle::resolve(&r).name(), "tacos_image");
    }

    #[test]
    fn test_explicit_fallback_is_not_sticky() {
        let mut r = recipe("Pancakes", RecipeCategory::Vegan);
        r.image = Some(ImageHandle::FALLBACK);
        assert_eq!(ImageHandle::resolve(&r).name(), "pancakes_image");
    }

    #[test]
    fn test_resolution_is_total() {
        for category in RecipeCategory::ALL {
            for name in ["", "greek salad", "unknown", "Ratatouille"] {
                let image = ImageHandle::resolve(&recipe(name, category));
                assert!(!image.name().is_empty());
            }
        }
    }

    #[test]
    fn test_name_table_size() {
        assert_eq!(NAME_IMAGES.len(), 34);
    }
}
