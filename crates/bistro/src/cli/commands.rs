//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::recipe::{RecipeCategory, RecipeDraft};

/// Account commands.
#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Create an account and sign in
    Register {
        /// E-mail address
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Password
        #[arg(short, long)]
        password: String,

        /// Password confirmation (defaults to the password)
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Sign in
    Login {
        /// E-mail address
        email: String,

        /// Password
        #[arg(short, long)]
        password: String,
    },

    /// Sign out
    Logout,

    /// Send a password reset message
    Reset {
        /// E-mail address
        email: String,
    },

    /// Show the signed-in user
    Whoami {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Check whether an address has an account
    Check {
        /// E-mail address
        email: String,
    },

    /// Disable an account
    Disable {
        /// E-mail address
        email: String,
    },

    /// Re-enable a disabled account
    Enable {
        /// E-mail address
        email: String,
    },
}

/// Recipe commands.
#[derive(Debug, Subcommand)]
pub enum RecipeCommand {
    /// List recipes visible to the signed-in user
    List(ListCommand),

    /// Show one recipe
    Show {
        /// Recipe id
        id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add a recipe
    Add(RecipeForm),

    /// Edit a recipe
    Edit {
        /// Recipe id
        id: String,

        /// Fields to replace
        #[command(flatten)]
        changes: RecipeChanges,
    },

    /// Delete a recipe
    Delete {
        /// Recipe id
        id: String,
    },

    /// Insert the predefined recipes if none are stored yet
    Seed,

    /// Print recipe snapshots as they change
    Watch {
        /// Watch a single recipe instead of the list
        id: Option<String>,

        /// Watch only the signed-in user's own recipes
        #[arg(short, long, conflicts_with = "id")]
        mine: bool,
    },
}

/// Recipe list arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Only the signed-in user's own recipes, newest first
    #[arg(short, long)]
    pub mine: bool,

    /// Keep recipes in these categories (comma separated)
    #[arg(long, value_delimiter = ',', value_parser = parse_category)]
    pub category: Vec<RecipeCategory>,

    /// Keep recipes whose name or description contains this text
    #[arg(short, long)]
    pub search: Option<String>,

    /// Only favorites
    #[arg(short, long)]
    pub favorites: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Fields of a new recipe.
#[derive(Debug, Args)]
pub struct RecipeForm {
    /// Recipe name
    #[arg(short, long)]
    pub name: String,

    /// Short description
    #[arg(short, long)]
    pub description: String,

    /// Cook time, e.g. "45"
    #[arg(short = 't', long, default_value = "")]
    pub cook_time: String,

    /// Category
    #[arg(long, default_value = "ALL", value_parser = parse_category)]
    pub category: RecipeCategory,

    /// Ingredient line (repeatable)
    #[arg(short, long = "ingredient")]
    pub ingredients: Vec<String>,

    /// Instruction step (repeatable)
    #[arg(short, long = "step")]
    pub steps: Vec<String>,
}

impl RecipeForm {
    /// Turn the arguments into a draft.
    #[must_use]
    pub fn into_draft(self) -> RecipeDraft {
        RecipeDraft::from_form(
            &self.name,
            &self.description,
            &self.cook_time,
            self.category,
            &self.ingredients.join("\n"),
            &self.steps.join("\n"),
        )
    }
}

/// Optional replacements for an existing recipe.
#[derive(Debug, Default, Args)]
pub struct RecipeChanges {
    /// New name
    #[arg(short, long)]
    pub name: Option<String>,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// New cook time
    #[arg(short = 't', long)]
    pub cook_time: Option<String>,

    /// New category
    #[arg(long, value_parser = parse_category)]
    pub category: Option<RecipeCategory>,

    /// Replacement ingredient list (repeatable)
    #[arg(short, long = "ingredient")]
    pub ingredients: Vec<String>,

    /// Replacement instruction list (repeatable)
    #[arg(short, long = "step")]
    pub steps: Vec<String>,
}

impl RecipeChanges {
    /// Apply the given replacements on top of `draft`.
    #[must_use]
    pub fn apply(self, mut draft: RecipeDraft) -> RecipeDraft {
        if let Some(name) = self.name {
            draft.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            draft.description = description.trim().to_string();
        }
        if let Some(cook_time) = self.cook_time {
            draft.cook_time = cook_time.trim().to_string();
        }
        if let Some(category) = self.category {
            draft.category = category;
        }
        if !self.ingredients.is_empty() {
            draft.ingredients = crate::validation::split_lines(&self.ingredients.join("\n"));
        }
        if !self.steps.is_empty() {
            draft.instructions = crate::validation::split_lines(&self.steps.join("\n"));
        }
        draft
    }
}

/// Favorites commands.
#[derive(Debug, Subcommand)]
pub enum FavoriteCommand {
    /// Add or remove a recipe from favorites
    Toggle {
        /// Recipe id
        recipe_id: String,
    },

    /// Mark a recipe as favorite
    Add {
        /// Recipe id
        recipe_id: String,
    },

    /// Remove a recipe from favorites
    Remove {
        /// Recipe id
        recipe_id: String,
    },

    /// List favorite recipes
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print favorite recipe ids
    Ids {
        /// Read the ids stored on the user document instead
        #[arg(short, long)]
        array: bool,
    },

    /// Replace the ids stored on the user document
    Save {
        /// Recipe ids
        recipe_ids: Vec<String>,
    },

    /// Copy the favorites into the ids stored on the user document
    Sync,

    /// Print favorites as they change
    Watch {
        /// Watch the ids stored on the user document instead
        #[arg(short, long)]
        array: bool,
    },
}

/// Feedback commands.
#[derive(Debug, Subcommand)]
pub enum FeedbackCommand {
    /// Send feedback
    Send {
        /// Feedback text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
}

/// Settings commands.
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Choose the color theme
    Theme {
        /// Theme
        #[arg(value_enum)]
        theme: ThemeArg,
    },

    /// Turn notifications on or off
    Notifications {
        /// New state
        #[arg(value_enum)]
        state: Switch,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Theme argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ThemeArg {
    /// Light theme
    Light,
    /// Dark theme
    Dark,
}

/// On/off argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    /// Enabled
    On,
    /// Disabled
    Off,
}

impl Switch {
    /// Whether the switch is on.
    #[must_use]
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

fn parse_category(value: &str) -> Result<RecipeCategory, String> {
    value
        .parse::<RecipeCategory>()
        .map_err(|e| e.user_message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_command_debug() {
        let cmd = AuthCommand::Reset {
            email: "a@b.co".to_string(),
        };
        let debug_str = format!("{:?}", cmd);
        assert!(debug_str.contains("Reset"));
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("dessert"), Ok(RecipeCategory::Dessert));
        assert_eq!(parse_category("gluten-free"), Ok(RecipeCategory::GlutenFree));
        assert!(parse_category("brunch").is_err());
    }

    #[test]
    fn test_recipe_form_into_draft() {
        let form = RecipeForm {
            name: " Soup ".to_string(),
            description: "Warm".to_string(),
            cook_time: "30".to_string(),
            category: RecipeCategory::Dinner,
            ingredients: vec!["water".to_string(), " ".to_string(), "salt".to_string()],
            steps: vec!["boil".to_string()],
        };
        let draft = form.into_draft();

        assert_eq!(draft.name, "Soup");
        assert_eq!(draft.ingredients, vec!["water", "salt"]);
        assert_eq!(draft.instructions, vec!["boil"]);
    }

    #[test]
    fn test_recipe_changes_keep_unset_fields() {
        let draft = RecipeDraft {
            name: "Soup".to_string(),
            description: "Warm".to_string(),
            ingredients: vec!["water".to_string()],
            ..RecipeDraft::default()
        };
        let changes = RecipeChanges {
            description: Some("Hot".to_string()),
            category: Some(RecipeCategory::Vegan),
            ..RecipeChanges::default()
        };
        let draft = changes.apply(draft);

        assert_eq!(draft.name, "Soup");
        assert_eq!(draft.description, "Hot");
        assert_eq!(draft.category, RecipeCategory::Vegan);
        assert_eq!(draft.ingredients, vec!["water"]);
    }

    #[test]
    fn test_switch() {
        assert!(Switch::On.is_on());
        assert!(!Switch::Off.is_on());
    }
}
