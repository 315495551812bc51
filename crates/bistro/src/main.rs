//! `bistro` - CLI for the bistro recipe manager
//!
//! This binary is the presentation layer: it parses commands, calls the
//! services on [`App`], and prints plain text or JSON.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use tracing::{debug, warn};

use bistro::cli::{
    AuthCommand, Cli, Command, ConfigCommand, FavoriteCommand, FeedbackCommand, ListCommand,
    RecipeCommand, SettingsCommand, ThemeArg,
};
use bistro::recipe::{Recipe, RecipeDraft, RecipeFilter};
use bistro::recipes::SeedOutcome;
use bistro::settings::{Settings, SettingsStore};
use bistro::subscription::Subscription;
use bistro::validation::{validate_login, validate_registration, validate_reset};
use bistro::{init_logging, App, AuthUser, Config, Error, Result};

const USE_FAVORITES: &str = "User must be logged in to use favorites";

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Validation reads its own file; don't fail on a broken default config first.
    if let Command::Config(ConfigCommand::Validate { file }) = cli.command {
        handle_validate(file.or(cli.config));
        return Ok(());
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    let result = match cli.command {
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        Command::Settings(settings_cmd) => {
            handle_settings(&SettingsStore::new(config.settings_path()), settings_cmd)
        }
        command => {
            let app = App::open(&config).with_context(|| {
                format!(
                    "failed to open data store at {}",
                    config.database_path().display()
                )
            })?;
            run(&app, &config, command).await
        }
    };

    if let Err(err) = result {
        debug!("Command failed: {:?}", err);
        eprintln!("{}", err.user_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(app: &App, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Auth(cmd) => handle_auth(app, cmd).await,
        Command::Recipe(cmd) => handle_recipe(app, cmd).await,
        Command::Favorite(cmd) => handle_favorite(app, cmd).await,
        Command::Feedback(FeedbackCommand::Send { message }) => {
            app.feedback.submit(&message.join(" ")).await?;
            println!("Thank you for your feedback!");
            Ok(())
        }
        Command::Status(status_cmd) => handle_status(app, config, status_cmd.json).await,
        Command::Settings(cmd) => handle_settings(&app.settings, cmd),
        Command::Config(cmd) => handle_config(config, cmd),
    }
}

// === Auth ===

async fn handle_auth(app: &App, cmd: AuthCommand) -> Result<()> {
    match cmd {
        AuthCommand::Register {
            email,
            name,
            password,
            confirm,
        } => {
            let confirm = confirm.unwrap_or_else(|| password.clone());
            validate_registration(
                &name,
                &email,
                &password,
                &confirm,
                app.min_password_length(),
            )?;
            let user = app.auth.register(&name, &email, &password).await?;
            println!("Registered and signed in as {}", user.email);
        }
        AuthCommand::Login { email, password } => {
            validate_login(&email, &password)?;
            let user = app.auth.sign_in(&email, &password).await?;
            println!("Signed in as {}", user.email);
        }
        AuthCommand::Logout => {
            app.auth.sign_out().await?;
            println!("Signed out");
        }
        AuthCommand::Reset { email } => {
            validate_reset(&email)?;
            app.auth.reset_password(&email).await?;
            println!("Password reset instructions sent to {}", email.trim());
            if let Some(remaining) = app.reset_requests_remaining(&email) {
                println!("{remaining} more reset requests allowed this hour");
            }
        }
        AuthCommand::Whoami { json } => match app.auth.current_user() {
            Some(user) if json => println!("{}", serde_json::to_string_pretty(&user)?),
            Some(user) => print_user(&user),
            None if json => println!("null"),
            None => println!("Not signed in"),
        },
        AuthCommand::Check { email } => {
            if app.auth.is_email_registered(&email).await {
                println!("{} is registered", email.trim());
            } else {
                println!("{} is not registered", email.trim());
            }
        }
        AuthCommand::Disable { email } => {
            set_disabled(app, &email, true)?;
            println!("Disabled {}", email.trim());
        }
        AuthCommand::Enable { email } => {
            set_disabled(app, &email, false)?;
            println!("Enabled {}", email.trim());
        }
    }
    Ok(())
}

fn set_disabled(app: &App, email: &str, disabled: bool) -> Result<()> {
    let identity = app
        .identity
        .as_ref()
        .ok_or_else(|| Error::internal("account administration is not available"))?;
    identity
        .set_disabled(email.trim(), disabled)
        .map_err(|e| Error::Auth {
            code: e.code,
            message: e.detail,
        })
}

fn print_user(user: &AuthUser) {
    println!("User id:  {}", user.uid);
    println!("E-mail:   {}", user.email);
    if let Some(name) = &user.display_name {
        println!("Name:     {name}");
    }
}

// === Recipes ===

async fn handle_recipe(app: &App, cmd: RecipeCommand) -> Result<()> {
    match cmd {
        RecipeCommand::List(list) => handle_list(app, list).await,
        RecipeCommand::Show { id, json } => {
            let recipe = app.recipes.get_recipe(&id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&recipe)?);
            } else {
                print_recipe(&recipe);
            }
            Ok(())
        }
        RecipeCommand::Add(form) => {
            let id = app.recipes.create_recipe(form.into_draft()).await?;
            println!("Recipe added: {id}");
            Ok(())
        }
        RecipeCommand::Edit { id, changes } => {
            let mut recipe = app.recipes.get_recipe(&id).await?;
            let draft = changes.apply(RecipeDraft {
                name: recipe.name.clone(),
                description: recipe.description.clone(),
                cook_time: recipe.cook_time.clone(),
                category: recipe.category,
                ingredients: recipe.ingredients.clone(),
                instructions: recipe.instructions.clone(),
            });
            draft.validate()?;
            draft.apply_to(&mut recipe);
            app.recipes.update_recipe(&recipe).await?;
            println!("Recipe updated: {id}");
            Ok(())
        }
        RecipeCommand::Delete { id } => {
            app.recipes.delete_recipe(&id).await?;
            println!("Recipe deleted: {id}");
            Ok(())
        }
        RecipeCommand::Seed => {
            match app.recipes.seed_predefined().await? {
                SeedOutcome::AlreadySeeded => println!("Recipes are already present"),
                SeedOutcome::Inserted { inserted, failed } if failed > 0 => {
                    println!("Added {inserted} predefined recipes ({failed} failed)");
                }
                SeedOutcome::Inserted { inserted, .. } => {
                    println!("Added {inserted} predefined recipes");
                }
            }
            Ok(())
        }
        RecipeCommand::Watch { id: Some(id), .. } => {
            follow(app.recipes.watch_recipe(&id), |recipe| {
                match recipe {
                    Some(recipe) => print_recipe(&recipe),
                    None => println!("Recipe not found"),
                }
                println!();
            })
            .await
        }
        RecipeCommand::Watch { id: None, mine } => {
            let user = app
                .auth
                .require_user("User must be logged in to view recipes")?;
            let subscription = if mine {
                app.recipes.watch_user_recipes(&user.uid)
            } else {
                app.recipes.watch_recipes_for_user(&user.uid)
            };
            follow(subscription, |recipes| {
                print_recipe_table(&recipes);
                println!();
            })
            .await
        }
    }
}

async fn handle_list(app: &App, list: ListCommand) -> Result<()> {
    let recipes = if list.mine {
        app.recipes.current_user_recipes().await?
    } else {
        app.recipes.recipes_for_current_user().await?
    };

    let mut filter = RecipeFilter::new()
        .with_categories(list.category)
        .with_query(list.search.unwrap_or_default());
    if list.favorites {
        let user = app.auth.require_user(USE_FAVORITES)?;
        filter = filter.with_favorites(app.favorites.favorite_ids(&user.uid).await?);
    }
    let recipes = filter.apply(recipes);

    if list.json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else if recipes.is_empty() {
        println!("No recipes found");
    } else {
        print_recipe_table(&recipes);
    }
    Ok(())
}

fn print_recipe_table(recipes: &[Recipe]) {
    for recipe in recipes {
        println!(
            "{:<20}  {:<32}  {:<12}  {:>3.1}  {}",
            recipe.id,
            recipe.name,
            recipe.category.as_str(),
            recipe.rating,
            recipe.display_image()
        );
    }
}

fn print_recipe(recipe: &Recipe) {
    println!("{}", recipe.name);
    println!("{}", "=".repeat(recipe.name.chars().count()));
    println!("Id:          {}", recipe.id);
    println!("Category:    {}", recipe.category);
    if !recipe.cook_time.is_empty() {
        println!("Cook time:   {} min", recipe.cook_time);
    }
    println!(
        "Rating:      {:.1} ({} reviews)",
        recipe.rating, recipe.review_count
    );
    println!("Image:       {}", recipe.display_image());
    println!();
    println!("{}", recipe.description);

    if !recipe.ingredients.is_empty() {
        println!();
        println!("Ingredients:");
        for ingredient in &recipe.ingredients {
            println!("  - {ingredient}");
        }
    }
    if !recipe.instructions.is_empty() {
        println!();
        println!("Instructions:");
        for (step, instruction) in recipe.instructions.iter().enumerate() {
            println!("  {}. {instruction}", step + 1);
        }
    }
}

// === Favorites ===

async fn handle_favorite(app: &App, cmd: FavoriteCommand) -> Result<()> {
    let user = app.auth.require_user(USE_FAVORITES)?;

    match cmd {
        FavoriteCommand::Toggle { recipe_id } => {
            if app.favorites.toggle_favorite(&user.uid, &recipe_id).await? {
                println!("Added {recipe_id} to favorites");
            } else {
                println!("Removed {recipe_id} from favorites");
            }
        }
        FavoriteCommand::Add { recipe_id } => {
            app.favorites.add_favorite(&user.uid, &recipe_id).await?;
            println!("Added {recipe_id} to favorites");
        }
        FavoriteCommand::Remove { recipe_id } => {
            app.favorites.remove_favorite(&user.uid, &recipe_id).await?;
            println!("Removed {recipe_id} from favorites");
        }
        FavoriteCommand::List { json } => {
            let recipes = app.favorites.favorite_recipes(&user.uid).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&recipes)?);
            } else if recipes.is_empty() {
                println!("No favorite recipes yet");
            } else {
                print_recipe_table(&recipes);
            }
        }
        FavoriteCommand::Ids { array } => {
            let ids = if array {
                app.favorites.user_favorites(&user.uid).await?
            } else {
                app.favorites.favorite_ids(&user.uid).await?.to_vec()
            };
            for id in ids {
                println!("{id}");
            }
        }
        FavoriteCommand::Save { recipe_ids } => {
            let saved = app.favorites.save_current_user_favorites(&recipe_ids).await?;
            println!("Saved {} favorites", saved.len());
        }
        FavoriteCommand::Sync => {
            let ids = app.favorites.sync_array_from_subcollection(&user.uid).await?;
            println!("Synced {} favorites", ids.len());
        }
        FavoriteCommand::Watch { array: true } => {
            let subscription = app.favorites.watch_user_favorites(&user.uid).await?;
            follow(subscription, |ids| println!("{}", ids.join(", "))).await?;
        }
        FavoriteCommand::Watch { array: false } => {
            follow(app.favorites.watch_favorite_recipes(&user.uid), |recipes| {
                print_recipe_table(&recipes);
                println!();
            })
            .await?;
        }
    }
    Ok(())
}

/// Print snapshots until the subscription ends or Ctrl-C is pressed.
async fn follow<T>(mut subscription: Subscription<T>, mut print: impl FnMut(T)) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            snapshot = subscription.next() => match snapshot {
                Some(Ok(value)) => print(value),
                Some(Err(err)) => warn!("{}", err.user_message()),
                None => break,
            },
            _ = &mut ctrl_c => {
                subscription.cancel();
                break;
            }
        }
    }
    Ok(())
}

// === Status, settings and configuration ===

async fn handle_status(app: &App, config: &Config, json: bool) -> Result<()> {
    let status = app.status().await?;

    if json {
        let report = serde_json::json!({
            "status": status,
            "database_path": config.database_path(),
            "identity_path": config.identity_path(),
            "settings_path": config.settings_path(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("bistro status");
        println!("-------------");
        match &status.user {
            Some(user) => println!("Signed in:     {}", user.email),
            None => println!("Signed in:     no"),
        }
        println!("Recipes:       {}", status.recipe_count);
        if let Some(count) = status.favorite_count {
            println!("Favorites:     {count}");
        }
        println!("Dark mode:     {}", on_off(status.settings.dark_mode));
        println!(
            "Notifications: {}",
            on_off(status.settings.notifications_enabled)
        );
        println!("Database:      {}", config.database_path().display());
        println!("Accounts:      {}", config.identity_path().display());
    }
    Ok(())
}

fn handle_settings(store: &SettingsStore, cmd: SettingsCommand) -> Result<()> {
    match cmd {
        SettingsCommand::Show { json } => {
            let settings = store.load()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print_settings(&settings);
            }
        }
        SettingsCommand::Theme { theme } => {
            let settings = store.set_dark_mode(theme == ThemeArg::Dark)?;
            print_settings(&settings);
        }
        SettingsCommand::Notifications { state } => {
            let settings = store.set_notifications_enabled(state.is_on())?;
            print_settings(&settings);
        }
    }
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("Dark mode:     {}", on_off(settings.dark_mode));
    println!("Notifications: {}", on_off(settings.notifications_enabled));
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:       {}", config.database_path().display());
                println!();
                println!("[Auth]");
                println!("  Identity path:       {}", config.identity_path().display());
                println!(
                    "  Min password length: {}",
                    config.auth.min_password_length
                );
                println!(
                    "  Resets per hour:     {}",
                    config.auth.max_reset_requests_per_hour
                );
                println!();
                println!("[Settings]");
                println!("  Settings path:       {}", config.settings_path().display());
                println!();
                println!("[Subscriptions]");
                println!(
                    "  Channel capacity:    {}",
                    config.subscriptions.channel_capacity
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => handle_validate(file),
    }
    Ok(())
}

fn handle_validate(file: Option<std::path::PathBuf>) {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => {
            println!("Configuration error: {e}");
            std::process::exit(1);
        }
    }
}
