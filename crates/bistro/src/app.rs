//! Application context.
//!
//! [`App`] wires the services to one document store and one identity
//! provider. Everything that needs a collaborator receives it from here.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::auth::{AuthGateway, AuthUser, IdentityProvider, LocalIdentityProvider};
use crate::config::Config;
use crate::error::Result;
use crate::favorites::Favorites;
use crate::feedback::FeedbackSink;
use crate::recipes::RecipeBook;
use crate::settings::{Settings, SettingsStore};
use crate::store::{DocumentStore, SqliteStore, RECIPES};
use crate::validation::MIN_PASSWORD_LENGTH;

/// Shared services for one running instance.
#[derive(Debug, Clone)]
pub struct App {
    /// Authentication gateway.
    pub auth: AuthGateway,
    /// Recipe retrieval, reconciliation and CRUD.
    pub recipes: RecipeBook,
    /// Favorites on both storage paths.
    pub favorites: Favorites,
    /// Feedback submission.
    pub feedback: FeedbackSink,
    /// Local settings file.
    pub settings: SettingsStore,
    /// The document store every service writes to.
    pub store: Arc<dyn DocumentStore>,
    /// The embedded identity provider, when it backs [`App::auth`].
    pub identity: Option<Arc<LocalIdentityProvider>>,
}

/// Snapshot reported by `bistro status`.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    /// The signed-in user, if any.
    pub user: Option<AuthUser>,
    /// Recipe documents in the store, owned and predefined.
    pub recipe_count: usize,
    /// Favorites of the signed-in user.
    pub favorite_count: Option<usize>,
    /// Current local settings.
    pub settings: Settings,
}

impl App {
    /// Build the services around a store and an identity provider.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn IdentityProvider>,
        settings: SettingsStore,
        channel_capacity: usize,
    ) -> Self {
        let auth = AuthGateway::new(provider);
        Self {
            recipes: RecipeBook::new(Arc::clone(&store), auth.clone(), channel_capacity),
            favorites: Favorites::new(Arc::clone(&store), auth.clone(), channel_capacity),
            feedback: FeedbackSink::new(Arc::clone(&store), auth.clone()),
            settings,
            store,
            auth,
            identity: None,
        }
    }

    /// Build the services with the embedded identity provider, keeping a
    /// handle to it for account administration.
    #[must_use]
    pub fn with_local_identity(
        store: Arc<dyn DocumentStore>,
        identity: Arc<LocalIdentityProvider>,
        settings: SettingsStore,
        channel_capacity: usize,
    ) -> Self {
        let provider: Arc<dyn IdentityProvider> = identity.clone();
        let mut app = Self::new(store, provider, settings, channel_capacity);
        app.identity = Some(identity);
        app
    }

    /// Open the databases and settings file named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if either database cannot be opened or migrated.
    pub fn open(config: &Config) -> Result<Self> {
        let store = SqliteStore::open(config.database_path())?;
        let identity =
            LocalIdentityProvider::open(config.identity_path(), config.identity_policy())?;
        debug!(
            "Opened document store at {} and identity store at {}",
            store.path().display(),
            identity.path().display()
        );

        let app = Self::with_local_identity(
            Arc::new(store),
            Arc::new(identity),
            SettingsStore::new(config.settings_path()),
            config.subscriptions.channel_capacity,
        );
        if let Some(user) = app.auth.current_user() {
            info!("Resumed session for {}", user.email);
        }
        Ok(app)
    }

    /// Shortest password the identity provider accepts at registration.
    #[must_use]
    pub fn min_password_length(&self) -> usize {
        self.identity
            .as_ref()
            .map_or(MIN_PASSWORD_LENGTH, |identity| {
                identity.policy().min_password_length
            })
    }

    /// Reset requests still allowed for `email` in the current hour.
    ///
    /// `None` when the provider is not the embedded one or the count can't
    /// be read.
    #[must_use]
    pub fn reset_requests_remaining(&self, email: &str) -> Option<u32> {
        let identity = self.identity.as_ref()?;
        let used = identity.recent_reset_requests(email).ok()?;
        Some(
            identity
                .policy()
                .max_reset_requests_per_hour
                .saturating_sub(used),
        )
    }

    /// Collect a status snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or settings file can't be read.
    pub async fn status(&self) -> Result<Status> {
        let user = self.auth.current_user();
        let recipe_count = self.store.count(RECIPES).await?;
        let favorite_count = match &user {
            Some(user) => Some(self.favorites.favorite_ids(&user.uid).await?.len()),
            None => None,
        };

        Ok(Status {
            user,
            recipe_count,
            favorite_count,
            settings: self.settings.load()?,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fully in-memory [`App`] instances for service tests.

    use std::sync::Arc;

    use super::App;
    use crate::auth::{AuthUser, IdentityPolicy, LocalIdentityProvider};
    use crate::settings::SettingsStore;
    use crate::store::{generate_id, SqliteStore};
    use crate::subscription::DEFAULT_CHANNEL_CAPACITY;

    /// An app with empty stores and nobody signed in.
    pub fn app() -> App {
        let store = SqliteStore::open_in_memory().expect("in-memory store");
        let identity = LocalIdentityProvider::open_in_memory(IdentityPolicy::default())
            .expect("in-memory identity provider");
        let settings = std::env::temp_dir()
            .join(format!("bistro-app-{}", generate_id(12)))
            .join("settings.json");

        App::with_local_identity(
            Arc::new(store),
            Arc::new(identity),
            SettingsStore::new(settings),
            DEFAULT_CHANNEL_CAPACITY,
        )
    }

    /// An app with a freshly registered, signed-in user.
    pub async fn signed_in_app() -> (App, AuthUser) {
        let app = app();
        let user = app
            .auth
            .register("Test Cook", "cook@example.com", "secret123")
            .await
            .expect("registration");
        (app, user)
    }
}
