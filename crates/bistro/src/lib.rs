//! `bistro` - Recipe management with favorites, feedback and accounts
//!
//! This library provides the services behind the `bistro` binary: an
//! authentication gateway, recipe retrieval and reconciliation, favorites,
//! feedback and local settings, all running against a document store and an
//! identity provider reached through traits. Embedded `SQLite`
//! implementations of both are included.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod favorites;
pub mod feedback;
pub mod logging;
pub mod predefined;
pub mod recipe;
pub mod recipes;
pub mod settings;
pub mod store;
pub mod subscription;
pub mod validation;

pub use app::{App, Status};
pub use auth::{AuthGateway, AuthUser, IdentityProvider, LocalIdentityProvider};
pub use config::Config;
pub use error::{Error, Result};
pub use favorites::{FavoriteSet, Favorites};
pub use feedback::FeedbackSink;
pub use logging::init_logging;
pub use recipe::{Recipe, RecipeCategory, RecipeDraft};
pub use recipes::RecipeBook;
pub use settings::{Settings, SettingsStore};
pub use store::{DocumentStore, SqliteStore};
pub use subscription::{Subscription, SubscriptionHandle, SubscriptionSet};
