//! Dependency-injection root. No module-level singletons: a [`Session`]
//! owns one [`crate::infrastructure::kis::TokenService`], one
//! [`crate::infrastructure::kis::ApiClient`], one
//! [`crate::application::AccountStateManager`], and one
//! [`crate::application::TradingCycleEngine`] per account, constructed once
//! here and handed out to collaborators as `Arc` clones.

pub mod session;

pub use session::Session;
