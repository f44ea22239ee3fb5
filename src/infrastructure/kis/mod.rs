//! Everything that talks to the broker's HTTPS OAuth-style API: the TR-ID
//! table, wire DTOs, the sliding-window rate limiter, the token service,
//! and the API client that ties them together with retry/classification.

pub mod client;
pub mod rate_limiter;
pub mod token_service;
pub mod tr_id;
pub mod wire;

pub use client::ApiClient;
pub use rate_limiter::RateLimiter;
pub use token_service::TokenService;
