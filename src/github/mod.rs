pub mod client;
pub mod transport;
pub mod rate_limiter;
pub mod paginator;

#[cfg(test)]
pub(crate) mod testing;

pub use client::GitHubClient;
pub use transport::{HttpTransport, Response, Transport};
pub use rate_limiter::{RateLimitState, RateLimiter};
pub use paginator::Paginator;
