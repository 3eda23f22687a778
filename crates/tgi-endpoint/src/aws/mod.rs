//! Minimal AWS plumbing: credentials, SigV4 signing and a signed HTTP client.

pub mod credentials;
pub mod http;
pub mod signing;

pub use credentials::Credentials;
pub use http::SignedClient;
