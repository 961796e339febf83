pub mod admin;
pub mod auth;
pub mod logging;
pub mod rate_limit;
