// src/services/mod.rs
pub mod chat_context;
pub mod marketing;
pub mod quota;

pub use marketing::MarketingPackageService;
