// src/handlers/mod.rs
pub mod account;
pub mod admin;
pub mod auth;
pub mod billing;
pub mod chat;
pub mod generate;
pub mod marketing;
pub mod upload;
