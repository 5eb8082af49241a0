//! Agora - a community platform with blogs, forums and moderation
//!
//! This library provides the core of the Agora server: configuration, storage,
//! domain services and the HTTP API.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
