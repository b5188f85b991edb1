//! Quire - a content-management backend
//!
//! Articles with editorial review, threaded comments, role-based access
//! control, media uploads, notifications and a newsletter, served as a JSON
//! API under `/api/v1`.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod events;
pub mod models;
pub mod services;
