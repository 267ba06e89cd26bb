//! Caching client for World of Warcraft character and Mythic+ statistics.
//!
//! Every read goes through [`cache::QueryClient`], which coalesces identical
//! concurrent requests, serves stale data while revalidating, and invalidates
//! affected keys after writes.

pub mod api;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod query;
pub mod render;
pub mod seasons;
