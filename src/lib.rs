//! Keyword News - A keyword-driven news aggregation backend
//!
//! Users register, keep a list of keywords, and get recent articles from an
//! external news search provider matching all of those keywords.

pub mod article;
pub mod auth;
pub mod config;
pub mod db;
pub mod news;
pub mod provider;
pub mod routes;
