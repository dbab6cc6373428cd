//! Folio: portfolio content backend with a versioned, cluster-wide cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
