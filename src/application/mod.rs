//! Application services layer.

pub mod contact;
pub mod content;
pub mod error;
pub mod filters;
pub mod pagination;
pub mod references;
pub mod repos;
