mod admin;
mod middleware;
mod public;
pub mod response;

pub use admin::build_admin_router;
pub use middleware::RequestContext;
pub use public::build_router;

use std::str::FromStr;
use std::sync::Arc;

use crate::application::contact::ContactService;
use crate::application::content::ContentService;
use crate::application::error::AppError;
use crate::application::repos::{ContentRepo, ContentWriteRepo};
use crate::config::SiteSettings;
use crate::domain::types::Resource;
use crate::infra::cache::CacheServices;
use crate::infra::db::PostgresRepositories;

/// Shared state of both listeners.
#[derive(Clone)]
pub struct AppState {
    pub content: Arc<ContentService>,
    pub contacts: Arc<ContactService>,
    pub cache: CacheServices,
    pub site: Arc<SiteSettings>,
    /// Present when content lives in Postgres; checked by the health route.
    pub database: Option<Arc<PostgresRepositories>>,
}

impl AppState {
    pub fn new(
        reader: Arc<dyn ContentRepo>,
        writer: Arc<dyn ContentWriteRepo>,
        cache: CacheServices,
        site: SiteSettings,
        database: Option<Arc<PostgresRepositories>>,
    ) -> Self {
        let content = ContentService::new(
            reader,
            writer.clone(),
            cache.queries.clone(),
            cache.trigger.clone(),
        );
        let contacts = ContactService::new(writer, cache.trigger.clone());
        Self {
            content: Arc::new(content),
            contacts: Arc::new(contacts),
            cache,
            site: Arc::new(site),
            database,
        }
    }
}

/// Resource named by a path segment; unknown names are a 404.
fn path_resource(segment: &str) -> Result<Resource, AppError> {
    Resource::from_str(segment).map_err(|_| AppError::NotFound)
}
