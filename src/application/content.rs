//! Content reads and writes for the portfolio resources.
//!
//! Writes validate the typed input, resolve referenced documents (skills,
//! links, files) into embedded snapshots, persist, and only then notify the
//! invalidation trigger. Updating or deleting a referenced document rewrites
//! the snapshots its holders carry. Reads go through the query cache.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
use tracing::{info, instrument};

use crate::application::error::AppError;
use crate::application::pagination::ListRequest;
use crate::application::references;
use crate::application::repos::{ContentRepo, ContentWriteRepo, ListQuery, RepoError};
use crate::cache::{InvalidationTrigger, MutationKind, PageEnvelope, QueryCacheManager};
use crate::domain::entities::{
    BlogInput, ExperienceInput, FileInput, LinkInput, ProjectInput, SkillInput,
};
use crate::domain::error::DomainError;
use crate::domain::types::Resource;

#[derive(Clone)]
pub struct ContentService {
    reader: Arc<dyn ContentRepo>,
    writer: Arc<dyn ContentWriteRepo>,
    queries: Arc<QueryCacheManager>,
    trigger: Arc<InvalidationTrigger>,
}

impl ContentService {
    pub fn new(
        reader: Arc<dyn ContentRepo>,
        writer: Arc<dyn ContentWriteRepo>,
        queries: Arc<QueryCacheManager>,
        trigger: Arc<InvalidationTrigger>,
    ) -> Self {
        Self {
            reader,
            writer,
            queries,
            trigger,
        }
    }

    /// Lists `resource` according to raw query parameters.
    pub async fn list(
        &self,
        resource: Resource,
        params: &HashMap<String, String>,
    ) -> Result<PageEnvelope, AppError> {
        let request =
            ListRequest::from_params(resource, params, self.queries.config().max_page_size)?;
        let envelope = self
            .queries
            .handle_list_request(resource, &request, self.reader.as_ref())
            .await?;
        Ok(envelope)
    }

    pub async fn get(&self, resource: Resource, id: i64) -> Result<Value, AppError> {
        self.reader
            .find(resource, id)
            .await?
            .ok_or_else(|| DomainError::not_found(resource.as_str()).into())
    }

    #[instrument(skip(self, payload), fields(resource = resource.as_str()))]
    pub async fn create(&self, resource: Resource, payload: Value) -> Result<Value, AppError> {
        let document = self.build_document(resource, payload).await?;
        let stored = self.writer.insert(resource, document).await?;
        self.trigger
            .resource_changed(resource, MutationKind::Created)
            .await;
        let id = stored.get("id").and_then(Value::as_i64);
        info!(id, "document created");
        Ok(stored)
    }

    #[instrument(skip(self, payload), fields(resource = resource.as_str()))]
    pub async fn update(
        &self,
        resource: Resource,
        id: i64,
        payload: Value,
    ) -> Result<Value, AppError> {
        let document = self.build_document(resource, payload).await?;
        let stored = self.writer.update(resource, id, document).await?;
        self.trigger
            .resource_changed(resource, MutationKind::Updated)
            .await;
        info!(id, "document updated");
        self.refresh_holders(resource, id, Some(&stored)).await?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(resource = resource.as_str()))]
    pub async fn delete(&self, resource: Resource, id: i64) -> Result<(), AppError> {
        ensure_editable(resource)?;
        self.writer.delete(resource, id).await?;
        self.trigger
            .resource_changed(resource, MutationKind::Deleted)
            .await;
        info!(id, "document deleted");
        self.refresh_holders(resource, id, None).await
    }

    /// Rewrites embedded copies of `target` document `id` in every holder,
    /// then bumps each holder resource that changed.
    async fn refresh_holders(
        &self,
        target: Resource,
        id: i64,
        replacement: Option<&Value>,
    ) -> Result<(), AppError> {
        for owner in references::owners(target) {
            let documents = self
                .reader
                .fetch(owner, &ListQuery::default(), None)
                .await?;
            let mut refreshed = 0_usize;
            for mut document in documents {
                let mut changed = false;
                for field in references::holders(target)
                    .iter()
                    .filter(|field| field.owner == owner)
                {
                    changed |= references::refresh(&mut document, field.slot, id, replacement);
                }
                if !changed {
                    continue;
                }
                let Some(owner_id) = document.get("id").and_then(Value::as_i64) else {
                    continue;
                };
                if let Value::Object(map) = &mut document {
                    map.remove("id");
                }
                match self.writer.update(owner, owner_id, document).await {
                    Ok(_) => refreshed += 1,
                    // Removed since the scan; nothing left to refresh.
                    Err(RepoError::NotFound) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            if refreshed > 0 {
                self.trigger
                    .resource_changed(owner, MutationKind::Updated)
                    .await;
                info!(
                    owner = owner.as_str(),
                    refreshed, "embedded references refreshed"
                );
            }
        }
        Ok(())
    }

    async fn build_document(&self, resource: Resource, payload: Value) -> Result<Value, AppError> {
        ensure_editable(resource)?;
        match resource {
            Resource::Skills => {
                let input: SkillInput = parse_input(payload)?;
                input.validate()?;
                Ok(json!({ "name": input.name, "icon": input.icon }))
            }
            Resource::Links => {
                let input: LinkInput = parse_input(payload)?;
                input.validate()?;
                Ok(json!({
                    "name": input.name,
                    "title": input.title,
                    "url": input.url,
                    "icon": input.icon,
                }))
            }
            Resource::Files => {
                let input: FileInput = parse_input(payload)?;
                input.validate()?;
                let uploaded_at = input.uploaded_at.format(&Rfc3339).map_err(|err| {
                    AppError::validation(format!("field `uploaded_at` cannot be formatted: {err}"))
                })?;
                Ok(json!({
                    "public_id": input.public_id,
                    "version": input.version,
                    "format": input.format,
                    "resource_type": input.resource_type,
                    "file_type": input.file_type,
                    "uploaded_at": uploaded_at,
                    "metadata": input.metadata,
                }))
            }
            Resource::Blogs => {
                let input: BlogInput = parse_input(payload)?;
                input.validate()?;
                let cover_img = self.optional_ref(Resource::Files, input.cover_img_id).await?;
                let skills = self.skill_refs(&input.skill_ids).await?;
                Ok(json!({
                    "title": input.title,
                    "content": input.content,
                    "description": input.description,
                    "status": input.status,
                    "cover_img": cover_img,
                    "skills": skills,
                }))
            }
            Resource::Experiences => {
                let input: ExperienceInput = parse_input(payload)?;
                input.validate()?;
                let company_img = self
                    .optional_ref(Resource::Files, input.company_img_id)
                    .await?;
                Ok(json!({
                    "company_img": company_img,
                    "company_name": input.company_name,
                    "job_title": input.job_title,
                    "description": input.description,
                    "working_period": input.working_period,
                    "join_date": input.join_date,
                    "leave_date": input.leave_date,
                }))
            }
            Resource::Projects => {
                let input: ProjectInput = parse_input(payload)?;
                input.validate()?;
                let link_github = self.required_ref(Resource::Links, input.link_github_id).await?;
                let link_website = self
                    .required_ref(Resource::Links, input.link_website_id)
                    .await?;
                let skills = self.skill_refs(&input.skill_ids).await?;
                let mut images = Vec::with_capacity(input.image_ids.len());
                for image_id in &input.image_ids {
                    let image = self.required_ref(Resource::Files, *image_id).await?;
                    images.push(json!({ "id": image_id, "image": image }));
                }
                Ok(json!({
                    "name": input.name,
                    "descriptions": input.descriptions,
                    "link_github": link_github,
                    "link_website": link_website,
                    "skills": skills,
                    "images": images,
                }))
            }
            Resource::Contacts | Resource::Settings => Err(not_editable(resource)),
        }
    }

    /// Embedded snapshot of a referenced document; unknown ids are rejected.
    async fn required_ref(&self, resource: Resource, id: i64) -> Result<Value, AppError> {
        self.reader.find(resource, id).await?.ok_or_else(|| {
            AppError::validation(format!(
                "referenced {} `{id}` does not exist",
                resource.as_str()
            ))
        })
    }

    async fn optional_ref(&self, resource: Resource, id: Option<i64>) -> Result<Value, AppError> {
        match id {
            Some(id) => self.required_ref(resource, id).await,
            None => Ok(Value::Null),
        }
    }

    async fn skill_refs(&self, ids: &[i64]) -> Result<Vec<Value>, AppError> {
        let mut skills = Vec::with_capacity(ids.len());
        for id in ids {
            if skills
                .iter()
                .any(|skill: &Value| skill.get("id").and_then(Value::as_i64) == Some(*id))
            {
                continue;
            }
            skills.push(self.required_ref(Resource::Skills, *id).await?);
        }
        Ok(skills)
    }
}

fn parse_input<T: DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    serde_json::from_value(payload)
        .map_err(|err| AppError::validation(format!("invalid payload: {err}")))
}

fn ensure_editable(resource: Resource) -> Result<(), AppError> {
    if resource.is_editable() {
        Ok(())
    } else {
        Err(not_editable(resource))
    }
}

fn not_editable(resource: Resource) -> AppError {
    AppError::validation(format!(
        "{} cannot be modified through this endpoint",
        resource.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MemoryBackend, VersionStore, VersionedCacheStore};
    use crate::infra::memory::MemoryRepositories;
    use std::num::NonZeroUsize;

    struct Fixture {
        service: ContentService,
        versions: Arc<VersionStore>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new(NonZeroUsize::new(256).expect("non-zero")));
        let versions = Arc::new(VersionStore::new(backend.clone(), "test"));
        let store = Arc::new(VersionedCacheStore::new(backend, versions.clone()));
        let config = CacheConfig::default();
        let queries = Arc::new(QueryCacheManager::new(store, config.clone()));
        let trigger = Arc::new(InvalidationTrigger::new(config, versions.clone()));
        let repos = Arc::new(MemoryRepositories::new());
        Fixture {
            service: ContentService::new(repos.clone(), repos, queries, trigger),
            versions,
        }
    }

    #[tokio::test]
    async fn blog_embeds_referenced_skills_and_bumps_dependents() {
        let Fixture { service, versions } = fixture();
        let skill = service
            .create(Resource::Skills, json!({"name": "rust", "icon": "ferris"}))
            .await
            .expect("skill");
        let skill_id = skill["id"].as_i64().expect("id");

        let blog = service
            .create(
                Resource::Blogs,
                json!({
                    "title": "Versioned caching",
                    "content": "body",
                    "description": "notes",
                    "skill_ids": [skill_id, skill_id],
                }),
            )
            .await
            .expect("blog");

        assert_eq!(blog["skills"].as_array().map(Vec::len), Some(1));
        assert_eq!(blog["skills"][0]["name"], "rust");
        assert_eq!(blog["cover_img"], Value::Null);
        // skills: created once (2), then bumped again by the blog write (3)
        assert_eq!(versions.current_version(Resource::Skills).await, 3);
        assert_eq!(versions.current_version(Resource::Blogs).await, 2);
    }

    #[tokio::test]
    async fn unknown_reference_is_rejected_without_bumping() {
        let Fixture { service, versions } = fixture();
        let err = service
            .create(
                Resource::Blogs,
                json!({
                    "title": "t",
                    "content": "c",
                    "description": "d",
                    "skill_ids": [42],
                }),
            )
            .await
            .expect_err("missing skill");

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(versions.current_version(Resource::Blogs).await, 1);
    }

    #[tokio::test]
    async fn contacts_cannot_be_edited_here() {
        let Fixture { service, .. } = fixture();
        assert!(service.delete(Resource::Contacts, 1).await.is_err());
        assert!(
            service
                .create(Resource::Settings, json!({}))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn update_and_delete_missing_documents_are_not_found() {
        let Fixture { service, versions } = fixture();
        let err = service
            .update(Resource::Skills, 99, json!({"name": "go"}))
            .await
            .expect_err("missing");
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);

        let err = service
            .delete(Resource::Skills, 99)
            .await
            .expect_err("missing");
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(versions.current_version(Resource::Skills).await, 1);
    }

    async fn blog_with_skill(service: &ContentService, name: &str) -> (i64, i64) {
        let skill = service
            .create(Resource::Skills, json!({"name": name}))
            .await
            .expect("skill");
        let skill_id = skill["id"].as_i64().expect("skill id");
        let blog = service
            .create(
                Resource::Blogs,
                json!({
                    "title": "Caching",
                    "content": "body",
                    "description": "notes",
                    "skill_ids": [skill_id],
                }),
            )
            .await
            .expect("blog");
        (skill_id, blog["id"].as_i64().expect("blog id"))
    }

    fn skills_filter(name: &str) -> HashMap<String, String> {
        HashMap::from([("skills".to_string(), name.to_string())])
    }

    #[tokio::test]
    async fn renamed_skill_is_refreshed_in_blogs() {
        let Fixture { service, versions } = fixture();
        let (skill_id, blog_id) = blog_with_skill(&service, "rust").await;
        let stale = service
            .list(Resource::Blogs, &skills_filter("rust"))
            .await
            .expect("list");
        assert_eq!(stale.total_rows, 1);
        let blogs_before = versions.current_version(Resource::Blogs).await;

        service
            .update(Resource::Skills, skill_id, json!({"name": "rustlang"}))
            .await
            .expect("rename");

        let blog = service.get(Resource::Blogs, blog_id).await.expect("blog");
        assert_eq!(blog["skills"][0]["name"], "rustlang");
        assert_eq!(blog["skills"][0]["id"], skill_id);
        assert!(versions.current_version(Resource::Blogs).await > blogs_before);

        let renamed = service
            .list(Resource::Blogs, &skills_filter("rustlang"))
            .await
            .expect("list");
        assert_eq!(renamed.total_rows, 1);
        let old = service
            .list(Resource::Blogs, &skills_filter("rust"))
            .await
            .expect("list");
        assert_eq!(old.total_rows, 0);
    }

    #[tokio::test]
    async fn deleted_references_leave_their_holders() {
        let Fixture { service, versions } = fixture();
        let (skill_id, blog_id) = blog_with_skill(&service, "rust").await;
        let blogs_before = versions.current_version(Resource::Blogs).await;

        service
            .delete(Resource::Skills, skill_id)
            .await
            .expect("delete skill");

        let blog = service.get(Resource::Blogs, blog_id).await.expect("blog");
        assert_eq!(blog["skills"], json!([]));
        assert!(versions.current_version(Resource::Blogs).await > blogs_before);

        let file = service
            .create(
                Resource::Files,
                json!({
                    "public_id": "logos/acme",
                    "format": "png",
                    "resource_type": "image",
                    "uploaded_at": "2024-01-01T00:00:00Z",
                }),
            )
            .await
            .expect("file");
        let file_id = file["id"].as_i64().expect("file id");
        let experience = service
            .create(
                Resource::Experiences,
                json!({
                    "company_img_id": file_id,
                    "company_name": "Acme",
                    "job_title": "Engineer",
                    "description": "Built things",
                    "working_period": "2020 - 2022",
                }),
            )
            .await
            .expect("experience");
        assert_eq!(experience["company_img"]["public_id"], "logos/acme");

        service
            .delete(Resource::Files, file_id)
            .await
            .expect("delete file");
        let experience_id = experience["id"].as_i64().expect("experience id");
        let experience = service
            .get(Resource::Experiences, experience_id)
            .await
            .expect("experience");
        assert_eq!(experience["company_img"], Value::Null);
        assert_eq!(experience["company_name"], "Acme");
    }

    #[tokio::test]
    async fn list_reflects_writes_immediately() {
        let Fixture { service, .. } = fixture();
        let params = HashMap::new();

        let before = service.list(Resource::Links, &params).await.expect("list");
        assert_eq!(before.total_rows, 0);

        service
            .create(
                Resource::Links,
                json!({"name": "gh", "title": "GitHub", "url": "https://github.com"}),
            )
            .await
            .expect("link");

        let after = service.list(Resource::Links, &params).await.expect("list");
        assert_eq!(after.total_rows, 1);
        assert_eq!(after.items.len(), 1);
    }
}
