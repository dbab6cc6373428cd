//! Postgres-backed repository implementations.
//!
//! Every resource lives in `content_documents` as a JSONB document. List
//! filters are compiled from the declarations in `application::filters`.

mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query, query_scalar,
    types::Json,
};

use crate::application::filters::{self, FilterKind};
use crate::application::repos::{
    ContentRepo, ContentWriteRepo, ListQuery, PageWindow, RepoError, with_id,
};
use crate::domain::types::Resource;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    fn apply_filters(qb: &mut QueryBuilder<'_, Postgres>, resource: Resource, list: &ListQuery) {
        for (name, value) in &list.filters {
            let Some(param) = filters::filter_param(resource, name) else {
                continue;
            };
            match param.kind {
                FilterKind::Contains(fields) => {
                    let pattern = like_pattern(value);
                    qb.push(" AND (");
                    for (index, field) in fields.iter().enumerate() {
                        if index > 0 {
                            qb.push(" OR ");
                        }
                        qb.push("document ->> ");
                        qb.push_bind(*field);
                        qb.push(" ILIKE ");
                        qb.push_bind(pattern.clone());
                        qb.push(r" ESCAPE '\'");
                    }
                    qb.push(")");
                }
                FilterKind::AllNames { array, key } => {
                    for name in filters::split_list(value) {
                        qb.push(" AND document -> ");
                        qb.push_bind(array);
                        qb.push(" @> ");
                        qb.push_bind(containment(key, Value::from(name)));
                    }
                }
                FilterKind::AllIds { array, key } => match filters::parse_ids(value) {
                    Some(ids) => {
                        for id in ids {
                            qb.push(" AND document -> ");
                            qb.push_bind(array);
                            qb.push(" @> ");
                            qb.push_bind(containment(key, Value::from(id)));
                        }
                    }
                    None => {
                        qb.push(" AND FALSE");
                    }
                },
            }
        }
    }

    fn apply_ordering(qb: &mut QueryBuilder<'_, Postgres>, resource: Resource, list: &ListQuery) {
        let orderable = filters::orderable_fields(resource);
        qb.push(" ORDER BY ");
        for order in &list.ordering {
            if !orderable.contains(&order.field.as_str()) {
                continue;
            }
            if order.field == "id" {
                qb.push("id");
            } else {
                qb.push("document ->> ");
                qb.push_bind(order.field.clone());
            }
            qb.push(if order.descending { " DESC, " } else { " ASC, " });
        }
        qb.push("id ASC");
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }

    fn convert_window(value: u64) -> Result<i64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::invalid_input("page window exceeds supported range"))
    }
}

/// Substring pattern for `ILIKE ... ESCAPE '\'`; wildcards in the keyword
/// match literally.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// `[{"<key>": value}]`, the JSONB containment pattern for one array member.
fn containment(key: &str, value: Value) -> Json<Value> {
    let mut member = Map::new();
    member.insert(key.to_string(), value);
    Json(Value::Array(vec![Value::Object(member)]))
}

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn count(&self, resource: Resource, list: &ListQuery) -> Result<u64, RepoError> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM content_documents WHERE resource = ");
        qb.push_bind(resource.as_str());
        Self::apply_filters(&mut qb, resource, list);

        let total: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Self::convert_count(total)
    }

    async fn fetch(
        &self,
        resource: Resource,
        list: &ListQuery,
        window: Option<PageWindow>,
    ) -> Result<Vec<Value>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, document FROM content_documents WHERE resource = ",
        );
        qb.push_bind(resource.as_str());
        Self::apply_filters(&mut qb, resource, list);
        Self::apply_ordering(&mut qb, resource, list);

        if let Some(window) = window {
            qb.push(" LIMIT ");
            qb.push_bind(Self::convert_window(window.limit)?);
            qb.push(" OFFSET ");
            qb.push_bind(Self::convert_window(window.offset)?);
        }

        let rows: Vec<(i64, Json<Value>)> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|(id, Json(document))| with_id(id, document))
            .collect())
    }

    async fn find(&self, resource: Resource, id: i64) -> Result<Option<Value>, RepoError> {
        let row: Option<Json<Value>> = query_scalar(
            "SELECT document FROM content_documents WHERE resource = $1 AND id = $2",
        )
        .bind(resource.as_str())
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(|Json(document)| with_id(id, document)))
    }
}

#[async_trait]
impl ContentWriteRepo for PostgresRepositories {
    async fn insert(&self, resource: Resource, document: Value) -> Result<Value, RepoError> {
        let id: i64 = query_scalar(
            "INSERT INTO content_documents (resource, document) VALUES ($1, $2) RETURNING id",
        )
        .bind(resource.as_str())
        .bind(Json(&document))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(with_id(id, document))
    }

    async fn update(
        &self,
        resource: Resource,
        id: i64,
        document: Value,
    ) -> Result<Value, RepoError> {
        let result = query(
            "UPDATE content_documents SET document = $1, updated_at = now() \
             WHERE resource = $2 AND id = $3",
        )
        .bind(Json(&document))
        .bind(resource.as_str())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(with_id(id, document))
    }

    async fn delete(&self, resource: Resource, id: i64) -> Result<(), RepoError> {
        let result = query("DELETE FROM content_documents WHERE resource = $1 AND id = $2")
            .bind(resource.as_str())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::OrderField;
    use std::collections::BTreeMap;

    fn list(filters: &[(&str, &str)], ordering: Vec<OrderField>) -> ListQuery {
        ListQuery {
            filters: filters
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ordering,
        }
    }

    #[test]
    fn keyword_filter_compiles_to_ilike_over_each_field() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE resource = ");
        qb.push_bind("blogs");
        PostgresRepositories::apply_filters(
            &mut qb,
            Resource::Blogs,
            &list(&[("kw", "rust"), ("unknown", "x")], vec![]),
        );
        assert_eq!(
            qb.sql(),
            r"SELECT 1 WHERE resource = $1 AND (document ->> $2 ILIKE $3 ESCAPE '\' OR document ->> $4 ILIKE $5 ESCAPE '\' OR document ->> $6 ILIKE $7 ESCAPE '\')"
        );
    }

    #[test]
    fn keyword_wildcards_are_escaped() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern(r"50%_a\b"), r"%50\%\_a\\b%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn id_filter_with_garbage_matches_nothing() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        PostgresRepositories::apply_filters(
            &mut qb,
            Resource::Blogs,
            &list(&[("skill_ids", "3,x")], vec![]),
        );
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE AND FALSE");
    }

    #[test]
    fn skill_names_compile_to_containment_per_name() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        PostgresRepositories::apply_filters(
            &mut qb,
            Resource::Blogs,
            &list(&[("skills", "rust,redis")], vec![]),
        );
        assert_eq!(
            qb.sql(),
            "SELECT 1 WHERE TRUE AND document -> $1 @> $2 AND document -> $3 @> $4"
        );
    }

    #[test]
    fn ordering_skips_unknown_fields_and_ends_with_id() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        PostgresRepositories::apply_ordering(
            &mut qb,
            Resource::Skills,
            &list(
                &[],
                vec![
                    OrderField {
                        field: "name".to_string(),
                        descending: true,
                    },
                    OrderField::ascending("password"),
                ],
            ),
        );
        assert_eq!(qb.sql(), "SELECT 1 ORDER BY document ->> $1 DESC, id ASC");
    }
}
