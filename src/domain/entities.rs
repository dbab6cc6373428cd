//! Write models accepted by the content services.
//!
//! Reads never go through these types: stored documents are returned to
//! callers as plain JSON mappings, the same shape the response cache keeps.

use serde::Deserialize;
use time::{Date, OffsetDateTime, format_description::FormatItem, macros::format_description};
use url::Url;

use crate::domain::{
    error::DomainError,
    types::{FileResourceType, FileType},
};

const SHORT_TEXT_MAX: usize = 255;
const SUBJECT_MAX: usize = 500;
const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, Deserialize)]
pub struct SkillInput {
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

impl SkillInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("name", &self.name, SHORT_TEXT_MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkInput {
    pub name: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub icon: String,
}

impl LinkInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("name", &self.name, SHORT_TEXT_MAX)?;
        require_text("title", &self.title, SHORT_TEXT_MAX)?;
        if !self.icon.is_empty() {
            require_text("icon", &self.icon, SHORT_TEXT_MAX)?;
        }
        let valid_url = Url::parse(self.url.trim()).is_ok_and(|url| {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        });
        if !valid_url {
            return Err(DomainError::validation(
                "field `url` must be an absolute http(s) URL",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileInput {
    pub public_id: String,
    #[serde(default)]
    pub version: Option<String>,
    pub format: String,
    pub resource_type: FileResourceType,
    #[serde(default)]
    pub file_type: FileType,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl FileInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("public_id", &self.public_id, SHORT_TEXT_MAX)?;
        require_text("format", &self.format, 50)?;
        if let Some(version) = self.version.as_deref() {
            if version.chars().count() > 20 {
                return Err(DomainError::validation(
                    "field `version` must be at most 20 characters",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlogInput {
    pub title: String,
    pub content: String,
    pub description: String,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub cover_img_id: Option<i64>,
    #[serde(default)]
    pub skill_ids: Vec<i64>,
}

impl BlogInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("title", &self.title, SHORT_TEXT_MAX)?;
        require_text("description", &self.description, SHORT_TEXT_MAX)?;
        if self.content.trim().is_empty() {
            return Err(DomainError::validation("field `content` must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExperienceInput {
    #[serde(default)]
    pub company_img_id: Option<i64>,
    pub company_name: String,
    pub job_title: String,
    pub description: String,
    pub working_period: String,
    #[serde(default)]
    pub join_date: Option<String>,
    #[serde(default)]
    pub leave_date: Option<String>,
}

impl ExperienceInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("company_name", &self.company_name, SHORT_TEXT_MAX)?;
        require_text("job_title", &self.job_title, SHORT_TEXT_MAX)?;
        require_text("working_period", &self.working_period, SHORT_TEXT_MAX)?;
        let join = parse_date("join_date", self.join_date.as_deref())?;
        let leave = parse_date("leave_date", self.leave_date.as_deref())?;
        if let (Some(join), Some(leave)) = (join, leave) {
            if leave < join {
                return Err(DomainError::validation(
                    "field `leave_date` must not precede `join_date`",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInput {
    pub name: String,
    pub descriptions: String,
    pub link_github_id: i64,
    pub link_website_id: i64,
    #[serde(default)]
    pub skill_ids: Vec<i64>,
    #[serde(default)]
    pub image_ids: Vec<i64>,
}

impl ProjectInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("name", &self.name, SHORT_TEXT_MAX)?;
        require_text("descriptions", &self.descriptions, SHORT_TEXT_MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactInput {
    pub full_name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("full_name", &self.full_name, SHORT_TEXT_MAX)?;
        require_text("subject", &self.subject, SUBJECT_MAX)?;
        if self.message.trim().is_empty() {
            return Err(DomainError::validation("field `message` must not be empty"));
        }
        let email = self.email.trim();
        let valid_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(DomainError::validation("field `email` is not a valid address"));
        }
        Ok(())
    }
}

fn require_text(field: &str, value: &str, max: usize) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!(
            "field `{field}` must not be empty"
        )));
    }
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "field `{field}` must be at most {max} characters"
        )));
    }
    Ok(())
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<Date>, DomainError> {
    value
        .map(|raw| {
            Date::parse(raw, DATE_FORMAT).map_err(|_| {
                DomainError::validation(format!("field `{field}` must be formatted as YYYY-MM-DD"))
            })
        })
        .transpose()
}
