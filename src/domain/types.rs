//! Shared domain enumerations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Logical entity types exposed by the portfolio backend.
///
/// The lowercase name doubles as the cache version namespace and as the
/// `resource` column value in persistent storage, so it must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Blogs,
    Skills,
    Links,
    Experiences,
    Projects,
    Files,
    Contacts,
    Settings,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Blogs,
        Resource::Skills,
        Resource::Links,
        Resource::Experiences,
        Resource::Projects,
        Resource::Files,
        Resource::Contacts,
        Resource::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Blogs => "blogs",
            Resource::Skills => "skills",
            Resource::Links => "links",
            Resource::Experiences => "experiences",
            Resource::Projects => "projects",
            Resource::Files => "files",
            Resource::Contacts => "contacts",
            Resource::Settings => "settings",
        }
    }

    /// Resources whose documents can be written through the admin surface.
    pub fn is_editable(self) -> bool {
        !matches!(self, Resource::Contacts | Resource::Settings)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|resource| resource.as_str() == value)
            .ok_or_else(|| DomainError::validation(format!("unknown resource `{value}`")))
    }
}

/// Lifecycle state of a contact message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactStatus {
    New,
    Read,
    Replied,
    Closed,
}

/// Classification attached to uploaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    Blog,
    Experience,
    Project,
    System,
    #[default]
    Other,
}

/// Media class reported by the external image host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileResourceType {
    Image,
    Video,
    Raw,
}
