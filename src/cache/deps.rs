//! Static dependency table between cached resources.
//!
//! A resource listed as a dependent embeds data from its primary: skill
//! listings aggregate the blogs and projects that reference each skill, so a
//! write to either must also retire cached skill responses.

use crate::domain::types::Resource;

/// Resources whose cached entries become stale when `resource` changes.
pub fn dependents(resource: Resource) -> &'static [Resource] {
    match resource {
        Resource::Blogs | Resource::Projects => &[Resource::Skills],
        Resource::Skills
        | Resource::Links
        | Resource::Experiences
        | Resource::Files
        | Resource::Contacts
        | Resource::Settings => &[],
    }
}

/// The primary resource followed by its dependents, in bump order.
pub fn affected(resource: Resource) -> Vec<Resource> {
    let mut affected = Vec::with_capacity(1 + dependents(resource).len());
    affected.push(resource);
    affected.extend(
        dependents(resource)
            .iter()
            .copied()
            .filter(|dependent| *dependent != resource),
    );
    affected
}
