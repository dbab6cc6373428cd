//! Where documents embed copies of other documents.
//!
//! Blogs, experiences and projects store snapshots of the skills, links and
//! files they reference. When a referenced document changes or disappears,
//! `refresh` brings each embedded copy in an owner document back in line.

use serde_json::Value;

use crate::domain::types::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A single embedded document, `null` when unset.
    One(&'static str),
    /// An array of embedded documents.
    Many(&'static str),
    /// An array of wrapper objects, each embedding the document under `key`.
    Nested {
        array: &'static str,
        key: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceField {
    pub owner: Resource,
    pub slot: Slot,
}

const SKILL_HOLDERS: &[ReferenceField] = &[
    ReferenceField {
        owner: Resource::Blogs,
        slot: Slot::Many("skills"),
    },
    ReferenceField {
        owner: Resource::Projects,
        slot: Slot::Many("skills"),
    },
];

const LINK_HOLDERS: &[ReferenceField] = &[
    ReferenceField {
        owner: Resource::Projects,
        slot: Slot::One("link_github"),
    },
    ReferenceField {
        owner: Resource::Projects,
        slot: Slot::One("link_website"),
    },
];

const FILE_HOLDERS: &[ReferenceField] = &[
    ReferenceField {
        owner: Resource::Blogs,
        slot: Slot::One("cover_img"),
    },
    ReferenceField {
        owner: Resource::Experiences,
        slot: Slot::One("company_img"),
    },
    ReferenceField {
        owner: Resource::Projects,
        slot: Slot::Nested {
            array: "images",
            key: "image",
        },
    },
];

/// Fields in other resources that embed documents of `target`.
pub fn holders(target: Resource) -> &'static [ReferenceField] {
    match target {
        Resource::Skills => SKILL_HOLDERS,
        Resource::Links => LINK_HOLDERS,
        Resource::Files => FILE_HOLDERS,
        _ => &[],
    }
}

/// Owner resources to scan after `target` changes, each listed once.
pub fn owners(target: Resource) -> Vec<Resource> {
    let mut owners: Vec<Resource> = Vec::new();
    for field in holders(target) {
        if !owners.contains(&field.owner) {
            owners.push(field.owner);
        }
    }
    owners
}

/// Rewrites copies of document `id` held in `slot` of `document`.
///
/// With a replacement the copy is swapped for it; without one the copy is
/// dropped from arrays and set to `null` elsewhere. Returns whether anything
/// changed.
pub fn refresh(document: &mut Value, slot: Slot, id: i64, replacement: Option<&Value>) -> bool {
    match slot {
        Slot::One(field) => {
            let Some(embedded) = document.get_mut(field) else {
                return false;
            };
            if !embeds(embedded, id) {
                return false;
            }
            *embedded = replacement.cloned().unwrap_or(Value::Null);
            true
        }
        Slot::Many(field) => {
            let Some(members) = document.get_mut(field).and_then(Value::as_array_mut) else {
                return false;
            };
            let before = members.len();
            let mut changed = false;
            match replacement {
                Some(replacement) => {
                    for member in members.iter_mut().filter(|member| embeds(member, id)) {
                        *member = replacement.clone();
                        changed = true;
                    }
                }
                None => members.retain(|member| !embeds(member, id)),
            }
            changed || members.len() != before
        }
        Slot::Nested { array, key } => {
            let Some(wrappers) = document.get_mut(array).and_then(Value::as_array_mut) else {
                return false;
            };
            let mut changed = false;
            for wrapper in wrappers.iter_mut() {
                if let Some(embedded) = wrapper.get_mut(key) {
                    if embeds(embedded, id) {
                        *embedded = replacement.cloned().unwrap_or(Value::Null);
                        changed = true;
                    }
                }
            }
            changed
        }
    }
}

fn embeds(embedded: &Value, id: i64) -> bool {
    embedded.get("id").and_then(Value::as_i64) == Some(id)
}
