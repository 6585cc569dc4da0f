//! Person directory.
//!
//! # Invariants
//! - One entry per distinct person under the profile's person key, in
//!   first-seen order.
//! - Department names are deduplicated; a person with no matched department
//!   shows [`UNKNOWN_DEPARTMENT`].

use crate::config::SchemaProfile;
use crate::model::views::PersonSummary;
use crate::repo::directory_repo::DirectoryRepository;
use crate::service::{join_distinct, non_blank, person_identity, ServiceError, ServiceResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Department label for persons whose departments are all unmatched.
pub const UNKNOWN_DEPARTMENT: &str = "unknown";

pub struct PersonService<D: DirectoryRepository> {
    repo: D,
    profile: Arc<SchemaProfile>,
}

struct PersonEntry {
    id: Option<String>,
    name: Option<String>,
    departments: Vec<String>,
}

impl<D: DirectoryRepository> PersonService<D> {
    pub fn new(repo: D, profile: Arc<SchemaProfile>) -> Self {
        Self { repo, profile }
    }

    pub fn list_persons(&self) -> ServiceResult<Vec<PersonSummary>> {
        let rows = self
            .repo
            .list_person_assignments()
            .map_err(|err| ServiceError::upstream("list_persons", err))?;

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut entries: Vec<PersonEntry> = Vec::new();
        for row in rows {
            let Some(identity) = person_identity(&row.person, self.profile.person_key) else {
                continue;
            };
            let position = *index.entry(identity).or_insert_with(|| {
                entries.push(PersonEntry {
                    id: None,
                    name: None,
                    departments: Vec::new(),
                });
                entries.len() - 1
            });

            let entry = &mut entries[position];
            if entry.id.is_none() {
                entry.id = non_blank(row.person.person_id.as_deref()).map(str::to_string);
            }
            if entry.name.is_none() {
                entry.name = non_blank(row.person.person_name.as_deref()).map(str::to_string);
            }
            if let Some(name) = non_blank(row.department_name.as_deref()) {
                entry.departments.push(name.to_string());
            }
        }

        Ok(entries
            .into_iter()
            .map(|entry| {
                let department = join_distinct(entry.departments.iter().map(|d| Some(d.as_str())));
                PersonSummary {
                    id: entry.id.unwrap_or_default(),
                    name: entry.name.unwrap_or_default(),
                    department: if department.is_empty() {
                        UNKNOWN_DEPARTMENT.to_string()
                    } else {
                        department
                    },
                }
            })
            .collect())
    }
}
