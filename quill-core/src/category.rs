use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::CategoryId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

/// Derive a URL slug from a category name.
///
/// ASCII letters and digits are kept (lowercased), every other run of
/// characters becomes a single `-`. Names with no ASCII alphanumerics at all
/// (e.g. Japanese) keep their alphanumeric characters as is.
pub fn slugify(name: &str) -> String {
    let has_ascii = name.chars().any(|c| c.is_ascii_alphanumeric());

    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars() {
        let keep = if has_ascii {
            c.is_ascii_alphanumeric()
        } else {
            c.is_alphanumeric()
        };

        if keep {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
