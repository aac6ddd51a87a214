//! Typed row identifiers
//!
//! Every table uses an SQLite `INTEGER PRIMARY KEY AUTOINCREMENT`, so identifiers
//! are plain `i64` values wrapped in newtypes to keep an account id from being
//! passed where a post id is expected.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a row in the `users` table
    AccountId
);
define_id!(
    /// Identifier of a row in the `posts` table
    PostId
);
define_id!(
    /// Identifier of a row in the `categories` table
    CategoryId
);
