//! Core functionality for the quill blogging platform
//!
//! This crate holds everything that does not depend on a particular storage
//! backend:
//!
//! - the domain types ([`Account`], [`Post`], [`Category`])
//! - the audit policy ([`audit`]) and typed mutating statements ([`mutation`])
//!   that storage backends execute
//! - the login lockout state machine ([`lockout`])
//! - repository traits ([`repositories`]) and the services built on them
//!   ([`services`])
//! - validation, password and token crypto, and the upload store
//!
//! Storage backends implement the repository traits; see `quill-storage-sqlite`.
pub mod audit;
pub mod category;
pub mod crypto;
pub mod error;
pub mod id;
pub mod lockout;
pub mod login;
pub mod mutation;
pub mod post;
pub mod repositories;
pub mod services;
pub mod uploads;
pub mod user;
pub mod validation;

pub use audit::{AuditContext, Table};
pub use category::Category;
pub use error::Error;
pub use id::{AccountId, CategoryId, PostId};
pub use lockout::{LockoutConfig, LockoutState};
pub use mutation::{Mutation, Value};
pub use post::{Post, PostDraft, PostStatus};
pub use user::{Account, ClientInfo};
