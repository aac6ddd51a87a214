//! Service layer for business logic
//!
//! Services hold configuration only. Each operation borrows a request-scoped
//! repository handle (`&mut R`) and an [`AuditContext`](crate::audit::AuditContext)
//! naming who is acting, so one service value can be shared by every request.

pub mod account;
pub mod category;
pub mod login;
pub mod password_reset;
pub mod post;

#[cfg(test)]
pub(crate) mod testing;

pub use account::{AccountService, ProfilePage, ProfileSaved};
pub use category::CategoryService;
pub use login::{LoginOutcome, LoginService};
pub use password_reset::{PasswordResetService, ResetRequest, reset_link};
pub use post::{Dashboard, OwnedPost, PostSaved, PostService};
