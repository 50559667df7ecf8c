pub mod auth;
pub mod body;

pub use auth::RequireUser;
pub use body::{LooseBody, UploadedFile};
