pub mod auth;
pub mod bookmarks;
