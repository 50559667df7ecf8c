pub mod ai;
pub mod auth;
pub mod chat;
pub mod documents;
pub mod drive;
pub mod health;
pub mod pages;
