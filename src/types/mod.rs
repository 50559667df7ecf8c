//! Request-shape normalization.
//!
//! Clients send the same request in several shapes (`doc_id` or `docId`, a raw
//! `strength` field or one buried in a JSON `options` string). Everything is
//! first gathered into a `serde_json::Map` and then turned into a typed request
//! by the pure functions in [`requests`].

pub mod loose;
pub mod requests;
