//! Ferry Transport
//!
//! A stateless client for the remote data-management service. The service
//! exposes items (containers) holding files; this crate covers the calls a
//! binding needs to fetch a file, resolve its siblings, and upload a new file
//! as a single chunk.
//!
//! | Operation         | Request                    |
//! |-------------------|----------------------------|
//! | list item files   | `GET /item/{id}/files`     |
//! | file metadata     | `GET /file/{id}`           |
//! | item metadata     | `GET /item/{id}`           |
//! | download          | `GET /file/{id}/download`  |
//! | initiate upload   | `POST /file` (form)        |
//! | upload chunk      | `POST /file/chunk` (multipart) |
//!
//! When a token is supplied it is sent on every call as the `Girder-Token`
//! header. Calls are never retried.

mod client;
mod endpoint;
mod error;
mod types;

pub use client::{ByteStream, RemoteClient, TOKEN_HEADER};
pub use endpoint::{ApiEndpoint, DEFAULT_API_ROOT, DEFAULT_PORT, DEFAULT_SCHEME};
pub use error::TransportError;
pub use types::{RemoteFileRef, RemoteItem};
