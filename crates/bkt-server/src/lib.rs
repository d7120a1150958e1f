//! HTTP resource tree over the bkt engine.
//!
//! URL paths address nested buckets and the values inside them. `GET` on a
//! bucket lists it, `GET` on a value returns it (whole or by byte range),
//! `PUT` creates buckets and writes values, `DELETE` removes values. Every
//! value has a metadata record (content type, length, entity tag, last
//! modification) written and removed in the same transaction as the value,
//! and conditional headers are checked against that record.

pub mod conditional;
pub mod config;
pub mod consistency;
pub mod csrf;
pub mod error;
pub mod etag;
pub mod handler;
pub mod listing;
pub mod metadata;
pub mod navigator;
pub mod negotiate;
pub mod path;
pub mod range;
pub mod router;
pub mod server;

pub use config::{CsrfConfig, ServerConfig};
pub use consistency::{verify_consistency, verify_db, Inconsistency};
pub use csrf::CsrfGuard;
pub use error::{ServerError, ServerResult};
pub use metadata::MetadataRecord;
pub use router::{build_router, AppState};
pub use server::BktServer;
