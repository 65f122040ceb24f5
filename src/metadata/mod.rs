//! Client and server metadata.
//!
//! The *client file* ships next to the updater and describes the installed product. The *server
//! file* is fetched at check time and describes the newest release. Only the semantic fields below
//! are used; the three client file variants differ in encoding, not in meaning.

mod client;
mod server;

pub use client::{ClientFileFormat, ClientMetadata, PresentationHints};
pub use server::{OperationKind, SelfServerMetadata, ServerMetadata, UpdatePackage};
