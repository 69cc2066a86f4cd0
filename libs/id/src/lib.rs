//! # armada-id
//!
//! Identifier types, parsing, and validation for the armada scheduler.
//!
//! ## Design Principles
//!
//! - App ids are user-chosen labels; everything else is system- or
//!   master-assigned
//! - All ids have a canonical string representation with strict parsing
//! - Ids support roundtrip serialization (parse → format → parse)
//! - Ids are typed to prevent mixing different resource kinds
//!
//! ## Task Id Format
//!
//! Task ids embed their owning app id: `{app_id}.{ulid}`
//!
//! Examples:
//! - `web.01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `payments-worker.01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! The embedded app id lets the status path recover the owner of a task
//! without any lookup, and the ULID suffix gives the tasks of one app a
//! stable creation-time order.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
