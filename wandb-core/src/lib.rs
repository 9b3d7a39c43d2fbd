//! W&B Core
//!
//! Provider-agnostic resource model shared by the W&B provider and its CLI:
//! resource identities and attribute values, the `Provider` lifecycle trait,
//! diagnostics, and attribute schemas.

pub mod diagnostic;
pub mod provider;
pub mod resource;
pub mod schema;
