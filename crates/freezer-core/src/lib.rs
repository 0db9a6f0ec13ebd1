//! Record model for the remote ancient-record freezer.
//!
//! The freezer stores immutable, sequentially numbered records. This crate
//! holds the pieces that do not touch storage: the record itself, the closed
//! set of field kinds readers can select, and boundary errors.

pub mod error;
pub mod kind;
pub mod record;

pub use error::{Error, Result};
pub use kind::FieldKind;
pub use record::{decode_hex, encode_hex, AncientRecord};
