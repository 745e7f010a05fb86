//! Application-facing data types.
//!
//! - [`SimpleFrame`] and [`SimplePoint`] are the flat point-cloud form
//!   produced by [`decode_to_flat`](crate::adapters::decode_to_flat).
//! - [`reference_frames`] holds subscription templates selecting which fields
//!   the device populates.
//! - [`EventKind`] names the categories of pushed device data.

mod frame;
pub mod reference_frames;

pub use crate::connection::EventKind;
pub use frame::{SimpleFrame, SimplePoint};
