//! Verify-then-store pipeline turning inbound `Deliver` frames into stored
//! chunks, `Ack`s, and — once an object is complete — a sealed object
//! (spec.md §4.1, §4.6).

pub mod error;
pub mod reassembler;
pub mod types;

pub use error::{ReassemblerError, Result as ReassemblerResult};
pub use reassembler::Reassembler;
pub use types::{DeliveryOutcome, DEMOTION_THRESHOLD};
