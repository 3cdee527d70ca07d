//! SubcarrierAllocator: N-carrier table with pilot protection and
//! hysteresis-driven modulation adaptation (spec.md §4.4).

pub mod allocator;
pub mod error;
pub mod types;

pub use allocator::SubcarrierAllocator;
pub use error::{Result as SubcarrierResult, SubcarrierError};
pub use types::{Modulation, Subcarrier, SubcarrierKind};
