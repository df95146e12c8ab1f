//! # Types
//!
//! Plain data shared by every stage of fault handling: addresses, the
//! register snapshot, the fault classification and resolved frames.
//!
//! Everything here is `Copy` or owns only heap data built after the
//! fault has been handed off to the reporter thread.

pub mod address;
pub mod fault;
pub mod frame;
pub mod registers;

// Re-export all public types
pub use address::Address;
pub use fault::{FaultCategory, FaultContext};
pub use frame::ResolvedFrame;
pub use registers::{Architecture, Registers};
