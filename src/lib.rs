//! Seats parties of players at capacity-bounded game sessions.
//!
//! Parties are placed by preference tier, golden-die holders first, with a
//! bump fallback that never moves anyone to a worse tier. Many seeded
//! trials run in parallel and the lowest-loss result is kept. A carried
//! compensation ledger records who came off badly.

pub mod allocation;
pub mod config;
pub mod display;
pub mod error;
pub mod mock;
pub mod parser;

pub use allocation::{
    check_allocation, Allocation, Allocator, CancelToken, CompensationDelta, CompensationLedger, Party, Session,
    Tier,
};
pub use config::AllocatorConfig;
pub use error::{AllocationError, TrialFailure};
