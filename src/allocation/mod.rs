pub mod types;
pub mod tiers;
pub mod table_utils;
pub mod engine;
pub mod displacement;
pub mod repair;
pub mod validate;
pub mod score;
pub mod optimizer;
pub mod compensation;

pub use types::{Allocation, Assignment, Displacement, Gamemaster, GamemasterSeat, Loss, Party, Session, Tier};
pub use tiers::{tier_party, TierList};
pub use engine::{run_trial, AllocationInput};
pub use validate::{check_allocation, validate_input, Violation};
pub use score::evaluate;
pub use optimizer::{Allocator, CancelToken};
pub use compensation::{compute_delta, CompensationDelta, CompensationLedger};
