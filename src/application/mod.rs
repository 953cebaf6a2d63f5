//! Application layer: the payment allocation engine.
//!
//! [`executor::AllocationExecutor`] is the entry point. Each call runs one
//! transaction that checks for a prior result ([`idempotency`]), locks the
//! eligible charges ([`repository`]), computes a plan ([`planner`]) and
//! persists it.

pub mod executor;
pub mod idempotency;
pub mod planner;
pub mod repository;
