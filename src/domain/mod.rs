//! Domain model of the allocation engine: charges, payments, allocations,
//! and the storage ports the application layer depends on.

pub mod charge;
pub mod ids;
pub mod money;
pub mod payment;
pub mod ports;
pub mod waterfall;
