//! Domain services: independent specialists subscribed to the event bus,
//! each owning its own per-truck/per-driver state and never reaching into
//! another service's state directly.

pub mod alert;
pub mod anomaly;
pub mod driver_behavior;
pub mod maintenance;
pub mod prediction;
