//! Storage for channel records (C4) and subscribers (C5), grounded on the
//! teacher's preference for per-key concurrent maps (`dashmap`) over a
//! single global lock, so independent channels progress in parallel
//! (spec §5 "prefer per-key locking for the registry").

pub mod channel;
pub mod subscriber;
