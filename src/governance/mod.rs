//! The breathing/stress controller (C3), the system's self-protection
//! mechanism against overload (spec §4.8).

pub mod breathing;
