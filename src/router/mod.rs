//! Routing: the path grammar (spec §3) and branch namespace resolution
//! (spec §4.2), grounded on the teacher's `router` module (route patterns,
//! decisions) but narrowed to Cyre's simpler needs — full paths are
//! literal segment sequences, there is no wildcard/parameter matching to
//! compile, so [`path::Path`] is a validated string rather than a pattern
//! matcher.

pub mod branch;
pub mod path;
