//! Kernel: the small set of types every other module depends on.
//!
//! # Structure (Why)
//! - [`payload`] carries the untyped payload value and the handler-result
//!   tagged variant that lets a subscriber trigger a chain reaction.
//!
//! Kept deliberately small: the kernel must never depend on `pipeline`,
//! `registry`, or `runtime`, so that those modules can depend on it freely.

pub mod payload;
