//! Session module
//!
//! Rehydrates engine-visible transfer state from durable descriptors and
//! projects observable status while the session runs.

pub mod rehydrate;

pub use rehydrate::{
    ProgressOverrides, RehydrationReport, SessionRehydrator, TransferSnapshot,
};
