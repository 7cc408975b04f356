//! Core document store for the team dashboard: the persisted collection of
//! users, resources and polls, the rules that keep their cross-references
//! consistent under mutation, and the spreadsheet import merge.

pub mod error;
pub mod ids;
pub mod import;
pub mod storage;

pub use error::{Error, Result};
