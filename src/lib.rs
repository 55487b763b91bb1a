//! refwatch: watch issues, pull requests and Q&A posts referenced from source
//!
//! Commands:
//! - check: reconcile references with source, then look for remote changes
//! - scan: reconcile references with source only
//! - init: write a configuration template

pub mod batch;
pub mod check;
pub mod config;
pub mod error;
pub mod github;
pub mod init;
pub mod reconcile;
pub mod reference;
pub mod registry;
pub mod run;
pub mod scan;
pub mod stackexchange;
pub mod status;
pub mod transport;

pub use batch::{Batcher, Coordinator, Handle, Processor};
pub use check::{check_all, Refresh, Remotes};
pub use error::{Error, Result};
pub use reconcile::{reconcile, Reconciliation};
pub use reference::{Kind, Reference};
pub use registry::Registry;
