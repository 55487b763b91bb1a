//! Staleness checker
//!
//! Starts a refresh on every reference, flushes the coordinator once, then
//! awaits every pending check and ORs the results together.

use crate::batch::{Batcher, Coordinator};
use crate::error::Result;
use crate::github::GithubProcessor;
use crate::reference::Reference;
use crate::stackexchange::StackExchangeProcessor;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{error, info};

/// Outcome of starting a reference's check.
pub enum Refresh<'a> {
    /// Check already complete.
    Immediate(bool),
    /// Check completes once its result handles resolve.
    Pending(BoxFuture<'a, Result<bool>>),
}

/// Batchers of the enabled remote services. A disabled service makes its
/// references report "unchanged" without a remote call.
#[derive(Clone, Default)]
pub struct Remotes {
    pub github: Option<Batcher<GithubProcessor>>,
    pub stackexchange: Option<Batcher<StackExchangeProcessor>>,
}

/// Check every reference, returning whether any of them changed.
///
/// Every reference is refreshed (no short-circuit) and every pending check
/// is awaited, even after a failure. The first failure is returned.
pub async fn check_all(
    references: &mut [Reference],
    remotes: &Remotes,
    coordinator: &Coordinator,
) -> Result<bool> {
    let mut changed = false;
    let mut pending = Vec::new();

    for reference in references.iter_mut() {
        let url = reference.canonical_url();
        match reference.refresh(remotes) {
            Refresh::Immediate(result) => {
                if result {
                    info!(%url, "changed");
                }
                changed |= result;
            }
            Refresh::Pending(check) => pending.push(check.map(move |result| (url, result))),
        }
    }

    let dispatched = coordinator.flush();
    info!(pending = pending.len(), queries = dispatched, "checking references");

    let mut failure = None;
    for (url, result) in join_all(pending).await {
        match result {
            Ok(result) => {
                if result {
                    info!(%url, "changed");
                }
                changed |= result;
            }
            Err(e) => {
                error!(%url, error = %e, "check failed");
                failure.get_or_insert(e);
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(changed),
    }
}
