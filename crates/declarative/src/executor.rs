//! Execution engine - reconciles resources, optionally in parallel

use crate::context::{AutoConfirm, ConfirmCallback, Declined, NoProgress, ProgressCallback};
use crate::resource::Resource;
use crate::types::{ExecuteOptions, Outcome};
use anyhow::Result;
use log::debug;
use rayon::prelude::*;

/// Reconcile a single resource
///
/// Looks the resource up; reuses it when it matches, updates it with the
/// patch from [`Resource::diff`] when it doesn't, creates it when nothing
/// matches. Creation of resources that [require confirmation] is put to
/// `confirm` first and fails with [`Declined`] when refused.
///
/// [require confirmation]: Resource::requires_confirmation
pub fn reconcile<R, P, C>(
    resource: &R,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Outcome<R::Live>>
where
    R: Resource,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let id = resource.id();
    progress.on_resource_start(&id, &resource.description());
    let outcome = reconcile_one(resource, confirm)?;
    progress.on_resource_complete(&id, outcome.action());
    Ok(outcome)
}

/// Reconcile a batch of resources
///
/// Outcomes are returned in input order. The first error aborts the batch;
/// resources already reconciled stay as they are.
///
/// Resources are reconciled in parallel on a pool of `opts.jobs` threads
/// when every resource allows it and none needs confirmation. Progress for
/// a parallel batch is reported after the batch finishes.
pub fn reconcile_all<R, P, C>(
    resources: &[R],
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Vec<Outcome<R::Live>>>
where
    R: Resource,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    if resources.is_empty() {
        return Ok(Vec::new());
    }

    progress.on_batch_start(resources.len());

    let parallel = opts.jobs > 1
        && resources.len() > 1
        && resources
            .iter()
            .all(|r| r.can_parallelize() && !r.requires_confirmation());

    let outcomes = if parallel {
        reconcile_parallel(resources, opts.jobs, progress)?
    } else {
        let mut outcomes = Vec::with_capacity(resources.len());
        for resource in resources {
            outcomes.push(reconcile(resource, progress, confirm)?);
        }
        outcomes
    };

    progress.on_batch_complete();
    Ok(outcomes)
}

/// Reconcile resources in parallel using rayon
fn reconcile_parallel<R, P>(
    resources: &[R],
    jobs: usize,
    progress: &mut P,
) -> Result<Vec<Outcome<R::Live>>>
where
    R: Resource,
    P: ProgressCallback,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {e}"))?;

    // The progress callback is not thread-safe; report once the batch is done.
    let outcomes: Vec<Outcome<R::Live>> = pool.install(|| {
        resources
            .par_iter()
            .map(|resource| reconcile_one(resource, &mut AutoConfirm))
            .collect::<Result<Vec<_>>>()
    })?;

    for (resource, outcome) in resources.iter().zip(&outcomes) {
        progress.on_resource_complete(&resource.id(), outcome.action());
    }

    Ok(outcomes)
}

fn reconcile_one<R, C>(resource: &R, confirm: &mut C) -> Result<Outcome<R::Live>>
where
    R: Resource,
    C: ConfirmCallback,
{
    match resource.lookup()? {
        Some(live) => match resource.diff(&live) {
            None => {
                debug!("{} {} matches, reusing", resource.resource_type(), resource.id());
                Ok(Outcome::Reused(live))
            }
            Some(patch) => {
                let fields = resource.patch_fields(&patch);
                debug!(
                    "{} {} differs in [{}], updating",
                    resource.resource_type(),
                    resource.id(),
                    fields.join(", ")
                );
                let updated = resource.update(&live, patch)?;
                Ok(Outcome::Updated {
                    live: updated,
                    fields,
                })
            }
        },
        None => {
            if resource.requires_confirmation()
                && !confirm.confirm(&format!("Create {}?", resource.description()))?
            {
                return Err(Declined {
                    resource_type: resource.resource_type().to_string(),
                    resource_id: resource.id(),
                }
                .into());
            }
            debug!("{} {} not found, creating", resource.resource_type(), resource.id());
            Ok(Outcome::Created(resource.create()?))
        }
    }
}

/// Reconcile without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn reconcile_simple<R: Resource>(resource: &R) -> Result<Outcome<R::Live>> {
    reconcile(resource, &mut NoProgress, &mut AutoConfirm)
}
