//! Order-to-lead allocation engine.
//!
//! # Algorithm
//!
//! Single deterministic pass over the order's states in list order:
//!
//! 1. `remaining = total_remaining - assigned_so_far`
//! 2. `step_cap = min(cap(state), remaining)`; a state with `step_cap <= 0` is skipped
//! 3. bind up to `step_cap` free leads of that state, lowest lead id first
//! 4. move on to the next state whatever the shortfall
//!
//! Earlier states therefore get first claim on scarce remaining quantity.
//!
//! # Invariants
//!
//! - `sum(per_state.assigned) == total_assigned <= total_remaining`
//! - `per_state[s].assigned <= cap(s)`
//! - only free leads are ever bound
//!
//! The engine owns no storage and no transaction. It binds through the
//! [`LeadPool`] handle it is given; the caller decides the commit boundary so
//! that binds and ledger updates land (or roll back) together.

use std::collections::BTreeMap;
use std::future::Future;

use anyhow::{bail, Context, Result};
use ldk_schemas::{StateCode, StateList, StateProgress, Thresholds};
use serde::Serialize;
use tracing::debug;

pub type LeadId = i64;

// ---------------------------------------------------------------------------
// LeadPool seam
// ---------------------------------------------------------------------------

/// Access to the free-lead pool inside the caller's unit of work.
///
/// # Contract
/// `bind_free_leads` selects up to `limit` free leads of `state` in ascending
/// id order, binds each to `order_number`, and returns the ids it bound. It may
/// bind fewer than `limit` (including zero) but never more, and must never
/// return a lead that was already bound. Two concurrent callers must not be
/// able to bind the same lead.
pub trait LeadPool {
    fn bind_free_leads(
        &mut self,
        state: &StateCode,
        limit: i64,
        order_number: &str,
    ) -> impl Future<Output = Result<Vec<LeadId>>> + Send;
}

// ---------------------------------------------------------------------------
// Caps
// ---------------------------------------------------------------------------

/// Per-state cap table used for one allocation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateCaps {
    caps: BTreeMap<StateCode, i64>,
    default_cap: i64,
}

impl StateCaps {
    /// Caps for a fresh order: explicit thresholds, everything else `default_cap`.
    pub fn from_thresholds(thresholds: &Thresholds, states: &StateList, default_cap: i64) -> Self {
        let caps = states
            .iter()
            .map(|s| (s.clone(), thresholds.cap_for(s, default_cap)))
            .collect();
        Self { caps, default_cap }
    }

    /// Caps for a re-fulfillment pass: the thresholds stored at creation,
    /// applied afresh to this pass. Leads a state already supplied do not
    /// count against it; the order's remaining quantity bounds the pass. A
    /// state with no progress row gets 0.
    pub fn from_progress(progress: &[StateProgress]) -> Self {
        let caps = progress
            .iter()
            .map(|p| (p.state.clone(), p.threshold))
            .collect();
        Self {
            caps,
            default_cap: 0,
        }
    }

    pub fn cap_for(&self, state: &StateCode) -> i64 {
        self.caps.get(state).copied().unwrap_or(self.default_cap)
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AllocationRequest<'a> {
    /// Public order number the leads are bound to.
    pub order_number: &'a str,
    pub states: &'a StateList,
    pub caps: &'a StateCaps,
    /// Quantity still to be filled by this pass.
    pub total_remaining: i64,
}

/// Outcome for one state. `cap` is the step cap actually requested (0 = skipped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateAllocation {
    pub state: StateCode,
    pub cap: i64,
    pub assigned: i64,
    pub lead_ids: Vec<LeadId>,
}

/// Result of one allocation pass; `per_state` follows the order's state list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub total_assigned: i64,
    pub per_state: Vec<StateAllocation>,
}

impl Allocation {
    pub fn assigned_for(&self, state: &StateCode) -> i64 {
        self.per_state
            .iter()
            .find(|s| &s.state == state)
            .map(|s| s.assigned)
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Run one allocation pass against `pool`.
///
/// Shortfall is not an error: a state with no free leads contributes 0. Errors
/// come only from the pool (or from a pool that breaks its contract), and the
/// caller must then discard the whole unit of work.
pub async fn allocate<P>(pool: &mut P, req: &AllocationRequest<'_>) -> Result<Allocation>
where
    P: LeadPool + Send + ?Sized,
{
    if req.order_number.trim().is_empty() {
        bail!("allocate: order_number must not be empty");
    }

    let mut total_assigned: i64 = 0;
    let mut per_state: Vec<StateAllocation> = Vec::with_capacity(req.states.len());

    for state in req.states {
        let remaining_for_step = req.total_remaining - total_assigned;
        let step_cap = req.caps.cap_for(state).min(remaining_for_step);

        if step_cap <= 0 {
            per_state.push(StateAllocation {
                state: state.clone(),
                cap: 0,
                assigned: 0,
                lead_ids: Vec::new(),
            });
            continue;
        }

        let lead_ids = pool
            .bind_free_leads(state, step_cap, req.order_number)
            .await
            .with_context(|| format!("bind free leads failed: state={state}"))?;

        let assigned = lead_ids.len() as i64;
        if assigned > step_cap {
            bail!(
                "lead pool bound more than requested: state={} limit={} bound={}",
                state,
                step_cap,
                assigned
            );
        }

        debug!(
            order_number = req.order_number,
            state = %state,
            step_cap,
            assigned,
            "allocate/state"
        );

        total_assigned += assigned;
        per_state.push(StateAllocation {
            state: state.clone(),
            cap: step_cap,
            assigned,
            lead_ids,
        });
    }

    Ok(Allocation {
        total_assigned,
        per_state,
    })
}
