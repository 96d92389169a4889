//! In-memory lead pool for engine tests.
//!
//! Same contract as `ldk_db::PgLeadPool`: lowest id first, free leads only,
//! never more than `limit`. No I/O.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use ldk_allocation::{LeadId, LeadPool};
use ldk_schemas::StateCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemLead {
    pub id: LeadId,
    pub state: String,
    pub order_number: Option<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryLeadPool {
    next_id: LeadId,
    leads: Vec<MemLead>,
}

impl InMemoryLeadPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `n` free leads of `state`; returns their ids (ascending).
    pub fn add_free(&mut self, state: &str, n: usize) -> Vec<LeadId> {
        let mut ids = Vec::with_capacity(n);
        for _ in 0..n {
            self.next_id += 1;
            self.leads.push(MemLead {
                id: self.next_id,
                state: state.to_uppercase(),
                order_number: None,
            });
            ids.push(self.next_id);
        }
        ids
    }

    /// Append one lead already bound to `order_number`.
    pub fn add_bound(&mut self, state: &str, order_number: &str) -> LeadId {
        self.next_id += 1;
        self.leads.push(MemLead {
            id: self.next_id,
            state: state.to_uppercase(),
            order_number: Some(order_number.to_string()),
        });
        self.next_id
    }

    pub fn free_count(&self, state: &str) -> usize {
        let state = state.to_uppercase();
        self.leads
            .iter()
            .filter(|l| l.state == state && l.order_number.is_none())
            .count()
    }

    /// Ids bound to `order_number`, ascending.
    pub fn bound_to(&self, order_number: &str) -> Vec<LeadId> {
        self.leads
            .iter()
            .filter(|l| l.order_number.as_deref() == Some(order_number))
            .map(|l| l.id)
            .collect()
    }

    pub fn lead(&self, id: LeadId) -> Option<&MemLead> {
        self.leads.iter().find(|l| l.id == id)
    }

    pub fn leads(&self) -> &[MemLead] {
        &self.leads
    }

    fn bind(&mut self, state: &StateCode, limit: i64, order_number: &str) -> Vec<LeadId> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let mut bound = Vec::new();
        // `leads` is kept in id order, so a forward scan is lowest-id-first.
        for lead in self.leads.iter_mut() {
            if bound.len() >= limit {
                break;
            }
            if lead.state == state.as_str() && lead.order_number.is_none() {
                lead.order_number = Some(order_number.to_string());
                bound.push(lead.id);
            }
        }
        bound
    }
}

impl LeadPool for InMemoryLeadPool {
    async fn bind_free_leads(
        &mut self,
        state: &StateCode,
        limit: i64,
        order_number: &str,
    ) -> Result<Vec<LeadId>> {
        Ok(self.bind(state, limit, order_number))
    }
}

/// Cloneable handle over one pool, for exercising several allocation passes
/// that interleave against the same leads.
#[derive(Debug, Clone, Default)]
pub struct SharedLeadPool(Arc<Mutex<InMemoryLeadPool>>);

impl SharedLeadPool {
    pub fn new(pool: InMemoryLeadPool) -> Self {
        Self(Arc::new(Mutex::new(pool)))
    }

    /// Run `f` against the inner pool.
    pub fn with<R>(&self, f: impl FnOnce(&InMemoryLeadPool) -> R) -> Result<R> {
        let guard = self.0.lock().map_err(|_| anyhow!("lead pool mutex poisoned"))?;
        Ok(f(&guard))
    }
}

impl LeadPool for SharedLeadPool {
    async fn bind_free_leads(
        &mut self,
        state: &StateCode,
        limit: i64,
        order_number: &str,
    ) -> Result<Vec<LeadId>> {
        let mut guard = self.0.lock().map_err(|_| anyhow!("lead pool mutex poisoned"))?;
        Ok(guard.bind(state, limit, order_number))
    }
}
