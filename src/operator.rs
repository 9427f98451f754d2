//! Operator tooling: aging previews and sweeps, manual reclaim, and
//! fix-script re-classification.

use crate::drivers::{
    AgingDriver, BasketFilter, BasketSweepReport, PlannedMove, RealtimeDriver, RealtimeOutcome,
    ReclaimDriver, ReclaimReport, ReclaimRequest, ReclassifyCause,
};
use crate::error::Result;
use crate::models::{AgentId, BasketId, CustomerId};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct OperatorTools {
    aging: Arc<AgingDriver>,
    reclaim: Arc<ReclaimDriver>,
    realtime: Arc<RealtimeDriver>,
}

impl OperatorTools {
    pub fn new(
        aging: Arc<AgingDriver>,
        reclaim: Arc<ReclaimDriver>,
        realtime: Arc<RealtimeDriver>,
    ) -> Self {
        Self {
            aging,
            reclaim,
            realtime,
        }
    }

    /// `{customer_id, from, to}` moves the next sweep of `basket` would make
    pub async fn preview_aging_transitions(&self, basket: BasketId) -> Result<Vec<PlannedMove>> {
        self.aging.preview(basket).await
    }

    pub async fn execute_aging_sweep(&self, basket: BasketId) -> Result<BasketSweepReport> {
        self.aging.sweep_basket(basket, false).await
    }

    pub async fn reclaim_customers(
        &self,
        operator: AgentId,
        agent: AgentId,
        filter: BasketFilter,
    ) -> Result<ReclaimReport> {
        let request = ReclaimRequest::new(operator, agent, filter)
            .with_note(format!("reclaimed from agent {agent} by operator {operator}"));
        self.reclaim.reclaim(&request).await
    }

    /// Re-run classification for one customer as a fix-script repair
    pub async fn reclassify_customer(
        &self,
        operator: AgentId,
        customer_id: CustomerId,
        note: Option<String>,
    ) -> Result<RealtimeOutcome> {
        let note =
            note.unwrap_or_else(|| format!("fix-script reclassification by operator {operator}"));
        let outcome = self
            .realtime
            .reclassify_customer(customer_id, ReclassifyCause::fix_script(operator, note))
            .await?;
        info!(
            customer_id = customer_id.0,
            operator = operator.0,
            outcome = ?outcome,
            "Fix-script reclassification finished"
        );
        Ok(outcome)
    }
}
