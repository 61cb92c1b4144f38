//! Ready-made hooks.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::LlmError;
use crate::hooks::{AiHooks, HookContext};
use crate::registry::SelectedModel;
use crate::types::{RequestUsage, SelectionCriteria, UsageEstimate};

const TARGET: &str = "modelgate::hooks";

/// Rejects requests whose estimated cost is over a per-request ceiling or
/// would push cumulative spend past a total budget.
///
/// Spend is accumulated from the actual cost reported to `after_request`.
#[derive(Debug, Default)]
pub struct BudgetHook {
    per_request: Option<f64>,
    total: Option<f64>,
    spent: Mutex<f64>,
}

impl BudgetHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_per_request_limit(mut self, usd: f64) -> Self {
        self.per_request = Some(usd);
        self
    }

    pub fn with_total_budget(mut self, usd: f64) -> Self {
        self.total = Some(usd);
        self
    }

    pub fn spent(&self) -> f64 {
        *self.spent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn remaining(&self) -> Option<f64> {
        self.total.map(|t| (t - self.spent()).max(0.0))
    }
}

#[async_trait]
impl AiHooks for BudgetHook {
    fn name(&self) -> &str {
        "budget"
    }

    async fn before_request(
        &self,
        _ctx: &HookContext,
        _selected: &SelectedModel,
        estimate: &UsageEstimate,
    ) -> Result<(), LlmError> {
        if let Some(limit) = self.per_request {
            if estimate.cost > limit {
                return Err(LlmError::BudgetExceeded {
                    limit,
                    estimated: estimate.cost,
                });
            }
        }
        if let Some(total) = self.total {
            let projected = self.spent() + estimate.cost;
            if projected > total {
                return Err(LlmError::BudgetExceeded {
                    limit: total,
                    estimated: projected,
                });
            }
        }
        Ok(())
    }

    async fn after_request(&self, _ctx: &HookContext, usage: &RequestUsage) -> Result<(), LlmError> {
        *self.spent.lock().unwrap_or_else(PoisonError::into_inner) += usage.cost;
        Ok(())
    }
}

/// Adds a fixed provider deny-list (and optionally an allow-list) to every
/// request's criteria, e.g. to keep one tenant off a vendor.
#[derive(Debug, Clone, Default)]
pub struct ProviderPolicyHook {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl ProviderPolicyHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(mut self, provider: impl Into<String>) -> Self {
        self.deny.push(provider.into());
        self
    }

    pub fn allow(mut self, provider: impl Into<String>) -> Self {
        self.allow.push(provider.into());
        self
    }
}

#[async_trait]
impl AiHooks for ProviderPolicyHook {
    fn name(&self) -> &str {
        "provider_policy"
    }

    async fn before_model_selection(
        &self,
        _ctx: &HookContext,
        mut criteria: SelectionCriteria,
    ) -> Result<SelectionCriteria, LlmError> {
        for p in &self.deny {
            if !criteria.providers.deny.contains(p) {
                criteria.providers.deny.push(p.clone());
            }
        }
        if !self.allow.is_empty() {
            if criteria.providers.allow.is_empty() {
                criteria.providers.allow = self.allow.clone();
            } else {
                // Narrow an existing allow-list, never widen it.
                criteria.providers.allow.retain(|p| self.allow.contains(p));
                if criteria.providers.allow.is_empty() {
                    return Err(LlmError::InvalidParameter(
                        "No allowed provider is permitted by policy".into(),
                    ));
                }
            }
        }
        Ok(criteria)
    }
}

/// Emits a structured `tracing` event at every lifecycle point.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

#[async_trait]
impl AiHooks for TracingHook {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn before_model_selection(
        &self,
        ctx: &HookContext,
        criteria: SelectionCriteria,
    ) -> Result<SelectionCriteria, LlmError> {
        tracing::debug!(
            target: TARGET,
            request_id = %ctx.request_id,
            operation = %ctx.operation,
            streaming = ctx.streaming,
            required = ?criteria.required,
            model = ?criteria.model,
            "selecting model"
        );
        Ok(criteria)
    }

    async fn on_model_selected(
        &self,
        ctx: &HookContext,
        selected: SelectedModel,
    ) -> Result<SelectedModel, LlmError> {
        tracing::info!(
            target: TARGET,
            request_id = %ctx.request_id,
            operation = %ctx.operation,
            model = %selected.entry.qualified_id(),
            score = ?selected.score,
            "model selected"
        );
        Ok(selected)
    }

    async fn before_request(
        &self,
        ctx: &HookContext,
        selected: &SelectedModel,
        estimate: &UsageEstimate,
    ) -> Result<(), LlmError> {
        tracing::debug!(
            target: TARGET,
            request_id = %ctx.request_id,
            model = %selected.entry.qualified_id(),
            input_tokens = estimate.input_tokens,
            estimated_cost = estimate.cost,
            "dispatching"
        );
        Ok(())
    }

    async fn after_request(&self, ctx: &HookContext, usage: &RequestUsage) -> Result<(), LlmError> {
        tracing::info!(
            target: TARGET,
            request_id = %ctx.request_id,
            operation = %usage.operation,
            provider = %usage.provider,
            model = %usage.model,
            cost = usage.cost,
            streamed = usage.streamed,
            duration_ms = usage.duration.as_millis() as u64,
            "request completed"
        );
        Ok(())
    }

    async fn on_error(&self, ctx: &HookContext, error: &LlmError) -> Result<(), LlmError> {
        tracing::warn!(
            target: TARGET,
            request_id = %ctx.request_id,
            operation = %ctx.operation,
            code = %error.code(),
            error = %error,
            "request failed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::types::{ModelCatalogEntry, Operation};
    use std::sync::Arc;
    use std::time::Duration;

    fn selected() -> SelectedModel {
        let provider = StaticProvider::builder("openai").build_arc();
        SelectedModel {
            entry: ModelCatalogEntry::new("openai", "gpt-4o"),
            provider_config: Default::default(),
            provider,
            score: None,
        }
    }

    fn usage(cost: f64) -> RequestUsage {
        RequestUsage {
            request_id: "r".into(),
            operation: Operation::Chat,
            provider: "openai".into(),
            model: "gpt-4o".into(),
            estimate: UsageEstimate::default(),
            usage: None,
            cost,
            streamed: false,
            started_at: chrono::Utc::now(),
            duration: Duration::from_millis(5),
        }
    }

    fn estimate(cost: f64) -> UsageEstimate {
        UsageEstimate {
            cost,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn per_request_limit_rejects_expensive_estimates() {
        let hook = BudgetHook::new().with_per_request_limit(0.01);
        let ctx = HookContext::new(Operation::Chat, false);
        assert!(hook.before_request(&ctx, &selected(), &estimate(0.005)).await.is_ok());
        let err = hook
            .before_request(&ctx, &selected(), &estimate(0.02))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::BudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn total_budget_tracks_actual_spend() {
        let hook = BudgetHook::new().with_total_budget(1.0);
        let ctx = HookContext::new(Operation::Chat, false);
        hook.after_request(&ctx, &usage(0.9)).await.unwrap();
        assert!((hook.spent() - 0.9).abs() < 1e-9);
        assert!(hook.before_request(&ctx, &selected(), &estimate(0.2)).await.is_err());
        assert!(hook.before_request(&ctx, &selected(), &estimate(0.05)).await.is_ok());
    }

    #[tokio::test]
    async fn policy_narrows_allow_list() {
        let hook = ProviderPolicyHook::new().deny("banned").allow("openai");
        let ctx = HookContext::new(Operation::Chat, false);
        let criteria = hook
            .before_model_selection(
                &ctx,
                SelectionCriteria::new()
                    .allow_provider("openai")
                    .allow_provider("anthropic"),
            )
            .await
            .unwrap();
        assert_eq!(criteria.providers.allow, vec!["openai"]);
        assert_eq!(criteria.providers.deny, vec!["banned"]);

        let hook: Arc<dyn AiHooks> = Arc::new(ProviderPolicyHook::new().allow("azure"));
        assert!(
            hook.before_model_selection(&ctx, SelectionCriteria::new().allow_provider("openai"))
                .await
                .is_err()
        );
    }
}
