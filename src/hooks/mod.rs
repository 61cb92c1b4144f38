//! Request lifecycle hooks
//!
//! Hooks observe and steer a pipeline call at fixed points. They run strictly
//! in sequence, in registration order, and never concurrently with each other
//! or with the dispatch step.
//!
//! Failure policy per stage:
//! - `before_model_selection`, `on_model_selected`, `before_request`: an error
//!   aborts the call with `HookAborted`.
//! - `after_request`, `on_error`: an error is logged and dropped, so it can
//!   neither fail a finished call nor mask the original error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::registry::SelectedModel;
use crate::types::{Operation, RequestUsage, SelectionCriteria, UsageEstimate};

pub mod presets;

pub use presets::{BudgetHook, ProviderPolicyHook, TracingHook};

const TARGET: &str = "modelgate::hooks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    BeforeModelSelection,
    OnModelSelected,
    BeforeRequest,
    AfterRequest,
    OnError,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeModelSelection => "before_model_selection",
            Self::OnModelSelected => "on_model_selected",
            Self::BeforeRequest => "before_request",
            Self::AfterRequest => "after_request",
            Self::OnError => "on_error",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call information shared by every hook invocation.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub request_id: String,
    pub operation: Operation,
    pub streaming: bool,
    /// Caller-supplied metadata from `RequestOptions`.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HookContext {
    pub fn new(operation: Operation, streaming: bool) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation,
            streaming,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Lifecycle callbacks. Every method defaults to a no-op.
#[async_trait]
pub trait AiHooks: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// May rewrite the selection criteria (e.g. add a tenant deny-list).
    async fn before_model_selection(
        &self,
        _ctx: &HookContext,
        criteria: SelectionCriteria,
    ) -> Result<SelectionCriteria, LlmError> {
        Ok(criteria)
    }

    /// May replace the chosen model, provider or provider config.
    async fn on_model_selected(
        &self,
        _ctx: &HookContext,
        selected: SelectedModel,
    ) -> Result<SelectedModel, LlmError> {
        Ok(selected)
    }

    /// Last point before any provider interaction. Returning an error here is
    /// how budgets are enforced.
    async fn before_request(
        &self,
        _ctx: &HookContext,
        _selected: &SelectedModel,
        _estimate: &UsageEstimate,
    ) -> Result<(), LlmError> {
        Ok(())
    }

    /// Called exactly once per successful call, after a stream has fully
    /// drained for streaming calls.
    async fn after_request(&self, _ctx: &HookContext, _usage: &RequestUsage) -> Result<(), LlmError> {
        Ok(())
    }

    async fn on_error(&self, _ctx: &HookContext, _error: &LlmError) -> Result<(), LlmError> {
        Ok(())
    }
}

/// An ordered list of hooks.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn AiHooks>>,
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Arc<dyn AiHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn push(&mut self, hook: Arc<dyn AiHooks>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn aborted(ctx: &HookContext, hook: HookStage, source: LlmError) -> LlmError {
        LlmError::HookAborted {
            operation: ctx.operation,
            hook,
            source: Box::new(source),
        }
    }

    pub async fn before_model_selection(
        &self,
        ctx: &HookContext,
        mut criteria: SelectionCriteria,
    ) -> Result<SelectionCriteria, LlmError> {
        for hook in &self.hooks {
            criteria = hook
                .before_model_selection(ctx, criteria)
                .await
                .map_err(|e| Self::aborted(ctx, HookStage::BeforeModelSelection, e))?;
        }
        Ok(criteria)
    }

    pub async fn on_model_selected(
        &self,
        ctx: &HookContext,
        mut selected: SelectedModel,
    ) -> Result<SelectedModel, LlmError> {
        for hook in &self.hooks {
            selected = hook
                .on_model_selected(ctx, selected)
                .await
                .map_err(|e| Self::aborted(ctx, HookStage::OnModelSelected, e))?;
        }
        Ok(selected)
    }

    pub async fn before_request(
        &self,
        ctx: &HookContext,
        selected: &SelectedModel,
        estimate: &UsageEstimate,
    ) -> Result<(), LlmError> {
        for hook in &self.hooks {
            hook.before_request(ctx, selected, estimate)
                .await
                .map_err(|e| Self::aborted(ctx, HookStage::BeforeRequest, e))?;
        }
        Ok(())
    }

    pub async fn after_request(&self, ctx: &HookContext, usage: &RequestUsage) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_request(ctx, usage).await {
                tracing::warn!(
                    target: TARGET,
                    hook = hook.name(),
                    request_id = %ctx.request_id,
                    error = %e,
                    "after_request hook failed"
                );
            }
        }
    }

    pub async fn on_error(&self, ctx: &HookContext, error: &LlmError) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_error(ctx, error).await {
                tracing::warn!(
                    target: TARGET,
                    hook = hook.name(),
                    request_id = %ctx.request_id,
                    error = %e,
                    original = %error,
                    "on_error hook failed"
                );
            }
        }
    }
}
