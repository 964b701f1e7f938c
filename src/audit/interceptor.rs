//! Wraps an operation so that every invocation leaves exactly one audit record behind.
//!
//! The wrapped future's result is returned untouched. Audit bookkeeping failures
//! (snapshot capture, expression evaluation, store writes) are logged and swallowed.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::audit::expr::{self, EvalContext};
use crate::audit::principal::{Principal, Provenance};
use crate::audit::record::{NewAuditRecord, OperationType, TargetType};
use crate::audit::store::AuditStore;
use crate::utils::fmt_duration;

/// Whether the record is written before the caller gets its result back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    Sync,
    /// Fire-and-forget on a spawned task.
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum AuditLevel {
    Normal = 1,
    Important = 2,
    Critical = 3,
}

/// Static audit configuration attached to one operation.
#[derive(Debug, Clone, Copy)]
pub struct AuditSpec {
    pub operation_type: OperationType,
    pub description: &'static str,
    pub description_expr: Option<&'static str>,
    pub target_type: TargetType,
    pub target_ids_expr: Option<&'static str>,
    pub reason_expr: Option<&'static str>,
    pub record_before: bool,
    pub record_after: bool,
    pub record_params: bool,
    pub record_result: bool,
    /// Positions of parameters left out of the recorded `params`.
    pub ignore_params: &'static [usize],
    pub emit: EmitMode,
    pub level: AuditLevel,
    pub record_failures: bool,
}

impl AuditSpec {
    pub const fn new(operation_type: OperationType, target_type: TargetType) -> Self {
        Self {
            operation_type,
            description: "",
            description_expr: None,
            target_type,
            target_ids_expr: None,
            reason_expr: None,
            record_before: false,
            record_after: false,
            record_params: true,
            record_result: false,
            ignore_params: &[],
            emit: EmitMode::Sync,
            level: AuditLevel::Normal,
            record_failures: true,
        }
    }

    pub const fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn description_expr(mut self, expression: &'static str) -> Self {
        self.description_expr = Some(expression);
        self
    }

    pub const fn target_ids(mut self, expression: &'static str) -> Self {
        self.target_ids_expr = Some(expression);
        self
    }

    pub const fn reason(mut self, expression: &'static str) -> Self {
        self.reason_expr = Some(expression);
        self
    }

    pub const fn record_states(mut self, before: bool, after: bool) -> Self {
        self.record_before = before;
        self.record_after = after;
        self
    }

    pub const fn record_params(mut self, record: bool) -> Self {
        self.record_params = record;
        self
    }

    pub const fn record_result(mut self, record: bool) -> Self {
        self.record_result = record;
        self
    }

    pub const fn ignore_params(mut self, indexes: &'static [usize]) -> Self {
        self.ignore_params = indexes;
        self
    }

    pub const fn emit(mut self, mode: EmitMode) -> Self {
        self.emit = mode;
        self
    }

    pub const fn level(mut self, level: AuditLevel) -> Self {
        self.level = level;
        self
    }

    pub const fn record_failures(mut self, record: bool) -> Self {
        self.record_failures = record;
        self
    }
}

/// The call being audited: its name, named arguments and who made it.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    method: String,
    params: Vec<(String, Value)>,
    principal: Option<Principal>,
    provenance: Provenance,
}

impl Invocation {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }

    /// Bind a named argument. Values that fail to serialize are bound as `null`.
    pub fn param<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            warn!(param = name, error = %e, "Failed to serialize audit parameter");
            Value::Null
        });
        self.params.push((name.to_owned(), value));
        self
    }

    pub fn principal(mut self, principal: Option<Principal>) -> Self {
        self.principal = principal;
        self
    }

    pub fn provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Produces a JSON snapshot of the targeted entities for before/after states.
#[async_trait]
pub trait StateCapture: Send + Sync {
    async fn capture(&self, ids: &[i64]) -> anyhow::Result<Value>;
}

/// Coerce list items to entity ids. Items that are not integers are skipped.
fn ids_from_values(values: Vec<Value>) -> Vec<i64> {
    values
        .into_iter()
        .filter_map(|value| {
            let id = match &value {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            if id.is_none() {
                debug!(item = %value, "Skipping non-id item in audit target list");
            }
            id
        })
        .collect()
}

async fn capture_state(capture: Option<&dyn StateCapture>, ids: &[i64], phase: &str) -> Option<Value> {
    let capture = capture?;
    if ids.is_empty() {
        return None;
    }
    match capture.capture(ids).await {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(phase, error = ?e, "Failed to capture entity state for audit");
            None
        }
    }
}

#[derive(Clone)]
pub struct OperationInterceptor {
    store: Arc<dyn AuditStore>,
}

impl OperationInterceptor {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Run `operation` and record it according to `spec`.
    ///
    /// `capture` is consulted for before/after snapshots when `spec` asks for them.
    pub async fn intercept<T, E, F>(
        &self,
        spec: &AuditSpec,
        invocation: Invocation,
        capture: Option<&dyn StateCapture>,
        operation: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        let start = Instant::now();
        let user_id = invocation.principal.as_ref().map(|p| p.id);

        let pre_ids = {
            let ctx = EvalContext::new(&invocation.params).with_user_id(user_id);
            spec.target_ids_expr
                .and_then(|e| expr::eval_list(e, &ctx))
                .map(ids_from_values)
        };

        let before_state = if spec.record_before {
            capture_state(capture, pre_ids.as_deref().unwrap_or_default(), "before").await
        } else {
            None
        };

        let outcome = operation.await;
        let elapsed = start.elapsed();

        if outcome.is_err() && !spec.record_failures {
            return outcome;
        }

        let after_state = match outcome {
            Ok(_) if spec.record_after => {
                capture_state(capture, pre_ids.as_deref().unwrap_or_default(), "after").await
            }
            _ => None,
        };

        let result_value = match &outcome {
            Ok(value) => serde_json::to_value(value)
                .inspect_err(|e| warn!(error = %e, "Failed to serialize audited result"))
                .ok(),
            Err(_) => None,
        };

        let ctx = EvalContext::new(&invocation.params)
            .with_user_id(user_id)
            .with_result(result_value.as_ref());

        let description = spec
            .description_expr
            .map(|e| expr::eval_string(e, &ctx))
            .filter(|d| !d.is_empty())
            .or_else(|| (!spec.description.is_empty()).then(|| spec.description.to_owned()))
            .unwrap_or_else(|| format!("{} operation", invocation.method));

        let target_ids = spec
            .target_ids_expr
            .and_then(|e| expr::eval_list(e, &ctx))
            .map(ids_from_values)
            .or(pre_ids);

        let reason = spec
            .reason_expr
            .map(|e| expr::eval_string(e, &ctx))
            .filter(|r| !r.is_empty());

        let mut extra = Map::new();
        if spec.record_params {
            let params: Map<String, Value> = invocation
                .params
                .iter()
                .enumerate()
                .filter(|(i, _)| !spec.ignore_params.contains(i))
                .map(|(_, (name, value))| (name.clone(), value.clone()))
                .collect();
            extra.insert("params".to_owned(), Value::Object(params));
        }
        if spec.record_result
            && let Some(ref value) = result_value
        {
            extra.insert("result".to_owned(), value.clone());
        }
        extra.insert("method".to_owned(), Value::from(invocation.method.as_str()));
        extra.insert("level".to_owned(), Value::from(spec.level as u8));

        let mut record = NewAuditRecord::new(
            spec.operation_type.as_str(),
            description,
            spec.target_type.as_str(),
        );
        record.requester = invocation.principal;
        record.target_ids = target_ids;
        record.before_state = before_state;
        record.after_state = after_state;
        record.provenance = invocation.provenance;
        record.execution_time_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        record.reason = reason;
        record.extra = extra;
        if let Err(ref e) = outcome {
            record = record.with_failure(&e.to_string());
        }

        debug!(
            operation = spec.operation_type.as_str(),
            outcome = record.outcome().as_str(),
            duration = fmt_duration(elapsed),
            "Emitting audit record"
        );

        match spec.emit {
            EmitMode::Sync => append_logged(self.store.as_ref(), record).await,
            EmitMode::Async => {
                let store = self.store.clone();
                tokio::spawn(async move { append_logged(store.as_ref(), record).await });
            }
        }

        outcome
    }
}

async fn append_logged(store: &dyn AuditStore, record: NewAuditRecord) {
    let operation = record.operation_type.clone();
    if let Err(e) = store.append(record).await {
        error!(operation, error = ?e, "Failed to persist audit record");
    }
}
