//! Operation auditing: expression-driven metadata, write-once records and their store.

pub mod expr;
pub mod interceptor;
pub mod principal;
pub mod record;
pub mod retention;
pub mod store;

pub use interceptor::{AuditLevel, AuditSpec, EmitMode, Invocation, OperationInterceptor, StateCapture};
pub use principal::{Principal, PrincipalResolver, Provenance};
pub use record::{AuditRecord, NewAuditRecord, OperationType, Outcome, TargetType};
pub use store::{AuditFilter, AuditStore, OperationStat, Page, PageRequest};
