//! Domain services.
//!
//! Every operation follows the same order: authorize, take a lease,
//! reserve quota where something is created, write, release the lease,
//! then queue the audit entry. Audit recording never fails or delays the
//! call.

mod audit_logs;
mod resources;
mod tenants;
mod users;

use tenantry_core::audit::AuditQueue;
use tenantry_db::repository::SurrealAuditSink;

pub use audit_logs::AuditLogService;
pub use resources::ResourceService;
pub use tenants::{InitialAdmin, TenantService};
pub use users::UserService;

pub type AuditTrail<C> = AuditQueue<SurrealAuditSink<C>>;
