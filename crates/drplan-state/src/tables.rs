//! redb table definitions for the drplan store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Keys are the opaque entity ids.

use redb::TableDefinition;

/// Protection groups keyed by group id.
pub const PROTECTION_GROUPS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("protection_groups");

/// Recovery plans keyed by plan id.
pub const RECOVERY_PLANS: TableDefinition<&str, &[u8]> = TableDefinition::new("recovery_plans");

/// Executions keyed by execution id. Append/update only, never deleted.
pub const EXECUTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("executions");
