//! redb table definitions for the Switchyard state store.
//!
//! A single table: deployment records keyed by deployment name, with
//! JSON-serialized values. Pool state lives inside the record — pools
//! have no life of their own outside the deployment that owns them.

use redb::TableDefinition;

/// Deployment records keyed by `{deployment_name}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");
