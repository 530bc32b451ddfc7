//! redb table definitions for the arbor state store.
//!
//! Each table uses `&str` keys and `&[u8]` values. All but `BLOB_DATA` hold
//! JSON-serialized domain types.

use redb::TableDefinition;

/// Shape shared by every table.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Namespaces keyed by `{name}`.
pub const NAMESPACES: JsonTable = TableDefinition::new("namespaces");

/// Applications keyed by `{namespace}/{name}`.
pub const APPLICATIONS: JsonTable = TableDefinition::new("applications");

/// Ingress rules keyed by `{namespace}/{app}/{route}`.
pub const INGRESS_RULES: JsonTable = TableDefinition::new("ingress_rules");

/// Per-application certificates keyed by `{namespace}/{app}`.
pub const CERTIFICATES: JsonTable = TableDefinition::new("certificates");

/// Backing services keyed by `{namespace}/{name}`.
pub const SERVICES: JsonTable = TableDefinition::new("services");

/// Artifact metadata keyed by `{uid}`.
pub const BLOBS: JsonTable = TableDefinition::new("blobs");

/// Raw artifact content keyed by `{uid}`.
pub const BLOB_DATA: JsonTable = TableDefinition::new("blob_data");

/// Stage records keyed by `{stage_id}`.
pub const STAGES: JsonTable = TableDefinition::new("stages");

/// Workloads keyed by `{namespace}/{app}`.
pub const WORKLOADS: JsonTable = TableDefinition::new("workloads");

/// Every table, for creation at open time.
pub const ALL: [JsonTable; 9] = [
    NAMESPACES,
    APPLICATIONS,
    INGRESS_RULES,
    CERTIFICATES,
    SERVICES,
    BLOBS,
    BLOB_DATA,
    STAGES,
    WORKLOADS,
];
