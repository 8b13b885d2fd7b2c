// crates/evolvedb-core/src/core/query.rs
// ============================================================================
// Module: evolvedb Request Types
// Description: Structured read, write, and archival requests and their receipts.
// Purpose: Replace free-form SQL clauses with typed filter and sort expressions.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Callers never hand SQL text to the storage layer. Filters are
//! `(field, comparator, value)` triples joined with AND, ordering is a list of
//! `(field, direction)` pairs, and values are always bound as parameters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FieldName;
use crate::core::value::Value;

// ============================================================================
// SECTION: Filters and Ordering
// ============================================================================

/// Comparison applied by a [`Filter`].
///
/// # Invariants
/// - Ordering comparators follow SQL semantics: a null column never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    /// Column equals value.
    Eq,
    /// Column differs from value.
    Ne,
    /// Column is less than value.
    Lt,
    /// Column is less than or equal to value.
    Le,
    /// Column is greater than value.
    Gt,
    /// Column is greater than or equal to value.
    Ge,
    /// Column is null; the filter value is ignored.
    IsNull,
    /// Column is not null; the filter value is ignored.
    IsNotNull,
}

impl Comparator {
    /// Returns the SQL operator text.
    #[must_use]
    pub const fn sql_operator(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Returns true when the comparator binds a value parameter.
    #[must_use]
    pub const fn takes_value(self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// Single filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column the predicate applies to.
    pub field: FieldName,
    /// Comparison to apply.
    pub comparator: Comparator,
    /// Right-hand value.
    #[serde(default = "null_value")]
    pub value: Value,
}

/// Serde default for filters without a value.
const fn null_value() -> Value {
    Value::Null
}

impl Filter {
    /// Creates a filter.
    #[must_use]
    pub fn new(field: FieldName, comparator: Comparator, value: impl Into<Value>) -> Self {
        Self { field, comparator, value: value.into() }
    }

    /// `field = value`.
    #[must_use]
    pub fn eq(field: FieldName, value: impl Into<Value>) -> Self {
        Self::new(field, Comparator::Eq, value)
    }

    /// `field < value`.
    #[must_use]
    pub fn lt(field: FieldName, value: impl Into<Value>) -> Self {
        Self::new(field, Comparator::Lt, value)
    }

    /// `field > value`.
    #[must_use]
    pub fn gt(field: FieldName, value: impl Into<Value>) -> Self {
        Self::new(field, Comparator::Gt, value)
    }

    /// `field IS NULL`.
    #[must_use]
    pub fn is_null(field: FieldName) -> Self {
        Self::new(field, Comparator::IsNull, Value::Null)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Column to sort by.
    pub field: FieldName,
    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl OrderBy {
    /// Ascending sort on `field`.
    #[must_use]
    pub const fn asc(field: FieldName) -> Self {
        Self { field, direction: SortDirection::Asc }
    }

    /// Descending sort on `field`.
    #[must_use]
    pub const fn desc(field: FieldName) -> Self {
        Self { field, direction: SortDirection::Desc }
    }

    /// Newest rows first.
    #[must_use]
    pub fn row_id_desc() -> Self {
        Self::desc(FieldName::row_id())
    }
}

// ============================================================================
// SECTION: Read Requests
// ============================================================================

/// Read request for a single table.
///
/// # Invariants
/// - `limit` of `None` returns every matching row.
/// - `fields` of `None` projects every column except the row key (unless
///   `include_row_id` is set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Maximum rows to return.
    #[serde(default = "default_read_limit")]
    pub limit: Option<u64>,
    /// Sort keys applied in order.
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    /// Filters joined with AND.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Explicit projection.
    #[serde(default)]
    pub fields: Option<Vec<FieldName>>,
    /// Include the row key column in results.
    #[serde(default)]
    pub include_row_id: bool,
}

/// Default read limit: a single row.
#[allow(clippy::unnecessary_wraps, reason = "Serde default must match the field type.")]
const fn default_read_limit() -> Option<u64> {
    Some(1)
}

impl Default for ReadRequest {
    fn default() -> Self {
        Self {
            limit: default_read_limit(),
            order_by: Vec::new(),
            filters: Vec::new(),
            fields: None,
            include_row_id: false,
        }
    }
}

impl ReadRequest {
    /// Sets the row limit.
    #[must_use]
    pub const fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Appends a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets an explicit projection.
    #[must_use]
    pub fn fields(mut self, fields: Vec<FieldName>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Includes the row key column.
    #[must_use]
    pub const fn with_row_id(mut self) -> Self {
        self.include_row_id = true;
        self
    }
}

// ============================================================================
// SECTION: Write Requests
// ============================================================================

/// Options controlling a single write.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Field stamped with the current unix time (seconds) before writing.
    #[serde(default)]
    pub timestamp_field: Option<FieldName>,
    /// Enables cumulative mode; an empty list tracks every field of the record.
    #[serde(default)]
    pub cumulative_fields: Option<Vec<FieldName>>,
}

impl WriteOptions {
    /// Stamps the record with the current time under `field`.
    #[must_use]
    pub fn timestamp(mut self, field: FieldName) -> Self {
        self.timestamp_field = Some(field);
        self
    }

    /// Enables cumulative mode for `fields` (all record fields when empty).
    #[must_use]
    pub fn cumulative(mut self, fields: Vec<FieldName>) -> Self {
        self.cumulative_fields = Some(fields);
        self
    }
}

/// Outcome of a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Row key assigned to the inserted row.
    pub row_id: i64,
    /// A counter reset was detected and absorbed into the offsets row.
    pub reset_detected: bool,
}

// ============================================================================
// SECTION: Archival Requests
// ============================================================================

/// Upper bound on a field for archival candidates (`field < value`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cutoff {
    /// Column compared against the cutoff, typically a timestamp field.
    pub field: FieldName,
    /// Exclusive upper bound.
    pub value: Value,
}

/// Archival policy for one table.
///
/// # Invariants
/// - Without `records_to_keep` archival is a no-op.
/// - `before` and `filters` only narrow the oldest-excess candidate set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArchivePolicy {
    /// Number of newest rows retained at the source.
    #[serde(default)]
    pub records_to_keep: Option<u64>,
    /// Only archive candidates older than this cutoff.
    #[serde(default)]
    pub before: Option<Cutoff>,
    /// Only archive candidates matching every filter.
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl ArchivePolicy {
    /// Keeps the newest `records` rows.
    #[must_use]
    pub fn keep(records: u64) -> Self {
        Self { records_to_keep: Some(records), ..Self::default() }
    }

    /// Restricts candidates to `field < value`.
    #[must_use]
    pub fn before(mut self, field: FieldName, value: impl Into<Value>) -> Self {
        self.before = Some(Cutoff { field, value: value.into() });
        self
    }

    /// Restricts candidates to rows matching `filter`.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Outcome of an archival run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchiveReport {
    /// Rows newly inserted into the archive and removed from the source.
    pub moved: u64,
    /// Rows already present in the archive from an earlier interrupted run.
    pub skipped: u64,
    /// Rows left in the source table.
    pub remaining: u64,
}
