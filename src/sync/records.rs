//! Domain Record Types - Shared shape of everything that syncs
//!
//! Every collection the engine reconciles (products, customers, orders, ...)
//! is an array of records implementing [`SyncRecord`]. The trait carries the
//! three fields conflict resolution depends on:
//! - `id`: stable identity, never reused
//! - `updatedAt`: epoch-millisecond mutation stamp used for last-write-wins
//! - `deleted`: tombstone flag, kept in storage so deletions propagate
//!
//! Also defines [`DataDomain`] (the closed list of collections),
//! [`MutationIntent`] (the closed sum of buffered mutations) and
//! [`PendingOperation`] (a queued mutation awaiting remote confirmation).

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::db::{Database, DbResult};

/// Current wall-clock time as epoch milliseconds, the unit of `updatedAt`.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Drop an optional string that is empty or whitespace-only.
fn drop_blank(field: &mut Option<String>) {
    if matches!(field.as_deref(), Some(s) if s.trim().is_empty()) {
        *field = None;
    }
}

// ============================================================================
// SyncRecord Trait
// ============================================================================

/// Common contract of every syncable domain record.
///
/// A record missing `updatedAt` on the wire deserializes to `0` and loses
/// every timestamp comparison. That is deliberate: the merge engine never
/// repairs timestamps, it only compares them.
pub trait SyncRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Epoch-millisecond mutation stamp; 0 = never stamped.
    fn updated_at(&self) -> i64;

    /// Re-stamp after a local mutation.
    fn touch(&mut self, stamp_ms: i64);

    fn is_deleted(&self) -> bool;

    /// Turn the record into a tombstone. The record stays in storage so the
    /// deletion propagates to other devices; consumers never see it.
    fn mark_deleted(&mut self, stamp_ms: i64);

    /// Record the device a mutation originated from (informational only,
    /// never consulted by conflict resolution).
    fn set_device(&mut self, device_id: &str);

    /// Drop bulky optional payload under storage pressure. Default: nothing
    /// to shed.
    fn shed_bulk(&mut self) {}

    /// The date a history-shaped record describes (a report date, not
    /// `updatedAt`). `None` for live business data, which is never pruned
    /// by age.
    fn record_date(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn into_upsert_intent(self) -> MutationIntent;

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent;
}

// ============================================================================
// Data Domains
// ============================================================================

/// The closed list of synced collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDomain {
    Products,
    Requests,
    Customers,
    Orders,
    Recipes,
    StoreInventory,
    Staff,
    Attendance,
    Reconciliation,
}

impl DataDomain {
    pub const ALL: [DataDomain; 9] = [
        DataDomain::Products,
        DataDomain::Requests,
        DataDomain::Customers,
        DataDomain::Orders,
        DataDomain::Recipes,
        DataDomain::StoreInventory,
        DataDomain::Staff,
        DataDomain::Attendance,
        DataDomain::Reconciliation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Requests => "requests",
            Self::Customers => "customers",
            Self::Orders => "orders",
            Self::Recipes => "recipes",
            Self::StoreInventory => "store_inventory",
            Self::Staff => "staff",
            Self::Attendance => "attendance",
            Self::Reconciliation => "reconciliation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "products" => Some(Self::Products),
            "requests" => Some(Self::Requests),
            "customers" => Some(Self::Customers),
            "orders" => Some(Self::Orders),
            "recipes" => Some(Self::Recipes),
            "store_inventory" => Some(Self::StoreInventory),
            "staff" => Some(Self::Staff),
            "attendance" => Some(Self::Attendance),
            "reconciliation" => Some(Self::Reconciliation),
            _ => None,
        }
    }

    /// One storage key per collection per user scope. The same key addresses
    /// the collection on the remote store.
    pub fn storage_key(&self, scope: &str) -> String {
        format!("{}:{}", scope, self.as_str())
    }

    /// Append-only historical collections get age-based pruning instead of
    /// field stripping under storage pressure.
    pub fn is_history(&self) -> bool {
        matches!(self, Self::Attendance | Self::Reconciliation)
    }

    /// Background sync cadence. Collections users stare at refresh fast,
    /// slow-moving reference data refreshes on a relaxed timer.
    pub fn sync_interval(&self) -> Duration {
        let secs = match self {
            Self::Requests => 10,
            Self::Orders => 15,
            Self::Products => 30,
            Self::StoreInventory => 60,
            Self::Customers => 120,
            Self::Attendance => 180,
            Self::Reconciliation => 240,
            Self::Recipes => 300,
            Self::Staff => 300,
        };
        Duration::from_secs(secs)
    }
}

// ============================================================================
// Domain Records
// ============================================================================

/// Sellable or stocked item. Prices are kuruş to avoid float money.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub unit_price: i64,
    pub stock_qty: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for Product {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn shed_bulk(&mut self) {
        drop_blank(&mut self.sku);
        drop_blank(&mut self.category);
        drop_blank(&mut self.barcode);
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::ProductUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::ProductDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

/// Stock request raised by a store against the central depot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRequest {
    pub id: String,
    pub product_id: String,
    pub quantity: f64,
    pub store_id: String,
    /// "pending", "approved", "shipped" or "rejected".
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for StockRequest {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::RequestUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::RequestDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

/// Customer card with an open-balance counter in kuruş.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for Customer {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn shed_bulk(&mut self) {
        drop_blank(&mut self.phone);
        drop_blank(&mut self.email);
        drop_blank(&mut self.address);
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::CustomerUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::CustomerDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: f64,
    pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    pub total: i64,
    /// "open", "preparing", "delivered" or "cancelled".
    pub status: String,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for Order {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::OrderUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::OrderDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub product_id: String,
    pub quantity: f64,
    pub unit: String,
}

/// Production recipe: which ingredients make how much of an output product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub output_product_id: String,
    pub yield_qty: f64,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for Recipe {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::RecipeUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::RecipeDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

/// Physical count of one product at one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryCount {
    pub id: String,
    pub product_id: String,
    pub store_id: String,
    pub counted_qty: f64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for InventoryCount {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::InventoryUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::InventoryDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

/// Staff member. `payroll_defaults` (rate/bonus presets keyed by pay code)
/// is the single bulkiest optional payload in the system and the first
/// thing shed under storage pressure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub payroll_defaults: HashMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for StaffMember {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn shed_bulk(&mut self) {
        self.payroll_defaults.clear();
        drop_blank(&mut self.phone);
        drop_blank(&mut self.note);
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::StaffUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::StaffDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

/// One staff member's hours on an attendance sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub staff_id: String,
    pub hours_worked: f64,
    #[serde(default)]
    pub overtime_hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Daily attendance import. History-shaped: keyed to a sheet date and pruned
/// by age rather than slimmed field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSheet {
    pub id: String,
    pub sheet_date: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<AttendanceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_by: Option<String>,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for AttendanceSheet {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn record_date(&self) -> Option<DateTime<Utc>> {
        Some(self.sheet_date)
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::AttendanceUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::AttendanceDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

/// End-of-day cash reconciliation for one store. History-shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub id: String,
    pub report_date: DateTime<Utc>,
    pub store_id: String,
    pub expected_total: i64,
    pub counted_total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SyncRecord for ReconciliationReport {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn touch(&mut self, stamp_ms: i64) {
        self.updated_at = stamp_ms;
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn mark_deleted(&mut self, stamp_ms: i64) {
        self.deleted = true;
        self.updated_at = stamp_ms;
    }

    fn set_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
    }

    fn record_date(&self) -> Option<DateTime<Utc>> {
        Some(self.report_date)
    }

    fn into_upsert_intent(self) -> MutationIntent {
        MutationIntent::ReconciliationUpsert(self)
    }

    fn delete_intent(id: &str, deleted_at_ms: i64) -> MutationIntent {
        MutationIntent::ReconciliationDelete {
            id: id.to_string(),
            deleted_at: deleted_at_ms,
        }
    }
}

// ============================================================================
// Mutation Intents
// ============================================================================

/// A buffered mutation, one variant per (domain, kind) pair.
///
/// Closed sum type so the host's executor dispatches with an exhaustive
/// match; adding a collection fails compilation until every dispatch site
/// handles it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MutationIntent {
    ProductUpsert(Product),
    ProductDelete { id: String, deleted_at: i64 },
    RequestUpsert(StockRequest),
    RequestDelete { id: String, deleted_at: i64 },
    CustomerUpsert(Customer),
    CustomerDelete { id: String, deleted_at: i64 },
    OrderUpsert(Order),
    OrderDelete { id: String, deleted_at: i64 },
    RecipeUpsert(Recipe),
    RecipeDelete { id: String, deleted_at: i64 },
    InventoryUpsert(InventoryCount),
    InventoryDelete { id: String, deleted_at: i64 },
    StaffUpsert(StaffMember),
    StaffDelete { id: String, deleted_at: i64 },
    AttendanceUpsert(AttendanceSheet),
    AttendanceDelete { id: String, deleted_at: i64 },
    ReconciliationUpsert(ReconciliationReport),
    ReconciliationDelete { id: String, deleted_at: i64 },
}

impl MutationIntent {
    /// The collection this mutation targets.
    pub fn domain(&self) -> DataDomain {
        match self {
            Self::ProductUpsert(_) | Self::ProductDelete { .. } => DataDomain::Products,
            Self::RequestUpsert(_) | Self::RequestDelete { .. } => DataDomain::Requests,
            Self::CustomerUpsert(_) | Self::CustomerDelete { .. } => DataDomain::Customers,
            Self::OrderUpsert(_) | Self::OrderDelete { .. } => DataDomain::Orders,
            Self::RecipeUpsert(_) | Self::RecipeDelete { .. } => DataDomain::Recipes,
            Self::InventoryUpsert(_) | Self::InventoryDelete { .. } => DataDomain::StoreInventory,
            Self::StaffUpsert(_) | Self::StaffDelete { .. } => DataDomain::Staff,
            Self::AttendanceUpsert(_) | Self::AttendanceDelete { .. } => DataDomain::Attendance,
            Self::ReconciliationUpsert(_) | Self::ReconciliationDelete { .. } => {
                DataDomain::Reconciliation
            }
        }
    }

    /// Id of the record this mutation targets (for logging).
    pub fn record_id(&self) -> &str {
        match self {
            Self::ProductUpsert(r) => &r.id,
            Self::RequestUpsert(r) => &r.id,
            Self::CustomerUpsert(r) => &r.id,
            Self::OrderUpsert(r) => &r.id,
            Self::RecipeUpsert(r) => &r.id,
            Self::InventoryUpsert(r) => &r.id,
            Self::StaffUpsert(r) => &r.id,
            Self::AttendanceUpsert(r) => &r.id,
            Self::ReconciliationUpsert(r) => &r.id,
            Self::ProductDelete { id, .. }
            | Self::RequestDelete { id, .. }
            | Self::CustomerDelete { id, .. }
            | Self::OrderDelete { id, .. }
            | Self::RecipeDelete { id, .. }
            | Self::InventoryDelete { id, .. }
            | Self::StaffDelete { id, .. }
            | Self::AttendanceDelete { id, .. }
            | Self::ReconciliationDelete { id, .. } => id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::ProductDelete { .. }
                | Self::RequestDelete { .. }
                | Self::CustomerDelete { .. }
                | Self::OrderDelete { .. }
                | Self::RecipeDelete { .. }
                | Self::InventoryDelete { .. }
                | Self::StaffDelete { .. }
                | Self::AttendanceDelete { .. }
                | Self::ReconciliationDelete { .. }
        )
    }
}

// ============================================================================
// Pending Operations
// ============================================================================

/// A mutation that could not be confirmed against the remote store yet.
/// Lives in the durable queue until replayed successfully or retried out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: String,
    pub intent: MutationIntent,
    pub timestamp: DateTime<Utc>,
    pub retry_count: i32,
}

impl PendingOperation {
    pub fn new(intent: MutationIntent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            intent,
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }
}

// ============================================================================
// Device Identity
// ============================================================================

/// Identity stamped onto locally-originated mutations. Informational only;
/// conflict resolution never consults it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
}

impl DeviceInfo {
    pub fn generate() -> Self {
        Self {
            device_id: uuid::Uuid::new_v4().to_string(),
            device_name: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown-device".to_string()),
        }
    }

    /// Load the persisted identity, generating and persisting one on first
    /// run.
    pub fn load_or_create(db: &Database) -> DbResult<Self> {
        if let Some(info) = db.get_setting::<DeviceInfo>("device_info")? {
            return Ok(info);
        }

        let info = Self::generate();
        db.set_setting("device_info", &info)?;
        log::info!("Registered new device identity: {}", info.device_name);
        Ok(info)
    }
}

// ============================================================================
// Tests
// ============================================================================
