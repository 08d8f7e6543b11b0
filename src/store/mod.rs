//! In-process relational store for shipments, assignments and the status
//! history.
//!
//! All mutation goes through a [`UnitOfWork`], which holds exclusive key locks
//! for its lifetime and commits its write set atomically. The two assignment
//! unique indexes are re-checked at commit so a logic bug surfaces as
//! [`StoreError::UniqueViolation`] instead of a broken invariant.

mod locks;
mod tables;
mod tx;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub use locks::LockKey;
pub use tx::UnitOfWork;

use crate::models::assignment::Assignment;
use crate::models::history::StatusHistoryEntry;
use crate::models::shipment::{Shipment, ShipmentStatus};
use locks::LockManager;
use tables::Tables;

pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("timed out waiting for lock on {key}")]
    LockTimeout { key: String },

    #[error("lock {key} requested out of order")]
    LockOrder { key: String },

    #[error("store is closed")]
    Closed,

    #[error("unique constraint {index} violated")]
    UniqueViolation { index: &'static str },

    #[error("{table} row {id} is missing")]
    MissingRow { table: &'static str, id: Uuid },
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShipmentFilter {
    pub sender_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub status: Option<ShipmentStatus>,
    pub available: bool,
    pub page: usize,
    pub page_size: usize,
}

impl ShipmentFilter {
    /// Page is 1-based; page size is clamped to `1..=MAX_PAGE_SIZE`.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.page_size = match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            size => size.min(MAX_PAGE_SIZE),
        };
        self
    }

    fn matches(&self, shipment: &Shipment, tables: &Tables) -> bool {
        self.sender_id.is_none_or(|id| shipment.sender_id == id)
            && self.receiver_id.is_none_or(|id| shipment.receiver_id == id)
            && self.status.is_none_or(|status| shipment.status == status)
            && (!self.available || !tables.active_by_shipment.contains_key(&shipment.id))
    }
}

#[derive(Debug, Clone)]
pub struct ShipmentPage {
    pub shipments: Vec<Shipment>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreCounts {
    pub shipments: usize,
    pub assignments: usize,
    pub active_assignments: usize,
}

pub struct Store {
    tables: RwLock<Tables>,
    locks: LockManager,
    open: AtomicBool,
}

impl Store {
    pub fn open(options: StoreOptions) -> Self {
        info!(lock_timeout_ms = options.lock_timeout.as_millis() as u64, "store opened");
        Self {
            tables: RwLock::new(Tables::default()),
            locks: LockManager::new(options.lock_timeout),
            open: AtomicBool::new(true),
        }
    }

    /// Refuses new units of work and commits from now on.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("store closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub async fn begin(&self, keys: &[LockKey]) -> Result<UnitOfWork<'_>, StoreError> {
        UnitOfWork::begin(self, keys).await
    }

    pub fn shipment(&self, id: Uuid) -> Option<Shipment> {
        self.read_tables().shipments.get(&id).cloned()
    }

    pub fn assignment(&self, id: Uuid) -> Option<Assignment> {
        self.read_tables().assignments.get(&id).cloned()
    }

    pub fn active_assignment_for_shipment(&self, shipment_id: Uuid) -> Option<Assignment> {
        self.read_tables().active_for_shipment(shipment_id).cloned()
    }

    pub fn active_assignment_for_rider(&self, rider_id: Uuid) -> Option<Assignment> {
        self.read_tables().active_for_owner(rider_id).cloned()
    }

    pub fn assignments_for_shipment(&self, shipment_id: Uuid) -> Vec<Assignment> {
        let tables = self.read_tables();
        let mut rows: Vec<Assignment> = tables
            .assignments
            .values()
            .filter(|assignment| assignment.shipment_id == shipment_id)
            .cloned()
            .collect();
        rows.sort_by_key(|assignment| assignment.accepted_at);
        rows
    }

    pub fn list_shipments(&self, filter: ShipmentFilter) -> ShipmentPage {
        let filter = filter.normalized();
        let tables = self.read_tables();

        let mut matching: Vec<&Shipment> = tables
            .shipments
            .values()
            .filter(|shipment| filter.matches(shipment, &tables))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let shipments = matching
            .into_iter()
            .skip((filter.page - 1).saturating_mul(filter.page_size))
            .take(filter.page_size)
            .cloned()
            .collect();

        ShipmentPage {
            shipments,
            page: filter.page,
            page_size: filter.page_size,
            total,
        }
    }

    pub fn history_for(&self, shipment_id: Uuid) -> Vec<StatusHistoryEntry> {
        self.read_tables()
            .history
            .iter()
            .filter(|entry| entry.shipment_id == shipment_id)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> StoreCounts {
        let tables = self.read_tables();
        StoreCounts {
            shipments: tables.shipments.len(),
            assignments: tables.assignments.len(),
            active_assignments: tables.active_by_shipment.len(),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    // Writers validate before mutating and roll back on error, so a poisoned
    // lock still guards consistent tables.
    fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::open(StoreOptions::default())
    }
}
