//! Shipment state machine.
//!
//! `WAITING_FOR_RIDER -> RIDER_ACCEPTED -> PICKED_UP_EN_ROUTE -> DELIVERED`,
//! forward only. Every mutating operation runs as one unit of work holding the
//! shipment key and then the rider key, validates everything before staging a
//! write, and is retried only on transient store faults.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directory::{AccountDirectory, AddressDirectory};
use crate::engine::history;
use crate::engine::ledger;
use crate::engine::retry::RetryPolicy;
use crate::engine::tracker::LocationTracker;
use crate::error::{round_2dp, AppError, GateTarget};
use crate::geo::Geofence;
use crate::models::account::{Address, Role};
use crate::models::assignment::Assignment;
use crate::models::event::ShipmentEvent;
use crate::models::history::StatusHistoryEntry;
use crate::models::location::{PositionReport, RiderLocation};
use crate::models::shipment::{Shipment, ShipmentItem, ShipmentStatus};
use crate::observability::metrics::Metrics;
use crate::store::{LockKey, ShipmentFilter, ShipmentPage, Store};

const ACCEPT_NOTE: &str = "Rider accepted the job";
const PICKUP_NOTE: &str = "Rider picked up the parcel";
const DELIVER_NOTE: &str = "Delivered successfully";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub geofence: Geofence,
    pub retry: RetryPolicy,
    /// Let pickup start from `WAITING_FOR_RIDER` as well as `RIDER_ACCEPTED`.
    pub pickup_from_waiting: bool,
    pub event_buffer_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            geofence: Geofence::default(),
            retry: RetryPolicy::default(),
            pickup_from_waiting: false,
            event_buffer_size: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewShipment {
    pub title: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub pickup_address_id: Uuid,
    pub dropoff_address_id: Uuid,
    pub items: Vec<ShipmentItem>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub assignment_id: Uuid,
    pub shipment_id: Uuid,
    pub rider_id: Uuid,
    pub status: ShipmentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateOutcome {
    pub shipment_id: Uuid,
    pub status: ShipmentStatus,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentDetail {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub pickup: Option<Address>,
    pub dropoff: Option<Address>,
    /// Most recent assignment, kept after delivery.
    pub assignment: Option<Assignment>,
}

pub struct ShipmentEngine {
    store: Arc<Store>,
    accounts: Arc<dyn AccountDirectory>,
    addresses: Arc<dyn AddressDirectory>,
    tracker: Arc<LocationTracker>,
    metrics: Metrics,
    settings: EngineSettings,
    events_tx: broadcast::Sender<ShipmentEvent>,
}

impl ShipmentEngine {
    pub fn new(
        store: Arc<Store>,
        accounts: Arc<dyn AccountDirectory>,
        addresses: Arc<dyn AddressDirectory>,
        tracker: Arc<LocationTracker>,
        metrics: Metrics,
        settings: EngineSettings,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(settings.event_buffer_size.max(1));

        Self {
            store,
            accounts,
            addresses,
            tracker,
            metrics,
            settings,
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShipmentEvent> {
        self.events_tx.subscribe()
    }

    pub fn gate_meters(&self) -> f64 {
        self.settings.geofence.radius_m()
    }

    pub async fn create(&self, request: NewShipment) -> Result<Shipment, AppError> {
        self.instrumented("create", || self.create_once(&request)).await
    }

    pub async fn accept(
        &self,
        shipment_id: Uuid,
        rider_id: Uuid,
    ) -> Result<AcceptOutcome, AppError> {
        self.instrumented("accept", || self.accept_once(shipment_id, rider_id))
            .await
    }

    pub async fn pickup(&self, shipment_id: Uuid) -> Result<GateOutcome, AppError> {
        self.instrumented("pickup", || self.gated_once(shipment_id, GateTarget::Pickup))
            .await
    }

    pub async fn deliver(&self, shipment_id: Uuid) -> Result<GateOutcome, AppError> {
        self.instrumented("deliver", || self.gated_once(shipment_id, GateTarget::Dropoff))
            .await
    }

    /// Upserts the rider's latest position. Out-of-order reports are not
    /// detected: the last write wins.
    pub fn report_location(
        &self,
        rider_id: Uuid,
        report: PositionReport,
        shipment_id: Option<Uuid>,
    ) -> Result<RiderLocation, AppError> {
        let result = self.report_location_inner(rider_id, report, shipment_id);
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        self.metrics
            .location_reports_total
            .with_label_values(&[outcome])
            .inc();
        result
    }

    pub fn active_assignment_for(&self, rider_id: Uuid) -> Option<Assignment> {
        self.store.active_assignment_for_rider(rider_id)
    }

    pub fn latest_location(&self, rider_id: Uuid) -> Result<RiderLocation, AppError> {
        self.tracker
            .latest(rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} has no reported location")))
    }

    pub fn rider_location_for_shipment(
        &self,
        shipment_id: Uuid,
    ) -> Result<RiderLocation, AppError> {
        let assignment = self
            .store
            .active_assignment_for_shipment(shipment_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("no rider is holding shipment {shipment_id}"))
            })?;
        self.latest_location(assignment.rider_id)
    }

    pub fn get(&self, shipment_id: Uuid) -> Result<ShipmentDetail, AppError> {
        let shipment = self.find_shipment(shipment_id)?;

        Ok(ShipmentDetail {
            pickup: self.addresses.address(shipment.pickup_address_id),
            dropoff: self.addresses.address(shipment.dropoff_address_id),
            assignment: self.store.assignments_for_shipment(shipment_id).pop(),
            shipment,
        })
    }

    pub fn list(&self, filter: ShipmentFilter) -> ShipmentPage {
        self.store.list_shipments(filter)
    }

    pub fn history(&self, shipment_id: Uuid) -> Result<Vec<StatusHistoryEntry>, AppError> {
        self.find_shipment(shipment_id)?;
        Ok(self.store.history_for(shipment_id))
    }

    async fn instrumented<T, F, Fut>(
        &self,
        operation: &'static str,
        attempt: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let started = Instant::now();
        let result = self
            .settings
            .retry
            .run(operation, attempt, |_| {
                self.metrics
                    .transition_retries_total
                    .with_label_values(&[operation])
                    .inc();
            })
            .await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        self.metrics
            .observe_transition(operation, outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn create_once(&self, request: &NewShipment) -> Result<Shipment, AppError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if request.sender_id == request.receiver_id {
            return Err(AppError::Validation(
                "sender and receiver must be different accounts".to_string(),
            ));
        }

        let items = normalize_items(&request.items);
        if items.is_empty() {
            return Err(AppError::Validation(
                "at least one item with a name is required".to_string(),
            ));
        }

        self.accounts
            .account(request.sender_id)
            .ok_or_else(|| AppError::NotFound(format!("sender {} not found", request.sender_id)))?;
        self.accounts.account(request.receiver_id).ok_or_else(|| {
            AppError::NotFound(format!("receiver {} not found", request.receiver_id))
        })?;

        let pickup = self.owned_address(
            request.pickup_address_id,
            request.sender_id,
            "pickup",
            "sender",
        )?;
        let dropoff = self.owned_address(
            request.dropoff_address_id,
            request.receiver_id,
            "dropoff",
            "receiver",
        )?;

        let now = Utc::now();
        let shipment = Shipment {
            id: Uuid::new_v4(),
            title: title.to_string(),
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            pickup_address_id: pickup.id,
            dropoff_address_id: dropoff.id,
            items,
            note: request.note.clone(),
            status: ShipmentStatus::WaitingForRider,
            created_at: now,
            status_updated_at: now,
        };

        let mut uow = self.store.begin(&[LockKey::Shipment(shipment.id)]).await?;
        uow.put_shipment(shipment.clone());
        history::record(
            &mut uow,
            shipment.id,
            ShipmentStatus::WaitingForRider,
            shipment.sender_id,
            shipment.note.as_deref(),
        );
        uow.commit()?;

        info!(shipment_id = %shipment.id, sender_id = %shipment.sender_id, "shipment created");
        self.publish(shipment.id, shipment.status, None, now);

        Ok(shipment)
    }

    async fn accept_once(
        &self,
        shipment_id: Uuid,
        rider_id: Uuid,
    ) -> Result<AcceptOutcome, AppError> {
        let mut uow = self
            .store
            .begin(&[LockKey::Shipment(shipment_id), LockKey::Rider(rider_id)])
            .await?;

        let rider = self
            .accounts
            .account(rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;
        if rider.role != Role::Rider {
            return Err(AppError::Forbidden(format!("account {rider_id} is not a rider")));
        }

        let mut shipment = uow
            .shipment(shipment_id)
            .ok_or_else(|| AppError::NotFound(format!("shipment {shipment_id} not found")))?;
        if shipment.status != ShipmentStatus::WaitingForRider {
            warn!(
                shipment_id = %shipment_id,
                rider_id = %rider_id,
                status = %shipment.status,
                "accept rejected"
            );
            return Err(AppError::Conflict(format!(
                "shipment {shipment_id} is {}, not waiting for a rider",
                shipment.status
            )));
        }

        let now = Utc::now();
        let assignment =
            ledger::try_claim(&mut uow, shipment_id, rider_id, now).inspect_err(|err| {
                warn!(
                    shipment_id = %shipment_id,
                    rider_id = %rider_id,
                    error = %err,
                    "accept rejected"
                );
            })?;

        advance(&mut shipment, ShipmentStatus::RiderAccepted, now);
        uow.put_shipment(shipment);
        history::record(
            &mut uow,
            shipment_id,
            ShipmentStatus::RiderAccepted,
            rider_id,
            Some(ACCEPT_NOTE),
        );
        uow.commit()?;

        info!(
            shipment_id = %shipment_id,
            rider_id = %rider_id,
            assignment_id = %assignment.id,
            "rider accepted shipment"
        );
        self.metrics.active_assignments.inc();
        self.publish(shipment_id, ShipmentStatus::RiderAccepted, Some(rider_id), now);

        Ok(AcceptOutcome {
            assignment_id: assignment.id,
            shipment_id,
            rider_id,
            status: ShipmentStatus::RiderAccepted,
        })
    }

    /// Pickup and delivery: same shape, different source state, target
    /// address and ledger step.
    async fn gated_once(
        &self,
        shipment_id: Uuid,
        target: GateTarget,
    ) -> Result<GateOutcome, AppError> {
        let next = match target {
            GateTarget::Pickup => ShipmentStatus::PickedUpEnRoute,
            GateTarget::Dropoff => ShipmentStatus::Delivered,
        };

        let mut uow = self.store.begin(&[LockKey::Shipment(shipment_id)]).await?;

        let mut shipment = uow
            .shipment(shipment_id)
            .ok_or_else(|| AppError::NotFound(format!("shipment {shipment_id} not found")))?;
        let assignment = uow
            .active_assignment_for_shipment(shipment_id)
            .ok_or_else(|| {
                AppError::Conflict(format!("no rider is holding shipment {shipment_id}"))
            })?;
        uow.lock_rider(assignment.rider_id).await?;

        if !self.may_enter(shipment.status, next) {
            warn!(
                shipment_id = %shipment_id,
                status = %shipment.status,
                next = %next,
                "transition rejected"
            );
            return Err(AppError::Conflict(format!(
                "shipment {shipment_id} is {}, cannot move to {next}",
                shipment.status
            )));
        }

        let location = self.tracker.latest(assignment.rider_id).ok_or_else(|| {
            AppError::PreconditionFailed(format!(
                "rider {} has not reported a location yet",
                assignment.rider_id
            ))
        })?;

        let address_id = match target {
            GateTarget::Pickup => shipment.pickup_address_id,
            GateTarget::Dropoff => shipment.dropoff_address_id,
        };
        let address = self
            .addresses
            .address(address_id)
            .ok_or_else(|| AppError::NotFound(format!("{target} address {address_id} not found")))?;

        let gate = self.settings.geofence.check(&location.point(), &address.location);
        if !gate.within {
            warn!(
                shipment_id = %shipment_id,
                rider_id = %assignment.rider_id,
                distance_m = gate.distance_m,
                gate_m = self.gate_meters(),
                gate_target = %target,
                "rider outside geofence"
            );
            return Err(AppError::GeofenceViolation {
                target,
                distance_m: gate.distance_m,
                gate_m: self.gate_meters(),
            });
        }

        let now = Utc::now();
        let note = match target {
            GateTarget::Pickup => {
                ledger::mark_picked_up(&mut uow, assignment.id, now)?;
                PICKUP_NOTE
            }
            GateTarget::Dropoff => {
                ledger::mark_delivered(&mut uow, assignment.id, now)?;
                DELIVER_NOTE
            }
        };

        advance(&mut shipment, next, now);
        uow.put_shipment(shipment);
        history::record(&mut uow, shipment_id, next, assignment.rider_id, Some(note));
        uow.commit()?;

        info!(
            shipment_id = %shipment_id,
            rider_id = %assignment.rider_id,
            distance_m = gate.distance_m,
            status = %next,
            "shipment advanced"
        );
        if next == ShipmentStatus::Delivered {
            self.metrics.active_assignments.dec();
        }
        self.publish(shipment_id, next, Some(assignment.rider_id), now);

        Ok(GateOutcome {
            shipment_id,
            status: next,
            distance_m: round_2dp(gate.distance_m),
        })
    }

    fn may_enter(&self, current: ShipmentStatus, next: ShipmentStatus) -> bool {
        if current.next() == Some(next) {
            return true;
        }
        self.settings.pickup_from_waiting
            && current == ShipmentStatus::WaitingForRider
            && next == ShipmentStatus::PickedUpEnRoute
    }

    fn report_location_inner(
        &self,
        rider_id: Uuid,
        report: PositionReport,
        shipment_id: Option<Uuid>,
    ) -> Result<RiderLocation, AppError> {
        let point = report.validate().inspect_err(|err| {
            debug!(rider_id = %rider_id, error = %err, "location report rejected");
        })?;

        let rider = self
            .accounts
            .account(rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;
        if rider.role != Role::Rider {
            return Err(AppError::Forbidden(format!("account {rider_id} is not a rider")));
        }

        if let Some(shipment_id) = shipment_id {
            self.find_shipment(shipment_id)?;
            let holds_job = self
                .store
                .active_assignment_for_shipment(shipment_id)
                .is_some_and(|assignment| assignment.rider_id == rider_id);
            if !holds_job {
                return Err(AppError::Conflict(format!(
                    "rider {rider_id} has no active job for shipment {shipment_id}"
                )));
            }
        }

        let location = self
            .tracker
            .report(rider_id, point, report.heading_deg, report.speed_mps);
        debug!(rider_id = %rider_id, lat = location.lat, lng = location.lng, "location updated");

        Ok(location)
    }

    fn find_shipment(&self, shipment_id: Uuid) -> Result<Shipment, AppError> {
        self.store
            .shipment(shipment_id)
            .ok_or_else(|| AppError::NotFound(format!("shipment {shipment_id} not found")))
    }

    fn owned_address(
        &self,
        address_id: Uuid,
        owner_id: Uuid,
        leg: &str,
        owner_role: &str,
    ) -> Result<Address, AppError> {
        let address = self
            .addresses
            .address(address_id)
            .ok_or_else(|| AppError::NotFound(format!("{leg} address {address_id} not found")))?;
        if address.owner_id != owner_id {
            return Err(AppError::Validation(format!(
                "{leg} address {address_id} does not belong to the {owner_role}"
            )));
        }
        Ok(address)
    }

    fn publish(
        &self,
        shipment_id: Uuid,
        status: ShipmentStatus,
        rider_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) {
        let _ = self.events_tx.send(ShipmentEvent {
            shipment_id,
            status,
            rider_id,
            at,
        });
    }
}

fn advance(shipment: &mut Shipment, status: ShipmentStatus, now: DateTime<Utc>) {
    shipment.status = status;
    shipment.status_updated_at = now;
}

fn normalize_items(items: &[ShipmentItem]) -> Vec<ShipmentItem> {
    items
        .iter()
        .filter_map(|item| {
            let name = item.name.trim();
            if name.is_empty() {
                return None;
            }
            Some(ShipmentItem {
                name: name.to_string(),
                qty: item.qty.max(1),
                note: item.note.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::geo::{GeoPoint, EARTH_RADIUS_M};
    use crate::models::account::Account;

    const PICKUP: (f64, f64) = (13.7563, 100.5018);
    const DROPOFF: (f64, f64) = (13.7650, 100.5380);

    struct Fixture {
        engine: ShipmentEngine,
        store: Arc<Store>,
        directory: Arc<MemoryDirectory>,
        sender: Uuid,
        receiver: Uuid,
        rider: Uuid,
        pickup_address: Uuid,
        dropoff_address: Uuid,
    }

    fn account(directory: &MemoryDirectory, role: Role) -> Uuid {
        let account = Account {
            id: Uuid::new_v4(),
            name: format!("{role:?}"),
            role,
            created_at: Utc::now(),
        };
        let id = account.id;
        directory.insert_account(account);
        id
    }

    fn address(directory: &MemoryDirectory, owner_id: Uuid, (lat, lng): (f64, f64)) -> Uuid {
        let address = Address {
            id: Uuid::new_v4(),
            owner_id,
            label: "door".to_string(),
            location: GeoPoint::new(lat, lng),
        };
        let id = address.id;
        directory.insert_address(address);
        id
    }

    fn fixture(settings: EngineSettings) -> Fixture {
        let store = Arc::new(Store::default());
        let directory = Arc::new(MemoryDirectory::new());
        let sender = account(&directory, Role::Member);
        let receiver = account(&directory, Role::Member);
        let rider = account(&directory, Role::Rider);
        let pickup_address = address(&directory, sender, PICKUP);
        let dropoff_address = address(&directory, receiver, DROPOFF);

        let engine = ShipmentEngine::new(
            store.clone(),
            directory.clone(),
            directory.clone(),
            Arc::new(LocationTracker::new()),
            Metrics::new(),
            EngineSettings {
                retry: RetryPolicy::none(),
                ..settings
            },
        );

        Fixture {
            engine,
            store,
            directory,
            sender,
            receiver,
            rider,
            pickup_address,
            dropoff_address,
        }
    }

    fn new_shipment(f: &Fixture) -> NewShipment {
        NewShipment {
            title: "Documents".to_string(),
            sender_id: f.sender,
            receiver_id: f.receiver,
            pickup_address_id: f.pickup_address,
            dropoff_address_id: f.dropoff_address,
            items: vec![ShipmentItem {
                name: "envelope".to_string(),
                qty: 0,
                note: None,
            }],
            note: Some("handle with care".to_string()),
        }
    }

    /// A report `meters` due north of `origin`.
    fn north_of(origin: (f64, f64), meters: f64) -> PositionReport {
        PositionReport {
            lat: origin.0 + (meters / EARTH_RADIUS_M).to_degrees(),
            lng: origin.1,
            heading_deg: None,
            speed_mps: None,
        }
    }

    #[tokio::test]
    async fn full_lifecycle_records_history_and_frees_the_rider() {
        let f = fixture(EngineSettings::default());
        let shipment = f.engine.create(new_shipment(&f)).await.unwrap();
        assert_eq!(shipment.status, ShipmentStatus::WaitingForRider);
        assert_eq!(shipment.items[0].qty, 1);

        let accepted = f.engine.accept(shipment.id, f.rider).await.unwrap();
        assert_eq!(accepted.status, ShipmentStatus::RiderAccepted);
        assert_eq!(
            f.engine.active_assignment_for(f.rider).map(|a| a.shipment_id),
            Some(shipment.id)
        );

        f.engine
            .report_location(f.rider, north_of(PICKUP, 5.0), Some(shipment.id))
            .unwrap();
        let picked = f.engine.pickup(shipment.id).await.unwrap();
        assert_eq!(picked.status, ShipmentStatus::PickedUpEnRoute);
        assert!((picked.distance_m - 5.0).abs() < 0.05);

        f.engine
            .report_location(f.rider, north_of(DROPOFF, 0.0), None)
            .unwrap();
        let delivered = f.engine.deliver(shipment.id).await.unwrap();
        assert_eq!(delivered.status, ShipmentStatus::Delivered);
        assert!(f.engine.active_assignment_for(f.rider).is_none());

        let history = f.engine.history(shipment.id).unwrap();
        let statuses: Vec<ShipmentStatus> = history.iter().map(|entry| entry.status).collect();
        assert_eq!(
            statuses,
            vec![
                ShipmentStatus::WaitingForRider,
                ShipmentStatus::RiderAccepted,
                ShipmentStatus::PickedUpEnRoute,
                ShipmentStatus::Delivered,
            ]
        );
        assert_eq!(history[0].actor_user_id, f.sender);
        assert_eq!(history[1].note.as_deref(), Some(ACCEPT_NOTE));
        assert_eq!(history[3].actor_user_id, f.rider);

        let detail = f.engine.get(shipment.id).unwrap();
        let assignment = detail.assignment.unwrap();
        assert!(assignment.picked_up_at.is_some());
        assert!(assignment.delivered_at.is_some());
        assert!(assignment.active_owner.is_none());
        assert_eq!(f.store.assignment(assignment.id).map(|a| a.rider_id), Some(f.rider));
    }

    #[tokio::test]
    async fn accept_checks_rider_and_shipment() {
        let f = fixture(EngineSettings::default());
        let shipment = f.engine.create(new_shipment(&f)).await.unwrap();

        assert!(matches!(
            f.engine.accept(shipment.id, Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.engine.accept(shipment.id, f.sender).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            f.engine.accept(Uuid::new_v4(), f.rider).await,
            Err(AppError::NotFound(_))
        ));

        f.engine.accept(shipment.id, f.rider).await.unwrap();
        assert!(matches!(
            f.engine.accept(shipment.id, f.rider).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(f.engine.history(shipment.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pickup_needs_a_reported_location() {
        let f = fixture(EngineSettings::default());
        let shipment = f.engine.create(new_shipment(&f)).await.unwrap();
        f.engine.accept(shipment.id, f.rider).await.unwrap();

        assert!(matches!(
            f.engine.pickup(shipment.id).await,
            Err(AppError::PreconditionFailed(_))
        ));
        assert_eq!(
            f.store.shipment(shipment.id).map(|s| s.status),
            Some(ShipmentStatus::RiderAccepted)
        );
    }

    #[tokio::test]
    async fn geofence_rejects_just_outside_and_admits_just_inside() {
        let f = fixture(EngineSettings::default());
        let shipment = f.engine.create(new_shipment(&f)).await.unwrap();
        f.engine.accept(shipment.id, f.rider).await.unwrap();

        f.engine
            .report_location(f.rider, north_of(PICKUP, 20.1), None)
            .unwrap();
        match f.engine.pickup(shipment.id).await {
            Err(AppError::GeofenceViolation {
                target, distance_m, ..
            }) => {
                assert_eq!(target, GateTarget::Pickup);
                assert!((distance_m - 20.1).abs() < 0.01);
            }
            other => panic!("expected geofence violation, got {other:?}"),
        }

        f.engine
            .report_location(f.rider, north_of(PICKUP, 19.9), None)
            .unwrap();
        assert!(f.engine.pickup(shipment.id).await.is_ok());
    }

    #[tokio::test]
    async fn deliver_before_pickup_is_a_conflict() {
        let f = fixture(EngineSettings::default());
        let shipment = f.engine.create(new_shipment(&f)).await.unwrap();

        assert!(matches!(
            f.engine.deliver(shipment.id).await,
            Err(AppError::Conflict(_))
        ));

        f.engine.accept(shipment.id, f.rider).await.unwrap();
        f.engine
            .report_location(f.rider, north_of(DROPOFF, 1.0), None)
            .unwrap();
        assert!(matches!(
            f.engine.deliver(shipment.id).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn location_report_for_a_foreign_job_is_rejected() {
        let f = fixture(EngineSettings::default());
        let shipment = f.engine.create(new_shipment(&f)).await.unwrap();

        assert!(matches!(
            f.engine
                .report_location(f.rider, north_of(PICKUP, 1.0), Some(shipment.id)),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            f.engine
                .report_location(f.rider, north_of(PICKUP, 1.0), Some(Uuid::new_v4())),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.engine.report_location(f.sender, north_of(PICKUP, 1.0), None),
            Err(AppError::Forbidden(_))
        ));
        assert!(f.engine.latest_location(f.rider).is_err());
    }

    #[test]
    fn repeated_identical_reports_are_harmless() {
        let f = fixture(EngineSettings::default());
        let first = f
            .engine
            .report_location(f.rider, north_of(PICKUP, 2.0), None)
            .unwrap();
        let second = f
            .engine
            .report_location(f.rider, north_of(PICKUP, 2.0), None)
            .unwrap();

        assert_eq!(first.point(), second.point());
        assert_eq!(f.engine.latest_location(f.rider).unwrap().point(), first.point());
    }

    #[tokio::test]
    async fn create_validates_input() {
        let f = fixture(EngineSettings::default());

        let mut blank_title = new_shipment(&f);
        blank_title.title = "   ".to_string();
        assert!(matches!(
            f.engine.create(blank_title).await,
            Err(AppError::Validation(_))
        ));

        let mut no_items = new_shipment(&f);
        no_items.items[0].name = " ".to_string();
        assert!(matches!(
            f.engine.create(no_items).await,
            Err(AppError::Validation(_))
        ));

        let mut self_send = new_shipment(&f);
        self_send.receiver_id = f.sender;
        assert!(matches!(
            f.engine.create(self_send).await,
            Err(AppError::Validation(_))
        ));

        let mut foreign_pickup = new_shipment(&f);
        foreign_pickup.pickup_address_id = f.dropoff_address;
        assert!(matches!(
            f.engine.create(foreign_pickup).await,
            Err(AppError::Validation(_))
        ));

        assert_eq!(f.store.counts().shipments, 0);
        assert_eq!(f.directory.account_count(), 3);
    }

    #[test]
    fn waiting_to_picked_up_only_with_the_tolerance_flag() {
        let strict = fixture(EngineSettings::default());
        assert!(!strict
            .engine
            .may_enter(ShipmentStatus::WaitingForRider, ShipmentStatus::PickedUpEnRoute));
        assert!(strict
            .engine
            .may_enter(ShipmentStatus::RiderAccepted, ShipmentStatus::PickedUpEnRoute));

        let tolerant = fixture(EngineSettings {
            pickup_from_waiting: true,
            ..EngineSettings::default()
        });
        assert!(tolerant
            .engine
            .may_enter(ShipmentStatus::WaitingForRider, ShipmentStatus::PickedUpEnRoute));
        assert!(!tolerant
            .engine
            .may_enter(ShipmentStatus::WaitingForRider, ShipmentStatus::Delivered));
    }

    #[tokio::test]
    async fn committed_transitions_are_broadcast() {
        let f = fixture(EngineSettings::default());
        let mut events = f.engine.subscribe();

        let shipment = f.engine.create(new_shipment(&f)).await.unwrap();
        f.engine.accept(shipment.id, f.rider).await.unwrap();
        let _ = f.engine.accept(shipment.id, f.rider).await;

        let created = events.recv().await.unwrap();
        assert_eq!(created.status, ShipmentStatus::WaitingForRider);
        let accepted = events.recv().await.unwrap();
        assert_eq!(accepted.rider_id, Some(f.rider));
        assert!(events.try_recv().is_err());
    }
}
