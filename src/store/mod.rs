use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderAccept, OrderStatusEvent};
use crate::models::tracking::DeliveryTracking;
use crate::models::user::UserAccount;

/// The transactional key/row store all coordination goes through. Rows
/// are the single source of truth; there is no lock service beyond the
/// per-entry lock a conditional update runs under.
///
/// Mutations follow read-current-state, validate, conditional-write: the
/// closure passed to `transition_order` / `update_tracking` validates
/// against the row it was handed and either mutates it or fails, all
/// while the entry guard is held. The second of two racing writers
/// observes the first one's state and loses at validation.
///
/// Lock order is orders -> order_events and orders -> order_accepts;
/// no path acquires them the other way around.
#[derive(Default)]
pub struct Store {
    orders: DashMap<Uuid, Order>,
    order_events: DashMap<Uuid, Vec<OrderStatusEvent>>,
    order_accepts: DashMap<Uuid, Vec<OrderAccept>>,
    trackings: DashMap<Uuid, DeliveryTracking>,
    users: DashMap<Uuid, UserAccount>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // orders
    // ------------------------------------------------------------------

    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        self.orders.get(&id).map(|entry| entry.value().clone())
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn orders_by_client(&self, client_id: Uuid) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.value().client_id == client_id)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    /// Snapshot used by scan-style jobs (the expiration sweep). The
    /// filter runs outside any lock; callers must re-validate through a
    /// conditional write before acting on a matched row.
    pub fn orders_matching<F>(&self, filter: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        self.orders
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Validate-and-mutate under the order's entry lock. The closure
    /// returns the audit event for the accepted transition; the row
    /// mutation and the event append commit together before the guard is
    /// released, or not at all.
    pub fn transition_order<F>(
        &self,
        id: Uuid,
        mutate: F,
    ) -> Result<(Order, OrderStatusEvent), AppError>
    where
        F: FnOnce(&mut Order) -> Result<OrderStatusEvent, AppError>,
    {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        let event = mutate(entry.value_mut())?;
        self.order_events
            .entry(id)
            .or_default()
            .push(event.clone());

        Ok((entry.value().clone(), event))
    }

    /// Read-only access under the order's entry lock.
    pub fn with_order<R, F>(&self, id: Uuid, read: F) -> Result<R, AppError>
    where
        F: FnOnce(&Order) -> Result<R, AppError>,
    {
        let entry = self
            .orders
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
        read(entry.value())
    }

    pub fn order_events(&self, order_id: Uuid) -> Vec<OrderStatusEvent> {
        self.order_events
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // provider votes
    // ------------------------------------------------------------------

    /// Insert a vote, enforcing the (order, provider) uniqueness
    /// constraint under the vote list's entry lock.
    pub fn record_accept(&self, accept: OrderAccept) -> Result<(), AppError> {
        let mut votes = self.order_accepts.entry(accept.order_id).or_default();

        if votes
            .iter()
            .any(|existing| existing.provider_id == accept.provider_id)
        {
            return Err(AppError::Conflict(
                "provider already voted on this order".to_string(),
            ));
        }

        votes.push(accept);
        Ok(())
    }

    pub fn accepts_for_order(&self, order_id: Uuid) -> Vec<OrderAccept> {
        self.order_accepts
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // delivery tracking
    // ------------------------------------------------------------------

    pub fn insert_tracking(&self, tracking: DeliveryTracking) {
        self.trackings.insert(tracking.id, tracking);
    }

    pub fn tracking(&self, id: Uuid) -> Option<DeliveryTracking> {
        self.trackings.get(&id).map(|entry| entry.value().clone())
    }

    pub fn tracking_count(&self) -> usize {
        self.trackings.len()
    }

    pub fn trackings_for_order(&self, order_id: Uuid) -> Vec<DeliveryTracking> {
        self.trackings
            .iter()
            .filter(|entry| entry.value().order_id == order_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn trackings_by_phone(&self, phone: &str) -> Vec<DeliveryTracking> {
        let mut legs: Vec<DeliveryTracking> = self
            .trackings
            .iter()
            .filter(|entry| entry.value().phone == phone)
            .map(|entry| entry.value().clone())
            .collect();
        legs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        legs
    }

    pub fn trackings_by_courier(&self, courier_id: Uuid) -> Vec<DeliveryTracking> {
        self.trackings
            .iter()
            .filter(|entry| entry.value().assigned_to == Some(courier_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// An abandoned `pending` offer is superseded by the next assignment
    /// attempt; remove it so a fresh row can be created.
    pub fn delete_pending_trackings(&self, order_id: Uuid) {
        use crate::models::tracking::TrackingStatus;

        self.trackings.retain(|_, tracking| {
            !(tracking.order_id == order_id && tracking.status == TrackingStatus::Pending)
        });
    }

    /// Validate-and-mutate under the tracking row's entry lock; same
    /// contract as `transition_order`.
    pub fn update_tracking<F>(&self, id: Uuid, mutate: F) -> Result<DeliveryTracking, AppError>
    where
        F: FnOnce(&mut DeliveryTracking) -> Result<(), AppError>,
    {
        let mut entry = self
            .trackings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("tracking {id} not found")))?;

        mutate(entry.value_mut())?;
        Ok(entry.value().clone())
    }

    // ------------------------------------------------------------------
    // accounts
    // ------------------------------------------------------------------

    pub fn insert_user(&self, user: UserAccount) {
        self.users.insert(user.id, user);
    }

    pub fn user(&self, id: Uuid) -> Option<UserAccount> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    pub fn user_by_phone(&self, phone: &str) -> Option<UserAccount> {
        self.users
            .iter()
            .find(|entry| entry.value().phone == phone)
            .map(|entry| entry.value().clone())
    }
}
