use common::ReservationId;
use serde::Serialize;
use store::Reservation;

/// Outcome of one expiry sweep, bucketed per reservation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseExpiredResult {
    pub checked_count: usize,
    pub released_count: usize,
    pub already_released_count: usize,
    pub not_found_count: usize,
    pub skipped_count: usize,
    /// Reservations this sweep moved out of `Held`.
    pub reservation_ids: Vec<ReservationId>,
    /// Reservations another caller had already settled, committed included.
    pub already_released_ids: Vec<ReservationId>,
    pub not_found_ids: Vec<ReservationId>,
    /// Reservations left untouched because of a transient failure.
    pub skipped_ids: Vec<ReservationId>,
    /// Sorted, distinct skus whose stock was returned.
    pub skus: Vec<String>,
}

impl ReleaseExpiredResult {
    pub fn new(checked_count: usize) -> Self {
        Self {
            checked_count,
            ..Self::default()
        }
    }

    pub fn record_released(&mut self, reservation: &Reservation) {
        self.released_count += 1;
        self.reservation_ids.push(reservation.id.clone());
        for sku in reservation.skus() {
            if let Err(pos) = self.skus.binary_search(&sku) {
                self.skus.insert(pos, sku);
            }
        }
    }

    pub fn record_already_released(&mut self, id: ReservationId) {
        self.already_released_count += 1;
        self.already_released_ids.push(id);
    }

    pub fn record_not_found(&mut self, id: ReservationId) {
        self.not_found_count += 1;
        self.not_found_ids.push(id);
    }

    pub fn record_skipped(&mut self, id: ReservationId) {
        self.skipped_count += 1;
        self.skipped_ids.push(id);
    }

    /// Reservations that reached a terminal outcome or were deferred.
    pub fn processed_count(&self) -> usize {
        self.released_count + self.already_released_count + self.skipped_count
    }
}
