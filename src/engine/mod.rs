mod code;
mod conflict;
mod error;
mod inventory;
mod pricing;
mod reporting;
mod reserve;

pub use conflict::now_ms;
pub use error::{EngineError, Result};
pub use pricing::quote;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::limits;
use crate::model::*;
use crate::notify::{NotificationSink, NotifyHub};
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(crate) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub rooms: DashMap<Ulid, SharedRoomState>,
    pub accommodations: DashMap<Ulid, Accommodation>,
    pub users: DashMap<Ulid, UserAccount>,
    /// email → user id, for identity resolution.
    pub(crate) emails: DashMap<String, Ulid>,
    /// Reverse lookup: entity (availability record / booking) id → room id.
    pub(crate) entity_to_room: DashMap<Ulid, Ulid>,
    /// Claimed booking codes → booking id. Uniqueness is enforced here.
    pub(crate) codes: DashMap<String, Ulid>,
    pub(crate) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutating ops hold this shared for their append + apply; compaction
    /// holds it exclusive across snapshot + swap, so a committed event is
    /// never flushed only to the discarded file.
    pub(crate) compact_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
    pub(crate) sink: Option<Arc<dyn NotificationSink>>,
}

impl Engine {
    pub fn open(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::open_with_sink(wal_path, notify, None)
    }

    pub fn open_with_sink(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        sink: Option<Arc<dyn NotificationSink>>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            accommodations: DashMap::new(),
            users: DashMap::new(),
            emails: DashMap::new(),
            entity_to_room: DashMap::new(),
            codes: DashMap::new(),
            wal_tx,
            compact_gate: RwLock::new(()),
            notify,
            sink,
        };

        tracing::info!(events = events.len(), path = %wal_path.display(), "replaying WAL");
        for event in &events {
            engine.replay_event(event);
        }
        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(engine.rooms.len() as f64);

        Ok(engine)
    }

    /// Rebuild state from one replayed event. We're the sole owner of the
    /// room Arcs here, so try_write always succeeds instantly (no
    /// contention). Never use blocking_write because replay may run inside
    /// an async context.
    fn replay_event(&self, event: &Event) {
        match event {
            Event::UserRegistered { .. }
            | Event::AccommodationCreated { .. }
            | Event::RoomCreated { .. }
            | Event::RoomDeleted { .. } => self.apply_global(event),
            Event::BookingRescheduled {
                id,
                old_room_id,
                room_id,
                range,
                guests,
                total_price,
            } => {
                let Some(old_arc) = self.room(old_room_id) else {
                    return;
                };
                let mut old = old_arc.try_write().expect("replay: uncontended write");
                if old_room_id == room_id {
                    self.apply_reschedule(&mut old, None, *id, *range, *guests, *total_price);
                } else if let Some(new_arc) = self.room(room_id) {
                    let mut new = new_arc.try_write().expect("replay: uncontended write");
                    self.apply_reschedule(
                        &mut old,
                        Some(&mut new),
                        *id,
                        *range,
                        *guests,
                        *total_price,
                    );
                }
            }
            other => {
                if let Some(room_id) = event_room_id(other)
                    && let Some(entry) = self.rooms.get(&room_id)
                {
                    let rs_arc = entry.clone();
                    drop(entry);
                    let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                    self.apply_to_room(&mut guard, other);
                }
            }
        }
    }

    /// Apply an event that lives above any single room: user and
    /// accommodation registries, room creation/removal.
    fn apply_global(&self, event: &Event) {
        match event {
            Event::UserRegistered {
                id,
                name,
                email,
                role,
            } => {
                self.users.insert(
                    *id,
                    UserAccount {
                        id: *id,
                        name: name.clone(),
                        email: email.clone(),
                        role: *role,
                    },
                );
                self.emails.insert(email.clone(), *id);
            }
            Event::AccommodationCreated {
                id,
                host_id,
                name,
                location,
            } => {
                self.accommodations.insert(
                    *id,
                    Accommodation {
                        id: *id,
                        host_id: *host_id,
                        name: name.clone(),
                        location: location.clone(),
                    },
                );
            }
            Event::RoomCreated {
                id,
                accommodation_id,
                room_type,
                capacity,
                beds,
                base_price,
            } => {
                let rs = RoomState::new(
                    *id,
                    *accommodation_id,
                    room_type.clone(),
                    *capacity,
                    *beds,
                    *base_price,
                );
                self.rooms.insert(*id, Arc::new(RwLock::new(rs)));
            }
            Event::RoomDeleted { id } => {
                if let Some((_, rs_arc)) = self.rooms.remove(id) {
                    let rs = rs_arc.try_read().expect("replay: uncontended read");
                    for record in &rs.records {
                        self.entity_to_room.remove(&record.id);
                    }
                    for booking in &rs.bookings {
                        self.entity_to_room.remove(&booking.id);
                        self.codes.remove(&booking.code);
                    }
                }
                self.notify.remove(id);
            }
            _ => unreachable!("room-scoped event routed to apply_global"),
        }
    }

    /// Apply a room-scoped event to a RoomState (no locking — caller holds
    /// the write lock).
    fn apply_to_room(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated {
                room_type,
                capacity,
                beds,
                base_price,
                ..
            } => {
                rs.room_type = room_type.clone();
                rs.capacity = *capacity;
                rs.beds = *beds;
                rs.base_price = *base_price;
            }
            Event::AvailabilityOpened {
                id,
                room_id,
                date,
                price,
            } => {
                rs.insert_record(AvailabilityRecord {
                    id: *id,
                    date: *date,
                    price: *price,
                    status: AvailabilityStatus::Available,
                });
                self.entity_to_room.insert(*id, *room_id);
            }
            Event::AvailabilityRepriced { id, price, .. } => {
                if let Some(record) = rs.record_by_id_mut(*id) {
                    record.price = *price;
                }
            }
            Event::AvailabilityClosed { id, .. } => {
                rs.remove_record(*id);
                self.entity_to_room.remove(id);
            }
            Event::AvailabilityStatusSet { id, status, .. } => {
                if let Some(record) = rs.record_by_id_mut(*id) {
                    record.status = *status;
                }
            }
            Event::BookingCreated {
                id,
                room_id,
                user_id,
                range,
                guests,
                code,
                total_price,
                created_at,
            } => {
                rs.bookings.push(Booking {
                    id: *id,
                    code: code.clone(),
                    user_id: *user_id,
                    room_id: *room_id,
                    range: *range,
                    guests: *guests,
                    status: BookingStatus::Pending,
                    total_price: *total_price,
                    created_at: *created_at,
                });
                rs.set_status_in_range(range, AvailabilityStatus::NotAvailable);
                rs.is_available = false;
                self.entity_to_room.insert(*id, *room_id);
                self.codes.insert(code.clone(), *id);
            }
            Event::BookingStatusChanged { id, status, .. } => {
                let range = match rs.booking_mut(*id) {
                    Some(booking) => {
                        let was_active = booking.status.is_active();
                        booking.status = *status;
                        (was_active && *status == BookingStatus::Cancelled)
                            .then_some(booking.range)
                    }
                    None => None,
                };
                // Cancellation frees the held dates; completion keeps the
                // (now past) rows as-is.
                if let Some(range) = range {
                    rs.release_range(&range);
                }
                rs.refresh_available_flag();
            }
            Event::BookingDeleted { id, .. } => {
                if let Some(booking) = rs.take_booking(*id) {
                    // Only an active booking still holds its dates; freeing
                    // a closed one could clobber another booking's hold on
                    // the same range.
                    if booking.status.is_active() {
                        rs.release_range(&booking.range);
                    }
                    rs.refresh_available_flag();
                    self.entity_to_room.remove(id);
                    self.codes.remove(&booking.code);
                }
            }
            _ => unreachable!("global event routed to apply_to_room"),
        }
    }

    /// Move a booking: release the old range, retarget, hold the new range.
    /// `new` is None for a same-room move; both guards are held by the
    /// caller, so the release and the hold commit as one step.
    fn apply_reschedule(
        &self,
        old: &mut RoomState,
        new: Option<&mut RoomState>,
        booking_id: Ulid,
        range: DateRange,
        guests: u32,
        total_price: f64,
    ) {
        let Some(mut booking) = old.take_booking(booking_id) else {
            return;
        };
        old.release_range(&booking.range);
        old.refresh_available_flag();

        let target = match new {
            Some(new) => new,
            None => old,
        };
        booking.room_id = target.id;
        booking.range = range;
        booking.guests = guests;
        booking.total_price = total_price;
        target.set_status_in_range(&range, AvailabilityStatus::NotAvailable);
        target.is_available = false;
        self.entity_to_room.insert(booking_id, target.id);
        target.bookings.push(booking);
    }

    // ── WAL plumbing ─────────────────────────────────────

    /// Write event to WAL via the background group-commit writer. I/O
    /// failures are retried a bounded number of times before surfacing.
    pub(crate) async fn wal_append(&self, event: &Event) -> Result<()> {
        let mut last_err = String::new();
        for attempt in 1..=limits::MAX_STORAGE_RETRIES {
            let (tx, rx) = oneshot::channel();
            self.wal_tx
                .send(WalCommand::Append {
                    event: event.clone(),
                    response: tx,
                })
                .await
                .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
            match rx.await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => last_err = e.to_string(),
                Err(_) => return Err(EngineError::Storage("WAL writer dropped response".into())),
            }
            tracing::warn!(attempt, error = %last_err, "WAL append failed");
        }
        Err(EngineError::Storage(last_err))
    }

    /// WAL-append + apply + notify in one call, for room-scoped events.
    /// Nothing is applied if the append fails.
    pub(crate) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<()> {
        self.wal_append(event).await?;
        self.apply_to_room(rs, event);
        self.notify.send(room_id, event);
        Ok(())
    }

    /// WAL-append + apply for registry-level events.
    pub(crate) async fn persist_global(&self, event: &Event) -> Result<()> {
        self.wal_append(event).await?;
        self.apply_global(event);
        Ok(())
    }

    // ── Lookup helpers ───────────────────────────────────

    pub fn room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_room.get(entity_id).map(|e| *e.value())
    }

    /// A room can be deleted while another call waits on its lock; every
    /// write path rechecks map membership once the guard is held.
    pub(crate) fn room_live(&self, room_id: &Ulid) -> Result<()> {
        if self.rooms.contains_key(room_id) {
            Ok(())
        } else {
            Err(EngineError::RoomNotFound(*room_id))
        }
    }

    /// Lookup entity → room, get room, acquire write lock. `missing` names
    /// the error for an unknown entity (booking vs. availability record).
    pub(crate) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
        missing: fn(Ulid) -> EngineError,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>)> {
        let room_id = self
            .room_for_entity(entity_id)
            .ok_or_else(|| missing(*entity_id))?;
        let rs = self.room(&room_id).ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.write_owned().await;
        self.room_live(&room_id)?;
        Ok((room_id, guard))
    }

    // ── Compaction ───────────────────────────────────────

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Rewrite the WAL as the event history that recreates current state.
    /// Holds the compact gate exclusively across snapshot + swap: every
    /// already-committed event is in the snapshot, and every later one is
    /// appended to the rewritten file, never to the discarded one.
    pub async fn compact_wal(&self) -> Result<()> {
        let _gate = self.compact_gate.write().await;
        let events = self.snapshot_events().await;
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        tracing::info!(events = count, "WAL compacted");
        Ok(())
    }

    /// Events that, replayed in order, reproduce current state exactly:
    /// registries first, then per room the ledger rows (opened at their
    /// current price), the booking history with status changes, and
    /// finally one status pin per row. Booking replay flips rows by date
    /// range, which would misstate a row opened while a stay already
    /// held its date; the pins overwrite every row with its live status.
    async fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();

        for user in self.users.iter() {
            events.push(Event::UserRegistered {
                id: user.id,
                name: user.name.clone(),
                email: user.email.clone(),
                role: user.role,
            });
        }
        for acc in self.accommodations.iter() {
            events.push(Event::AccommodationCreated {
                id: acc.id,
                host_id: acc.host_id,
                name: acc.name.clone(),
                location: acc.location.clone(),
            });
        }

        let room_arcs: Vec<SharedRoomState> =
            self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs_arc in room_arcs {
            let rs = rs_arc.read().await;
            events.push(Event::RoomCreated {
                id: rs.id,
                accommodation_id: rs.accommodation_id,
                room_type: rs.room_type.clone(),
                capacity: rs.capacity,
                beds: rs.beds,
                base_price: rs.base_price,
            });
            for record in &rs.records {
                events.push(Event::AvailabilityOpened {
                    id: record.id,
                    room_id: rs.id,
                    date: record.date,
                    price: record.price,
                });
            }
            for booking in &rs.bookings {
                events.push(Event::BookingCreated {
                    id: booking.id,
                    room_id: rs.id,
                    user_id: booking.user_id,
                    range: booking.range,
                    guests: booking.guests,
                    code: booking.code.clone(),
                    total_price: booking.total_price,
                    created_at: booking.created_at,
                });
                if booking.status != BookingStatus::Pending {
                    events.push(Event::BookingStatusChanged {
                        id: booking.id,
                        room_id: rs.id,
                        status: booking.status,
                    });
                }
            }
            for record in &rs.records {
                events.push(Event::AvailabilityStatusSet {
                    id: record.id,
                    room_id: rs.id,
                    status: record.status,
                });
            }
        }

        events
    }
}

/// Extract the room id from a room-scoped event.
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::AvailabilityOpened { room_id, .. }
        | Event::AvailabilityRepriced { room_id, .. }
        | Event::AvailabilityClosed { room_id, .. }
        | Event::AvailabilityStatusSet { room_id, .. }
        | Event::BookingCreated { room_id, .. }
        | Event::BookingStatusChanged { room_id, .. }
        | Event::BookingDeleted { room_id, .. } => Some(*room_id),
        Event::RoomUpdated { id, .. } => Some(*id),
        Event::UserRegistered { .. }
        | Event::AccommodationCreated { .. }
        | Event::RoomCreated { .. }
        | Event::RoomDeleted { .. }
        | Event::BookingRescheduled { .. } => None,
    }
}
