//! A `Db` kept in process memory, for tests that run without a
//! database server. Every operation holds one lock from start to
//! finish, so each is atomic with respect to the others.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use futures::future::{self, BoxFuture, FutureExt};
use time::OffsetDateTime;
use uuid::Uuid;

use super::Db;
use crate::auth::StaffContext;
use crate::bank::Bank;
use crate::blood::{BloodType, Kind};
use crate::donation::{Donation, DonationOutcome, InventoryCount};
use crate::donor::{Donor, DonorForm, DonorLookup};
use crate::eligibility::Eligibility;
use crate::errors::BackendError;
use crate::staff::{NewStaff, Staff, StaffUpdate};
use crate::withdrawal::{self, Quantity, Shipment};

#[derive(Default)]
pub struct MemoryDb {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    banks: Vec<Bank>,
    staff: Vec<Staff>,
    donors: Vec<Donor>,

    /// Kept in insertion order, which is also ID order.
    donations: Vec<Donation>,

    sessions: HashMap<Uuid, (i32, OffsetDateTime)>,
    reset_tokens: HashMap<Uuid, (i32, OffsetDateTime)>,
    last_id: i32,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn staff_email_taken(&self, email: &str, except: Option<i32>) -> bool {
        self.staff
            .iter()
            .any(|s| s.email == email && Some(s.id) != except)
    }

    fn donor_email_taken(&self, email: &str, except: Option<i32>) -> bool {
        self.donors
            .iter()
            .any(|d| d.email == email && Some(d.id) != except)
    }

    fn insert_staff(&mut self, staff: NewStaff) -> Result<Staff, BackendError> {
        if self.staff_email_taken(&staff.email, None) {
            return Err(BackendError::EmailAlreadyExists);
        }

        let staff = Staff {
            id: self.next_id(),
            first_name: staff.first_name,
            last_name: staff.last_name,
            email: staff.email,
            password_hash: staff.password_hash,
            role: staff.role,
            location_id: staff.location_id,
        };

        self.staff.push(staff.clone());

        Ok(staff)
    }

    fn insert_bank(&mut self, id: i32, location: String, manager_id: i32) -> Result<Bank, BackendError> {
        if self.banks.iter().any(|b| b.location == location) {
            return Err(BackendError::LocationAlreadyExists);
        }

        let bank = Bank {
            id,
            location,
            manager_id,
        };

        self.banks.push(bank.clone());

        Ok(bank)
    }
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit to inventory directly, bypassing eligibility.
    pub fn stock(&self, blood_type: BloodType, kind: Kind, location_id: i32, created_at: OffsetDateTime) -> Donation {
        let mut state = self.lock();

        let donation = Donation {
            id: state.next_id(),
            blood_type,
            kind,
            location_id,
            created_at,
        };

        state.donations.push(donation.clone());

        donation
    }

    /// Overwrites a donor’s last donation of `kind`.
    pub fn set_last_donation(&self, donor_id: i32, kind: Kind, at: Option<OffsetDateTime>) -> Result<(), BackendError> {
        let mut state = self.lock();

        let donor = state
            .donors
            .iter_mut()
            .find(|d| d.id == donor_id)
            .ok_or(BackendError::UnknownDonor(donor_id))?;

        match kind {
            Kind::Blood => donor.last_blood_donation_date = at,
            Kind::Plasma => donor.last_plasma_donation_date = at,
        }

        Ok(())
    }

    /// Every unit in inventory, oldest first.
    pub fn donations(&self) -> Vec<Donation> {
        self.lock().donations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // a panic mid-operation can’t leave `State` half-written, since
        // every operation validates before mutating
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn ready<'a, T: Send + 'a>(result: Result<T, BackendError>) -> BoxFuture<'a, Result<T, BackendError>> {
    future::ready(result).boxed()
}

impl Db for MemoryDb {
    fn list_banks(&self) -> BoxFuture<'_, Result<Vec<Bank>, BackendError>> {
        let mut banks = self.lock().banks.clone();
        banks.sort_by(|a, b| a.location.cmp(&b.location));

        ready(Ok(banks))
    }

    fn find_bank(&self, location: &str) -> BoxFuture<'_, Result<Option<Bank>, BackendError>> {
        let bank = self
            .lock()
            .banks
            .iter()
            .find(|b| b.location == location)
            .cloned();

        ready(Ok(bank))
    }

    fn create_bank(&self, location: String, manager_id: i32) -> BoxFuture<'_, Result<Bank, BackendError>> {
        let mut state = self.lock();

        let result = if state.staff.iter().any(|s| s.id == manager_id) {
            let id = state.next_id();
            state.insert_bank(id, location, manager_id)
        } else {
            Err(BackendError::UnknownStaff(manager_id))
        };

        ready(result)
    }

    fn create_bank_with_manager(
        &self,
        location: String,
        manager: NewStaff,
    ) -> BoxFuture<'_, Result<(Bank, Staff), BackendError>> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let result = (|| {
            if state.banks.iter().any(|b| b.location == location) {
                return Err(BackendError::LocationAlreadyExists);
            }

            let bank_id = state.next_id();
            let staff = state.insert_staff(NewStaff {
                location_id: bank_id,
                ..manager
            })?;
            let bank = state.insert_bank(bank_id, location, staff.id)?;

            Ok((bank, staff))
        })();

        ready(result)
    }

    fn create_staff(&self, staff: NewStaff) -> BoxFuture<'_, Result<Staff, BackendError>> {
        ready(self.lock().insert_staff(staff))
    }

    fn retrieve_staff(&self, id: i32) -> BoxFuture<'_, Result<Option<Staff>, BackendError>> {
        let staff = self.lock().staff.iter().find(|s| s.id == id).cloned();

        ready(Ok(staff))
    }

    fn find_staff(&self, email: &str) -> BoxFuture<'_, Result<Option<Staff>, BackendError>> {
        let staff = self.lock().staff.iter().find(|s| s.email == email).cloned();

        ready(Ok(staff))
    }

    fn update_staff(&self, id: i32, update: StaffUpdate) -> BoxFuture<'_, Result<Staff, BackendError>> {
        let mut state = self.lock();

        let result = if state.staff_email_taken(&update.email, Some(id)) {
            Err(BackendError::EmailAlreadyExists)
        } else {
            match state.staff.iter_mut().find(|s| s.id == id) {
                Some(staff) => {
                    staff.first_name = update.first_name;
                    staff.last_name = update.last_name;
                    staff.email = update.email;
                    staff.role = update.role;
                    staff.location_id = update.location_id;

                    Ok(staff.clone())
                }
                None => Err(BackendError::UnknownStaff(id)),
            }
        };

        ready(result)
    }

    fn create_session(&self, staff_id: i32, expires_at: OffsetDateTime) -> BoxFuture<'_, Result<Uuid, BackendError>> {
        let token = Uuid::new_v4();
        self.lock().sessions.insert(token, (staff_id, expires_at));

        ready(Ok(token))
    }

    fn retrieve_session(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> BoxFuture<'_, Result<Option<StaffContext>, BackendError>> {
        let state = self.lock();

        let context = state
            .sessions
            .get(&token)
            .filter(|(_, expires_at)| *expires_at > now)
            .and_then(|(staff_id, _)| state.staff.iter().find(|s| s.id == *staff_id))
            .map(|staff| StaffContext {
                staff_id: staff.id,
                location_id: staff.location_id,
                session: token,
            });

        ready(Ok(context))
    }

    fn delete_session(&self, token: Uuid) -> BoxFuture<'_, Result<(), BackendError>> {
        self.lock().sessions.remove(&token);

        ready(Ok(()))
    }

    fn create_reset_token(&self, staff_id: i32, expires_at: OffsetDateTime) -> BoxFuture<'_, Result<Uuid, BackendError>> {
        let token = Uuid::new_v4();
        self.lock().reset_tokens.insert(token, (staff_id, expires_at));

        ready(Ok(token))
    }

    fn reset_password(
        &self,
        token: Uuid,
        password_hash: String,
        now: OffsetDateTime,
    ) -> BoxFuture<'_, Result<i32, BackendError>> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let result = match state.reset_tokens.remove(&token) {
            Some((staff_id, expires_at)) if expires_at > now => {
                match state.staff.iter_mut().find(|s| s.id == staff_id) {
                    Some(staff) => {
                        staff.password_hash = password_hash;
                        state.sessions.retain(|_, (id, _)| *id != staff_id);

                        Ok(staff_id)
                    }
                    None => Err(BackendError::InvalidResetToken),
                }
            }
            _ => Err(BackendError::InvalidResetToken),
        };

        ready(result)
    }

    fn create_donor(&self, form: DonorForm) -> BoxFuture<'_, Result<Donor, BackendError>> {
        let mut state = self.lock();

        let result = if state.donor_email_taken(&form.email, None) {
            Err(BackendError::EmailAlreadyExists)
        } else {
            let donor = Donor {
                id: state.next_id(),
                first_name: form.first_name,
                last_name: form.last_name,
                email: form.email,
                age: form.age,
                blood_type: form.blood_type,
                last_blood_donation_date: None,
                last_plasma_donation_date: None,
            };

            state.donors.push(donor.clone());

            Ok(donor)
        };

        ready(result)
    }

    fn retrieve_donor(&self, id: i32) -> BoxFuture<'_, Result<Option<Donor>, BackendError>> {
        let donor = self.lock().donors.iter().find(|d| d.id == id).cloned();

        ready(Ok(donor))
    }

    fn lookup_donor(&self, lookup: DonorLookup) -> BoxFuture<'_, Result<Option<Donor>, BackendError>> {
        let state = self.lock();

        let donor = match lookup {
            DonorLookup::Id(id) => state.donors.iter().find(|d| d.id == id),
            DonorLookup::Identity {
                first_name,
                last_name,
                email,
            } => state.donors.iter().find(|d| {
                d.first_name == first_name && d.last_name == last_name && d.email == email
            }),
        };

        ready(Ok(donor.cloned()))
    }

    fn update_donor(&self, id: i32, form: DonorForm) -> BoxFuture<'_, Result<Donor, BackendError>> {
        let mut state = self.lock();

        let result = if state.donor_email_taken(&form.email, Some(id)) {
            Err(BackendError::EmailAlreadyExists)
        } else {
            match state.donors.iter_mut().find(|d| d.id == id) {
                Some(donor) => {
                    donor.first_name = form.first_name;
                    donor.last_name = form.last_name;
                    donor.email = form.email;
                    donor.age = form.age;
                    donor.blood_type = form.blood_type;

                    Ok(donor.clone())
                }
                None => Err(BackendError::UnknownDonor(id)),
            }
        };

        ready(result)
    }

    fn list_donors(&self, offset: i64, limit: i64) -> BoxFuture<'_, Result<(Vec<Donor>, i64), BackendError>> {
        let mut donors = self.lock().donors.clone();
        let total = donors.len() as i64;

        donors.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });

        let page = donors
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        ready(Ok((page, total)))
    }

    fn record_donation(
        &self,
        donor_id: i32,
        kind: Kind,
        location_id: i32,
        now: OffsetDateTime,
    ) -> BoxFuture<'_, Result<DonationOutcome, BackendError>> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let result = (|| {
            let donor = state
                .donors
                .iter()
                .find(|d| d.id == donor_id)
                .ok_or(BackendError::UnknownDonor(donor_id))?;

            if let Eligibility::NotYet { next_eligible } = donor.eligibility(kind, now) {
                return Ok(DonationOutcome::NotYet { next_eligible });
            }

            let blood_type = donor.blood_type;
            let donation = Donation {
                id: state.next_id(),
                blood_type,
                kind,
                location_id,
                created_at: now,
            };

            state.donations.push(donation.clone());

            if let Some(donor) = state.donors.iter_mut().find(|d| d.id == donor_id) {
                donor.set_last_donation(kind, now);
            }

            Ok(DonationOutcome::Recorded(donation))
        })();

        ready(result)
    }

    fn inventory(&self, location_id: Option<i32>) -> BoxFuture<'_, Result<Vec<InventoryCount>, BackendError>> {
        let state = self.lock();

        let mut counts: HashMap<(BloodType, Kind), i64> = HashMap::new();

        for donation in state
            .donations
            .iter()
            .filter(|d| location_id.map_or(true, |id| d.location_id == id))
        {
            *counts.entry((donation.blood_type, donation.kind)).or_insert(0) += 1;
        }

        let mut counts: Vec<InventoryCount> = counts
            .into_iter()
            .map(|((blood_type, kind), units)| InventoryCount {
                blood_type,
                kind,
                units,
            })
            .collect();

        counts.sort_by(|a, b| (a.blood_type.as_str(), a.kind).cmp(&(b.blood_type.as_str(), b.kind)));

        ready(Ok(counts))
    }

    fn withdraw(
        &self,
        blood_type: BloodType,
        kind: Kind,
        quantity: Quantity,
    ) -> BoxFuture<'_, Result<Shipment, BackendError>> {
        let mut state = self.lock();

        let (mut matching, rest): (Vec<Donation>, Vec<Donation>) = state
            .donations
            .drain(..)
            .partition(|d| d.blood_type == blood_type && d.kind == kind);

        let available = matching.len() as u64;
        let shipped = withdrawal::take(&mut matching, quantity).len() as u64;

        // put back what wasn’t shipped, restoring ID order
        state.donations = rest;
        state.donations.extend(matching);
        state.donations.sort_by_key(|d| d.id);

        ready(Ok(Shipment::new(blood_type, kind, quantity, available, shipped)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::{Duration, OffsetDateTime};

    use super::MemoryDb;
    use crate::blood::{BloodType, Kind};
    use crate::db::Db;
    use crate::donation::DonationOutcome;
    use crate::donor::DonorForm;
    use crate::withdrawal::Quantity;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000)
    }

    fn form(email: &str, blood_type: BloodType) -> DonorForm {
        DonorForm {
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            email: email.to_owned(),
            age: 36,
            blood_type,
        }
    }

    fn stock(db: &MemoryDb, blood_type: BloodType, kind: Kind, count: usize) {
        for _ in 0..count {
            db.stock(blood_type, kind, 1, now());
        }
    }

    #[tokio::test]
    async fn withdrawing_all_empties_only_the_matching_bucket() {
        let db = MemoryDb::new();
        stock(&db, BloodType::OPositive, Kind::Blood, 3);
        stock(&db, BloodType::OPositive, Kind::Plasma, 2);
        stock(&db, BloodType::ANegative, Kind::Blood, 1);

        let shipment = db
            .withdraw(BloodType::OPositive, Kind::Blood, Quantity::All)
            .await
            .unwrap();

        assert_eq!(shipment.shipped, 3);
        assert!(shipment.requested_all);

        let remaining = db.donations();
        assert_eq!(remaining.len(), 3);
        assert!(remaining
            .iter()
            .all(|d| !(d.blood_type == BloodType::OPositive && d.kind == Kind::Blood)));
    }

    #[tokio::test]
    async fn withdrawing_more_than_available_ships_what_there_is() {
        let db = MemoryDb::new();
        stock(&db, BloodType::BNegative, Kind::Plasma, 3);

        let shipment = db
            .withdraw(BloodType::BNegative, Kind::Plasma, Quantity::Units(5))
            .await
            .unwrap();

        assert_eq!(shipment.shipped, 3);
        assert_eq!(shipment.available, 3);
        assert!(db.donations().is_empty());
    }

    #[tokio::test]
    async fn withdrawing_zero_leaves_everything() {
        let db = MemoryDb::new();
        stock(&db, BloodType::AbPositive, Kind::Blood, 2);

        let shipment = db
            .withdraw(BloodType::AbPositive, Kind::Blood, Quantity::Units(0))
            .await
            .unwrap();

        assert_eq!(shipment.shipped, 0);
        assert_eq!(db.donations().len(), 2);
    }

    #[tokio::test]
    async fn partial_withdrawals_take_the_oldest_units() {
        let db = MemoryDb::new();
        stock(&db, BloodType::APositive, Kind::Blood, 4);
        let ids: Vec<i32> = db.donations().iter().map(|d| d.id).collect();

        db.withdraw(BloodType::APositive, Kind::Blood, Quantity::Units(2))
            .await
            .unwrap();

        let left: Vec<i32> = db.donations().iter().map(|d| d.id).collect();
        assert_eq!(left, ids[2..].to_vec());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_withdrawals_never_overship() {
        let db = Arc::new(MemoryDb::new());
        stock(&db, BloodType::BNegative, Kind::Blood, 22);
        stock(&db, BloodType::BPositive, Kind::Blood, 2);

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let db = db.clone();

                tokio::spawn(async move {
                    db.withdraw(BloodType::BNegative, Kind::Blood, Quantity::Units(3))
                        .await
                })
            })
            .collect();

        let mut shipments = Vec::new();
        for task in tasks {
            shipments.push(task.await.unwrap().unwrap());
        }

        let shipped: u64 = shipments.iter().map(|s| s.shipped).sum();
        assert_eq!(shipped, 22);

        let mut available: Vec<u64> = shipments.iter().map(|s| s.available).collect();
        available.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(available, vec![22, 19, 16, 13, 10, 7, 4, 1, 0, 0]);

        for shipment in &shipments {
            assert_eq!(shipment.shipped, std::cmp::min(3, shipment.available));
        }

        let remaining = db.donations();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|d| d.blood_type == BloodType::BPositive));
    }

    #[tokio::test]
    async fn withdrawing_all_twice_from_nothing_is_harmless() {
        let db = MemoryDb::new();

        for _ in 0..2 {
            let shipment = db
                .withdraw(BloodType::ONegative, Kind::Plasma, Quantity::All)
                .await
                .unwrap();

            assert_eq!(shipment.shipped, 0);
            assert!(shipment.was_empty());
        }
    }

    #[tokio::test]
    async fn donating_blood_after_sixty_days() {
        let db = MemoryDb::new();
        let donor = db
            .create_donor(form("ada@example.org", BloodType::OPositive))
            .await
            .unwrap();
        db.set_last_donation(donor.id, Kind::Blood, Some(now() - Duration::days(60)))
            .unwrap();

        let outcome = db
            .record_donation(donor.id, Kind::Blood, 7, now())
            .await
            .unwrap();

        match outcome {
            DonationOutcome::Recorded(donation) => {
                assert_eq!(donation.blood_type, BloodType::OPositive);
                assert_eq!(donation.kind, Kind::Blood);
                assert_eq!(donation.location_id, 7);
            }
            other => panic!("expected a recorded donation, got {:?}", other),
        }

        let donor = db.retrieve_donor(donor.id).await.unwrap().unwrap();
        assert_eq!(donor.last_blood_donation_date, Some(now()));
        assert_eq!(db.donations().len(), 1);
    }

    #[tokio::test]
    async fn donating_plasma_too_soon_is_refused() {
        let db = MemoryDb::new();
        let donor = db
            .create_donor(form("ada@example.org", BloodType::OPositive))
            .await
            .unwrap();
        let last = now() - Duration::days(10);
        db.set_last_donation(donor.id, Kind::Plasma, Some(last)).unwrap();

        let outcome = db
            .record_donation(donor.id, Kind::Plasma, 1, now())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DonationOutcome::NotYet {
                next_eligible: last + Duration::days(28)
            }
        );
        assert!(db.donations().is_empty());

        let donor = db.retrieve_donor(donor.id).await.unwrap().unwrap();
        assert_eq!(donor.last_plasma_donation_date, Some(last));
    }

    #[tokio::test]
    async fn donor_emails_are_unique() {
        let db = MemoryDb::new();
        db.create_donor(form("ada@example.org", BloodType::OPositive))
            .await
            .unwrap();

        assert!(db
            .create_donor(form("ada@example.org", BloodType::ANegative))
            .await
            .is_err());

        let other = db
            .create_donor(form("grace@example.org", BloodType::ANegative))
            .await
            .unwrap();

        // keeping your own email on update is fine; taking someone
        // else’s is not
        assert!(db
            .update_donor(other.id, form("grace@example.org", BloodType::BPositive))
            .await
            .is_ok());
        assert!(db
            .update_donor(other.id, form("ada@example.org", BloodType::BPositive))
            .await
            .is_err());
    }
}
