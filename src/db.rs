use futures::future::BoxFuture;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::StaffContext;
use crate::bank::Bank;
use crate::blood::{BloodType, Kind};
use crate::donation::{DonationOutcome, InventoryCount};
use crate::donor::{Donor, DonorForm, DonorLookup};
use crate::errors::BackendError;
use crate::staff::{NewStaff, Staff, StaffUpdate};
use crate::withdrawal::{Quantity, Shipment};

pub mod memory;

pub trait Db {
    fn list_banks(&self) -> BoxFuture<'_, Result<Vec<Bank>, BackendError>>;

    fn find_bank(&self, location: &str) -> BoxFuture<'_, Result<Option<Bank>, BackendError>>;

    /// Creates a bank managed by an existing staff member.
    fn create_bank(
        &self,
        location: String,
        manager_id: i32,
    ) -> BoxFuture<'_, Result<Bank, BackendError>>;

    /// Creates a bank and its manager together, the manager working at
    /// the new bank. `manager.location_id` is ignored.
    fn create_bank_with_manager(
        &self,
        location: String,
        manager: NewStaff,
    ) -> BoxFuture<'_, Result<(Bank, Staff), BackendError>>;

    fn create_staff(&self, staff: NewStaff) -> BoxFuture<'_, Result<Staff, BackendError>>;

    fn retrieve_staff(&self, id: i32) -> BoxFuture<'_, Result<Option<Staff>, BackendError>>;

    fn find_staff(&self, email: &str) -> BoxFuture<'_, Result<Option<Staff>, BackendError>>;

    fn update_staff(
        &self,
        id: i32,
        update: StaffUpdate,
    ) -> BoxFuture<'_, Result<Staff, BackendError>>;

    /// Starts a session for the staff member, returning its token.
    fn create_session(
        &self,
        staff_id: i32,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<'_, Result<Uuid, BackendError>>;

    /// Resolves an unexpired session token.
    fn retrieve_session(
        &self,
        token: Uuid,
        now: OffsetDateTime,
    ) -> BoxFuture<'_, Result<Option<StaffContext>, BackendError>>;

    fn delete_session(&self, token: Uuid) -> BoxFuture<'_, Result<(), BackendError>>;

    fn create_reset_token(
        &self,
        staff_id: i32,
        expires_at: OffsetDateTime,
    ) -> BoxFuture<'_, Result<Uuid, BackendError>>;

    /// Consumes an unexpired reset token, replaces the password of the
    /// staff member it belongs to, and ends all of their sessions.
    /// Returns the staff member’s ID.
    fn reset_password(
        &self,
        token: Uuid,
        password_hash: String,
        now: OffsetDateTime,
    ) -> BoxFuture<'_, Result<i32, BackendError>>;

    fn create_donor(&self, form: DonorForm) -> BoxFuture<'_, Result<Donor, BackendError>>;

    fn retrieve_donor(&self, id: i32) -> BoxFuture<'_, Result<Option<Donor>, BackendError>>;

    fn lookup_donor(
        &self,
        lookup: DonorLookup,
    ) -> BoxFuture<'_, Result<Option<Donor>, BackendError>>;

    fn update_donor(
        &self,
        id: i32,
        form: DonorForm,
    ) -> BoxFuture<'_, Result<Donor, BackendError>>;

    /// Returns one page of donors and the total number of donors.
    fn list_donors(
        &self,
        offset: i64,
        limit: i64,
    ) -> BoxFuture<'_, Result<(Vec<Donor>, i64), BackendError>>;

    /// Atomically checks the donor’s eligibility and, if allowed, adds
    /// a unit of their blood type to inventory at `location_id` and
    /// records `now` as their last donation of `kind`.
    fn record_donation(
        &self,
        donor_id: i32,
        kind: Kind,
        location_id: i32,
        now: OffsetDateTime,
    ) -> BoxFuture<'_, Result<DonationOutcome, BackendError>>;

    /// Counts units on hand, at one bank or everywhere.
    fn inventory(
        &self,
        location_id: Option<i32>,
    ) -> BoxFuture<'_, Result<Vec<InventoryCount>, BackendError>>;

    /// Atomically removes up to `quantity` units of `blood_type` and
    /// `kind`, oldest first, reporting how many were removed.
    fn withdraw(
        &self,
        blood_type: BloodType,
        kind: Kind,
        quantity: Quantity,
    ) -> BoxFuture<'_, Result<Shipment, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
        Postgres, Transaction,
    };
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::auth::StaffContext;
    use crate::bank::Bank;
    use crate::blood::{BloodType, Kind};
    use crate::donation::{Donation, DonationOutcome, InventoryCount};
    use crate::donor::{Donor, DonorForm, DonorLookup};
    use crate::eligibility::Eligibility;
    use crate::errors::BackendError;
    use crate::staff::{NewStaff, Staff, StaffUpdate};
    use crate::withdrawal::{Quantity, Shipment};

    use super::Db;

    const DONORS_EMAIL_CONSTRAINT: &str = "donors_email";
    const STAFF_EMAIL_CONSTRAINT: &str = "staff_email";
    const BANKS_LOCATION_CONSTRAINT: &str = "banks_location";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl Db for PgDb {
        fn list_banks(&self) -> BoxFuture<'_, Result<Vec<Bank>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/list_banks.sql"));

                let banks = query
                    .try_map(|row: PgRow| bank_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(banks)
            }
            .boxed()
        }

        fn find_bank(&self, location: &str) -> BoxFuture<'_, Result<Option<Bank>, BackendError>> {
            let location = location.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/find_bank.sql"));

                let bank = query
                    .bind(location)
                    .try_map(|row: PgRow| bank_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(bank)
            }
            .boxed()
        }

        fn create_bank(
            &self,
            location: String,
            manager_id: i32,
        ) -> BoxFuture<'_, Result<Bank, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let (exists,): (bool,) = sqlx::query_as(include_str!("queries/staff_exists.sql"))
                    .bind(manager_id)
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                if !exists {
                    return Err(BackendError::UnknownStaff(manager_id));
                }

                let bank = sqlx::query(include_str!("queries/create_bank.sql"))
                    .bind(location)
                    .bind(manager_id)
                    .try_map(|row: PgRow| bank_from_row(&row))
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(bank)
            }
            .boxed()
        }

        fn create_bank_with_manager(
            &self,
            location: String,
            manager: NewStaff,
        ) -> BoxFuture<'_, Result<(Bank, Staff), BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                // both foreign keys are deferred until commit, so the
                // manager can point at the bank before it exists
                let (bank_id,): (i32,) = sqlx::query_as(include_str!("queries/next_bank_id.sql"))
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                let staff = insert_staff(&mut tx, NewStaff { location_id: bank_id, ..manager }).await?;

                let bank = sqlx::query(include_str!("queries/create_bank_with_id.sql"))
                    .bind(bank_id)
                    .bind(location)
                    .bind(staff.id)
                    .try_map(|row: PgRow| bank_from_row(&row))
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok((bank, staff))
            }
            .boxed()
        }

        fn create_staff(&self, staff: NewStaff) -> BoxFuture<'_, Result<Staff, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
                let staff = insert_staff(&mut tx, staff).await?;
                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(staff)
            }
            .boxed()
        }

        fn retrieve_staff(&self, id: i32) -> BoxFuture<'_, Result<Option<Staff>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_staff.sql"));

                let staff = query
                    .bind(id)
                    .try_map(|row: PgRow| staff_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(staff)
            }
            .boxed()
        }

        fn find_staff(&self, email: &str) -> BoxFuture<'_, Result<Option<Staff>, BackendError>> {
            let email = email.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/find_staff.sql"));

                let staff = query
                    .bind(email)
                    .try_map(|row: PgRow| staff_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(staff)
            }
            .boxed()
        }

        fn update_staff(
            &self,
            id: i32,
            update: StaffUpdate,
        ) -> BoxFuture<'_, Result<Staff, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_staff.sql"));

                let staff = query
                    .bind(id)
                    .bind(update.first_name)
                    .bind(update.last_name)
                    .bind(update.email)
                    .bind(update.role.as_str())
                    .bind(update.location_id)
                    .try_map(|row: PgRow| staff_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                staff.ok_or(BackendError::UnknownStaff(id))
            }
            .boxed()
        }

        fn create_session(
            &self,
            staff_id: i32,
            expires_at: OffsetDateTime,
        ) -> BoxFuture<'_, Result<Uuid, BackendError>> {
            async move {
                let token = Uuid::new_v4();

                sqlx::query(include_str!("queries/create_session.sql"))
                    .bind(token)
                    .bind(staff_id)
                    .bind(expires_at)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(token)
            }
            .boxed()
        }

        fn retrieve_session(
            &self,
            token: Uuid,
            now: OffsetDateTime,
        ) -> BoxFuture<'_, Result<Option<StaffContext>, BackendError>> {
            async move {
                let row: Option<(i32, i32)> =
                    sqlx::query_as(include_str!("queries/retrieve_session.sql"))
                        .bind(token)
                        .bind(now)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                Ok(row.map(|(staff_id, location_id)| StaffContext {
                    staff_id,
                    location_id,
                    session: token,
                }))
            }
            .boxed()
        }

        fn delete_session(&self, token: Uuid) -> BoxFuture<'_, Result<(), BackendError>> {
            async move {
                sqlx::query(include_str!("queries/delete_session.sql"))
                    .bind(token)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn create_reset_token(
            &self,
            staff_id: i32,
            expires_at: OffsetDateTime,
        ) -> BoxFuture<'_, Result<Uuid, BackendError>> {
            async move {
                let token = Uuid::new_v4();

                sqlx::query(include_str!("queries/create_reset_token.sql"))
                    .bind(token)
                    .bind(staff_id)
                    .bind(expires_at)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(token)
            }
            .boxed()
        }

        fn reset_password(
            &self,
            token: Uuid,
            password_hash: String,
            now: OffsetDateTime,
        ) -> BoxFuture<'_, Result<i32, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let staff_id: Option<(i32,)> =
                    sqlx::query_as(include_str!("queries/redeem_reset_token.sql"))
                        .bind(token)
                        .bind(now)
                        .fetch_optional(&mut tx)
                        .await
                        .map_err(map_sqlx_error)?;

                let (staff_id,) = staff_id.ok_or(BackendError::InvalidResetToken)?;

                sqlx::query(include_str!("queries/update_password.sql"))
                    .bind(staff_id)
                    .bind(password_hash)
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                sqlx::query(include_str!("queries/delete_sessions_for_staff.sql"))
                    .bind(staff_id)
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(staff_id)
            }
            .boxed()
        }

        fn create_donor(&self, form: DonorForm) -> BoxFuture<'_, Result<Donor, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/create_donor.sql"));

                let donor = query
                    .bind(form.first_name)
                    .bind(form.last_name)
                    .bind(form.email)
                    .bind(form.age)
                    .bind(form.blood_type.as_str())
                    .try_map(|row: PgRow| donor_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(donor)
            }
            .boxed()
        }

        fn retrieve_donor(&self, id: i32) -> BoxFuture<'_, Result<Option<Donor>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_donor.sql"));

                let donor = query
                    .bind(id)
                    .try_map(|row: PgRow| donor_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(donor)
            }
            .boxed()
        }

        fn lookup_donor(
            &self,
            lookup: DonorLookup,
        ) -> BoxFuture<'_, Result<Option<Donor>, BackendError>> {
            async move {
                match lookup {
                    DonorLookup::Id(id) => self.retrieve_donor(id).await,
                    DonorLookup::Identity {
                        first_name,
                        last_name,
                        email,
                    } => {
                        let query = sqlx::query(include_str!("queries/find_donor.sql"));

                        let donor = query
                            .bind(first_name)
                            .bind(last_name)
                            .bind(email)
                            .try_map(|row: PgRow| donor_from_row(&row))
                            .fetch_optional(&self.pool)
                            .await
                            .map_err(map_sqlx_error)?;

                        Ok(donor)
                    }
                }
            }
            .boxed()
        }

        fn update_donor(
            &self,
            id: i32,
            form: DonorForm,
        ) -> BoxFuture<'_, Result<Donor, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_donor.sql"));

                let donor = query
                    .bind(id)
                    .bind(form.first_name)
                    .bind(form.last_name)
                    .bind(form.email)
                    .bind(form.age)
                    .bind(form.blood_type.as_str())
                    .try_map(|row: PgRow| donor_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                donor.ok_or(BackendError::UnknownDonor(id))
            }
            .boxed()
        }

        fn list_donors(
            &self,
            offset: i64,
            limit: i64,
        ) -> BoxFuture<'_, Result<(Vec<Donor>, i64), BackendError>> {
            async move {
                let donors = sqlx::query(include_str!("queries/list_donors.sql"))
                    .bind(limit)
                    .bind(offset)
                    .try_map(|row: PgRow| donor_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let (total,): (i64,) = sqlx::query_as(include_str!("queries/count_donors.sql"))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok((donors, total))
            }
            .boxed()
        }

        fn record_donation(
            &self,
            donor_id: i32,
            kind: Kind,
            location_id: i32,
            now: OffsetDateTime,
        ) -> BoxFuture<'_, Result<DonationOutcome, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let donor = sqlx::query(include_str!("queries/lock_donor.sql"))
                    .bind(donor_id)
                    .try_map(|row: PgRow| donor_from_row(&row))
                    .fetch_optional(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?
                    .ok_or(BackendError::UnknownDonor(donor_id))?;

                if let Eligibility::NotYet { next_eligible } = donor.eligibility(kind, now) {
                    // nothing was written, so dropping `tx` rolls back
                    // only the row lock
                    return Ok(DonationOutcome::NotYet { next_eligible });
                }

                let donation = sqlx::query(include_str!("queries/create_donation.sql"))
                    .bind(donor.blood_type.as_str())
                    .bind(kind.as_str())
                    .bind(location_id)
                    .bind(now)
                    .try_map(|row: PgRow| donation_from_row(&row))
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                let update = match kind {
                    Kind::Blood => include_str!("queries/update_last_blood_donation.sql"),
                    Kind::Plasma => include_str!("queries/update_last_plasma_donation.sql"),
                };

                sqlx::query(update)
                    .bind(donor_id)
                    .bind(now)
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(DonationOutcome::Recorded(donation))
            }
            .boxed()
        }

        fn inventory(
            &self,
            location_id: Option<i32>,
        ) -> BoxFuture<'_, Result<Vec<InventoryCount>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/inventory.sql"));

                let counts = query
                    .bind(location_id)
                    .try_map(|row: PgRow| {
                        Ok(InventoryCount {
                            blood_type: parse_column(&row, "blood_type")?,
                            kind: parse_column(&row, "kind")?,
                            units: try_get(&row, "units")?,
                        })
                    })
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(counts)
            }
            .boxed()
        }

        fn withdraw(
            &self,
            blood_type: BloodType,
            kind: Kind,
            quantity: Quantity,
        ) -> BoxFuture<'_, Result<Shipment, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                // serializes withdrawals from the same bucket until commit
                sqlx::query(include_str!("queries/lock_bucket.sql"))
                    .bind(blood_type.as_str())
                    .bind(kind.as_str())
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                let (available,): (i64,) = sqlx::query_as(include_str!("queries/count_units.sql"))
                    .bind(blood_type.as_str())
                    .bind(kind.as_str())
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                let shipped = if available == 0 {
                    0
                } else {
                    sqlx::query(include_str!("queries/withdraw.sql"))
                        .bind(blood_type.as_str())
                        .bind(kind.as_str())
                        .bind(quantity.limit())
                        .execute(&mut tx)
                        .await
                        .map_err(map_sqlx_error)?
                        .rows_affected()
                };

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(Shipment::new(
                    blood_type,
                    kind,
                    quantity,
                    available as u64,
                    shipped,
                ))
            }
            .boxed()
        }
    }

    async fn insert_staff(
        tx: &mut Transaction<'_, Postgres>,
        staff: NewStaff,
    ) -> Result<Staff, BackendError> {
        let query = sqlx::query(include_str!("queries/create_staff.sql"));

        let staff = query
            .bind(staff.first_name)
            .bind(staff.last_name)
            .bind(staff.email)
            .bind(staff.password_hash)
            .bind(staff.role.as_str())
            .bind(staff.location_id)
            .try_map(|row: PgRow| staff_from_row(&row))
            .fetch_one(tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(staff)
    }

    fn bank_from_row(row: &PgRow) -> Result<Bank, sqlx::Error> {
        Ok(Bank {
            id: try_get(row, "id")?,
            location: try_get(row, "location")?,
            manager_id: try_get(row, "manager_id")?,
        })
    }

    fn staff_from_row(row: &PgRow) -> Result<Staff, sqlx::Error> {
        Ok(Staff {
            id: try_get(row, "id")?,
            first_name: try_get(row, "first_name")?,
            last_name: try_get(row, "last_name")?,
            email: try_get(row, "email")?,
            password_hash: try_get(row, "password_hash")?,
            role: parse_column(row, "role")?,
            location_id: try_get(row, "location_id")?,
        })
    }

    fn donor_from_row(row: &PgRow) -> Result<Donor, sqlx::Error> {
        Ok(Donor {
            id: try_get(row, "id")?,
            first_name: try_get(row, "first_name")?,
            last_name: try_get(row, "last_name")?,
            email: try_get(row, "email")?,
            age: try_get(row, "age")?,
            blood_type: parse_column(row, "blood_type")?,
            last_blood_donation_date: try_get(row, "last_blood_donation_date")?,
            last_plasma_donation_date: try_get(row, "last_plasma_donation_date")?,
        })
    }

    fn donation_from_row(row: &PgRow) -> Result<Donation, sqlx::Error> {
        Ok(Donation {
            id: try_get(row, "id")?,
            blood_type: parse_column(row, "blood_type")?,
            kind: parse_column(row, "kind")?,
            location_id: try_get(row, "location_id")?,
            created_at: try_get(row, "created_at")?,
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    /// Reads a text column and parses it into one of the domain enums.
    fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
    where
        T: std::str::FromStr<Err = BackendError>,
    {
        let raw: String = try_get(row, column)?;

        // this should never happen, since the schema constrains these
        // columns, but just for completeness...
        raw.parse()
            .map_err(|e: BackendError| sqlx::Error::Decode(Box::new(e)))
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        use sqlx::Error;

        match error {
            Error::Database(ref e)
                if e.constraint() == Some(DONORS_EMAIL_CONSTRAINT)
                    || e.constraint() == Some(STAFF_EMAIL_CONSTRAINT) =>
            {
                BackendError::EmailAlreadyExists
            }
            Error::Database(ref e) if e.constraint() == Some(BANKS_LOCATION_CONSTRAINT) => {
                BackendError::LocationAlreadyExists
            }
            _ => BackendError::Sqlx { source: error },
        }
    }
}
