use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::blood::{BloodType, Kind};
use crate::eligibility::{can_donate, Eligibility};
use crate::errors::BackendError;
use crate::normalization;
use crate::validation::{self, Validate};

/// A donor record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Donor {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: i32,
    pub blood_type: BloodType,

    #[serde(serialize_with = "crate::timestamp::serialize_option")]
    pub last_blood_donation_date: Option<OffsetDateTime>,

    #[serde(serialize_with = "crate::timestamp::serialize_option")]
    pub last_plasma_donation_date: Option<OffsetDateTime>,
}

impl Donor {
    pub fn last_donation(&self, kind: Kind) -> Option<OffsetDateTime> {
        match kind {
            Kind::Blood => self.last_blood_donation_date,
            Kind::Plasma => self.last_plasma_donation_date,
        }
    }

    pub(crate) fn set_last_donation(&mut self, kind: Kind, at: OffsetDateTime) {
        match kind {
            Kind::Blood => self.last_blood_donation_date = Some(at),
            Kind::Plasma => self.last_plasma_donation_date = Some(at),
        }
    }

    pub fn eligibility(&self, kind: Kind, now: OffsetDateTime) -> Eligibility {
        can_donate(kind, self.last_donation(kind), now)
    }

    /// When this donor may next donate `kind`, if not already.
    pub fn next_eligible(&self, kind: Kind, now: OffsetDateTime) -> Option<OffsetDateTime> {
        self.eligibility(kind, now).next_eligible()
    }
}

/// The fields staff submit when creating or updating a donor.
#[derive(Clone, Debug, Deserialize)]
pub struct DonorForm {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub first_name: String,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub last_name: String,

    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub email: String,

    pub age: i32,
    pub blood_type: BloodType,
}

impl Validate for DonorForm {
    fn validate(&self) -> Result<(), BackendError> {
        validation::length("first_name", &self.first_name, 2, 20)?;
        validation::length("last_name", &self.last_name, 2, 20)?;
        validation::email("email", &self.email)?;
        validation::positive("age", self.age)?;

        Ok(())
    }
}

/// How staff identify a donor to load: by ID, or by both names and
/// email together.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DonorLookup {
    Id(i32),
    Identity {
        first_name: String,
        last_name: String,
        email: String,
    },
}

impl DonorLookup {
    /// Names and email arrive normalized, with blanks already dropped.
    pub fn new(
        donor_id: Option<i32>,
        first_name: Option<String>,
        last_name: Option<String>,
        email: Option<String>,
    ) -> Result<Self, BackendError> {
        if let Some(id) = donor_id {
            return Ok(DonorLookup::Id(id));
        }

        match (first_name, last_name, email) {
            (Some(first_name), Some(last_name), Some(email)) => Ok(DonorLookup::Identity {
                first_name,
                last_name,
                email,
            }),
            _ => Err(BackendError::validation(
                "donor",
                "Both names and email must be filled!",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;

    fn donor() -> Donor {
        Donor {
            id: 1,
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            email: "ada@example.org".to_owned(),
            age: 36,
            blood_type: BloodType::OPositive,
            last_blood_donation_date: None,
            last_plasma_donation_date: None,
        }
    }

    #[test]
    fn donations_are_tracked_per_kind() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000);
        let mut donor = donor();

        donor.set_last_donation(Kind::Plasma, now);

        assert_eq!(donor.last_donation(Kind::Blood), None);
        assert_eq!(donor.next_eligible(Kind::Blood, now), None);
        assert_eq!(
            donor.next_eligible(Kind::Plasma, now),
            Some(now + Duration::days(28))
        );
    }

    #[test]
    fn forms_are_normalized_and_validated() {
        let form: DonorForm = serde_json::from_str(
            r#"{"first_name": " Ada ", "last_name": "Lovelace", "email": "ADA@Example.org ", "age": 36, "blood_type": "O+"}"#,
        )
        .unwrap();

        assert_eq!(form.first_name, "Ada");
        assert_eq!(form.email, "ada@example.org");
        assert!(form.validate().is_ok());

        let form = DonorForm { age: 0, ..form };
        assert!(form.validate().is_err());
    }

    #[test]
    fn lookups_need_an_id_or_full_identity() {
        assert_eq!(
            DonorLookup::new(Some(4), None, None, None).unwrap(),
            DonorLookup::Id(4)
        );

        assert!(DonorLookup::new(None, Some("Ada".to_owned()), None, None).is_err());

        assert!(DonorLookup::new(
            None,
            Some("Ada".to_owned()),
            None,
            Some("ada@example.org".to_owned())
        )
        .is_err());

        assert_eq!(
            DonorLookup::new(
                None,
                Some("Ada".to_owned()),
                Some("Lovelace".to_owned()),
                Some("ada@example.org".to_owned())
            )
            .unwrap(),
            DonorLookup::Identity {
                first_name: "Ada".to_owned(),
                last_name: "Lovelace".to_owned(),
                email: "ada@example.org".to_owned(),
            }
        );
    }
}
