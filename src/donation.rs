use serde::Serialize;
use time::OffsetDateTime;

use crate::blood::{BloodType, Kind};

/// One unit of blood or plasma in inventory.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Donation {
    pub id: i32,
    pub blood_type: BloodType,
    pub kind: Kind,

    /// The bank holding this unit.
    pub location_id: i32,

    #[serde(serialize_with = "crate::timestamp::serialize")]
    pub created_at: OffsetDateTime,
}

/// The result of trying to record a donation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DonationOutcome {
    Recorded(Donation),
    NotYet { next_eligible: OffsetDateTime },
}

/// The number of units of one blood type and kind on hand.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InventoryCount {
    pub blood_type: BloodType,
    pub kind: Kind,
    pub units: i64,
}
