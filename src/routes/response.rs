use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::blood::Kind;
use crate::donation::{Donation, InventoryCount};
use crate::donor::Donor;
use crate::staff::Staff;
use crate::withdrawal::Shipment;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Session {
        token: Uuid,
        #[serde(serialize_with = "crate::timestamp::serialize")]
        expires_at: OffsetDateTime,
        staff: Staff,
    },
    Message {
        message: &'a str,
    },
    Donors {
        page: u32,
        per_page: u32,
        total: i64,
        donors: Vec<DonorView>,
    },
    Donation {
        recorded: bool,
        donation: Option<Donation>,
        #[serde(serialize_with = "crate::timestamp::serialize_option")]
        next_eligible: Option<OffsetDateTime>,
        message: String,
    },
    Inventory {
        location_id: Option<i32>,
        units: Vec<InventoryCount>,
    },
    Withdrawal {
        #[serde(flatten)]
        shipment: Shipment,
        message: String,
    },
}

/// A donor along with when they may next donate each kind.
#[derive(Debug, Serialize)]
pub struct DonorView {
    #[serde(flatten)]
    donor: Donor,

    #[serde(serialize_with = "crate::timestamp::serialize_option")]
    next_blood_donation: Option<OffsetDateTime>,

    #[serde(serialize_with = "crate::timestamp::serialize_option")]
    next_plasma_donation: Option<OffsetDateTime>,
}

impl DonorView {
    pub fn new(donor: Donor, now: OffsetDateTime) -> Self {
        DonorView {
            next_blood_donation: donor.next_eligible(Kind::Blood, now),
            next_plasma_donation: donor.next_eligible(Kind::Plasma, now),
            donor,
        }
    }
}
