//! Cooldown rules between two donations of the same kind.

use time::{Duration, OffsetDateTime};

use crate::blood::Kind;

/// The minimum time between two blood donations.
pub const BLOOD_COOLDOWN: Duration = Duration::days(56);

/// The minimum time between two plasma donations.
pub const PLASMA_COOLDOWN: Duration = Duration::days(28);

pub fn cooldown(kind: Kind) -> Duration {
    match kind {
        Kind::Blood => BLOOD_COOLDOWN,
        Kind::Plasma => PLASMA_COOLDOWN,
    }
}

/// The outcome of an eligibility check.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Eligibility {
    Allowed,
    NotYet { next_eligible: OffsetDateTime },
}

impl Eligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Eligibility::Allowed)
    }

    pub fn next_eligible(&self) -> Option<OffsetDateTime> {
        match self {
            Eligibility::Allowed => None,
            Eligibility::NotYet { next_eligible } => Some(*next_eligible),
        }
    }
}

/// Decides whether a donor whose last donation of `kind` was at
/// `last` may donate again at `now`. Reaching the end of the cooldown
/// exactly is enough.
pub fn can_donate(kind: Kind, last: Option<OffsetDateTime>, now: OffsetDateTime) -> Eligibility {
    match last {
        None => Eligibility::Allowed,
        Some(last) => {
            let next_eligible = last + cooldown(kind);

            if next_eligible <= now {
                Eligibility::Allowed
            } else {
                Eligibility::NotYet { next_eligible }
            }
        }
    }
}
