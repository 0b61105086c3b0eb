//! Resolving how many inventory units a withdrawal ships.

use std::cmp;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::blood::{BloodType, Kind};
use crate::errors::BackendError;

/// How many units a withdrawal asks for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Quantity {
    /// Every matching unit on hand.
    All,

    /// At most this many units.
    Units(u64),
}

impl Quantity {
    /// Returns how many of `available` units to ship. Never more than
    /// are on hand.
    pub fn resolve(self, available: usize) -> usize {
        match self {
            Quantity::All => available,
            Quantity::Units(n) => cmp::min(n, available as u64) as usize,
        }
    }

    /// The row limit to hand to the store, where `None` means no limit.
    pub fn limit(self) -> Option<i64> {
        match self {
            Quantity::All => None,
            Quantity::Units(n) => Some(cmp::min(n, i64::MAX as u64) as i64),
        }
    }

    pub fn is_all(self) -> bool {
        self == Quantity::All
    }
}

impl FromStr for Quantity {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Quantity::All);
        }

        // `u64::from_str` accepts a leading `+`, which isn’t a number
        // anyone types into this field
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            // more digits than fit still asks for more than any bank holds
            let n = trimmed.parse().unwrap_or(u64::MAX);
            return Ok(Quantity::Units(n));
        }

        Err(BackendError::MalformedQuantity(s.to_owned()))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::All => f.write_str("all"),
            Quantity::Units(n) => write!(f, "{}", n),
        }
    }
}

/// Removes the units a withdrawal ships from the front of `units`,
/// returning them. Whatever is left stays in `units`.
pub fn take<T>(units: &mut Vec<T>, quantity: Quantity) -> Vec<T> {
    let count = quantity.resolve(units.len());

    units.drain(..count).collect()
}

/// The result of a withdrawal.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Shipment {
    pub blood_type: BloodType,
    pub kind: Kind,

    /// The number of units removed from inventory.
    pub shipped: u64,

    /// Whether the request was for every unit on hand.
    pub requested_all: bool,

    /// The number of matching units before the withdrawal.
    pub available: u64,
}

impl Shipment {
    pub fn new(blood_type: BloodType, kind: Kind, quantity: Quantity, available: u64, shipped: u64) -> Self {
        Shipment {
            blood_type,
            kind,
            shipped,
            requested_all: quantity.is_all(),
            available,
        }
    }

    /// Whether there was nothing of this type to ship at all.
    pub fn was_empty(&self) -> bool {
        self.available == 0
    }

    /// A message for staff describing what happened.
    pub fn message(&self) -> String {
        if self.was_empty() {
            format!(
                "There are no units of {} {} available",
                self.blood_type, self.kind
            )
        } else if self.requested_all {
            format!(
                "All {} units of {} {} have been shipped",
                self.shipped, self.blood_type, self.kind
            )
        } else {
            format!(
                "{} units of {} {} have been shipped",
                self.shipped, self.blood_type, self.kind
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{take, Quantity, Shipment};
    use crate::blood::{BloodType, Kind};

    #[test]
    fn all_is_case_insensitive() {
        for s in &["all", "All", "ALL", " aLl "] {
            assert_eq!(s.parse::<Quantity>().unwrap(), Quantity::All);
        }
    }

    #[test]
    fn numbers_parse() {
        assert_eq!("0".parse::<Quantity>().unwrap(), Quantity::Units(0));
        assert_eq!(" 12 ".parse::<Quantity>().unwrap(), Quantity::Units(12));
    }

    #[test]
    fn malformed_quantities_are_rejected() {
        for s in &["", " ", "-1", "+3", "1.5", "three", "alll"] {
            assert!(s.parse::<Quantity>().is_err(), "{:?} must not parse", s);
        }
    }

    #[test]
    fn huge_numbers_ship_everything_on_hand() {
        assert_eq!("5000000000".parse::<Quantity>().unwrap(), Quantity::Units(5_000_000_000));

        let huge = "99999999999999999999999".parse::<Quantity>().unwrap();
        assert_eq!(huge, Quantity::Units(u64::MAX));
        assert_eq!(huge.resolve(7), 7);
        assert_eq!(huge.limit(), Some(i64::MAX));
    }

    #[test]
    fn shipments_report_what_was_available() {
        let shipment = Shipment::new(BloodType::OPositive, Kind::Blood, Quantity::Units(2), 5, 2);

        assert_eq!(
            serde_json::to_value(&shipment).unwrap(),
            serde_json::json!({
                "blood_type": "O+",
                "kind": "blood",
                "shipped": 2,
                "requested_all": false,
                "available": 5,
            })
        );
    }

    #[test]
    fn never_ships_more_than_available() {
        assert_eq!(Quantity::Units(5).resolve(3), 3);
        assert_eq!(Quantity::Units(2).resolve(3), 2);
        assert_eq!(Quantity::Units(0).resolve(3), 0);
        assert_eq!(Quantity::All.resolve(3), 3);
        assert_eq!(Quantity::All.resolve(0), 0);
    }

    #[test]
    fn take_removes_from_the_front() {
        let mut units = vec![1, 2, 3, 4];

        assert_eq!(take(&mut units, Quantity::Units(2)), vec![1, 2]);
        assert_eq!(units, vec![3, 4]);

        assert_eq!(take(&mut units, Quantity::All), vec![3, 4]);
        assert!(units.is_empty());

        assert!(take(&mut units, Quantity::All).is_empty());
    }

    #[test]
    fn messages_describe_the_outcome() {
        let empty = Shipment::new(BloodType::ONegative, Kind::Blood, Quantity::All, 0, 0);
        assert!(empty.was_empty());
        assert_eq!(empty.message(), "There are no units of O- blood available");

        let partial = Shipment::new(BloodType::APositive, Kind::Plasma, Quantity::Units(5), 3, 3);
        assert_eq!(partial.message(), "3 units of A+ plasma have been shipped");
    }

    proptest! {
        #[test]
        fn take_ships_min_of_requested_and_available(requested in 0u64..50, available in 0usize..50) {
            let mut units: Vec<usize> = (0..available).collect();
            let shipped = take(&mut units, Quantity::Units(requested));

            prop_assert_eq!(shipped.len(), std::cmp::min(requested as usize, available));
            prop_assert_eq!(shipped.len() + units.len(), available);
        }
    }
}
