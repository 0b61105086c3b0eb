use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::BackendError;

/// One of the eight ABO/Rh blood types.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum BloodType {
    ONegative,
    OPositive,
    ANegative,
    APositive,
    BNegative,
    BPositive,
    AbNegative,
    AbPositive,
}

impl BloodType {
    /// Every blood type, in the order staff are shown them.
    pub const ALL: [BloodType; 8] = [
        BloodType::ONegative,
        BloodType::OPositive,
        BloodType::ANegative,
        BloodType::APositive,
        BloodType::BNegative,
        BloodType::BPositive,
        BloodType::AbNegative,
        BloodType::AbPositive,
    ];

    pub fn as_str(self) -> &'static str {
        use BloodType::*;

        match self {
            ONegative => "O-",
            OPositive => "O+",
            ANegative => "A-",
            APositive => "A+",
            BNegative => "B-",
            BPositive => "B+",
            AbNegative => "AB-",
            AbPositive => "AB+",
        }
    }
}

impl FromStr for BloodType {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        BloodType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| BackendError::InvalidBloodType(s.to_owned()))
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BloodType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BloodType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// What a donation unit holds. Each unit is exactly one of the two.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Kind {
    Blood,
    Plasma,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Blood => "blood",
            Kind::Plasma => "plasma",
        }
    }
}

impl FromStr for Kind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blood" => Ok(Kind::Blood),
            "plasma" => Ok(Kind::Plasma),
            _ => Err(BackendError::InvalidKind(s.to_owned())),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::{BloodType, Kind};

    #[test]
    fn blood_types_parse_their_own_labels() {
        for t in BloodType::ALL.iter() {
            assert_eq!(t.as_str().parse::<BloodType>().unwrap(), *t);
        }

        assert_eq!("ab+".parse::<BloodType>().unwrap(), BloodType::AbPositive);
        assert_eq!(" O- ".parse::<BloodType>().unwrap(), BloodType::ONegative);
    }

    #[test]
    fn unknown_blood_types_are_rejected() {
        for s in &["", "O", "C+", "AB", "A+-", "0+"] {
            assert!(s.parse::<BloodType>().is_err(), "{:?} must not parse", s);
        }
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("Blood".parse::<Kind>().unwrap(), Kind::Blood);
        assert_eq!("PLASMA".parse::<Kind>().unwrap(), Kind::Plasma);
        assert!("platelets".parse::<Kind>().is_err());
    }

    #[test]
    fn serde_uses_labels() {
        assert_eq!(serde_json::to_string(&BloodType::AbNegative).unwrap(), "\"AB-\"");
        assert_eq!(serde_json::to_string(&Kind::Plasma).unwrap(), "\"plasma\"");
        assert_eq!(
            serde_json::from_str::<BloodType>("\"B+\"").unwrap(),
            BloodType::BPositive
        );
        assert!(serde_json::from_str::<Kind>("\"both\"").is_err());
    }
}
