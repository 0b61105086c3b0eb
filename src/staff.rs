use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::BackendError;
use crate::normalization;
use crate::validation::{self, Validate};

/// A staff member’s job title.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Nurse,
    Doctor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Nurse => "Nurse",
            Role::Doctor => "Doctor",
            Role::Admin => "Admin",
        }
    }
}

impl FromStr for Role {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Role::Nurse, Role::Doctor, Role::Admin]
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BackendError::validation("role", "must be one of Nurse, Doctor, or Admin"))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A staff account.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Staff {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,

    #[serde(skip)]
    pub password_hash: String,

    pub role: Role,

    /// The bank this staff member works at.
    pub location_id: i32,
}

/// A staff account ready to be stored.
#[derive(Clone, Debug)]
pub struct NewStaff {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub location_id: i32,
}

/// Changes to a staff member’s own profile.
#[derive(Clone, Debug)]
pub struct StaffUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub location_id: i32,
}

/// The fields submitted when registering a staff member. `location`
/// is a bank’s name.
#[derive(Clone, Debug, Deserialize)]
pub struct RegistrationForm {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub first_name: String,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub last_name: String,

    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub email: String,

    pub password: String,
    pub confirm_password: String,
    pub role: Role,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub location: String,
}

impl Validate for RegistrationForm {
    fn validate(&self) -> Result<(), BackendError> {
        validation::length("first_name", &self.first_name, 2, 20)?;
        validation::length("last_name", &self.last_name, 2, 20)?;
        validate_staff_email(&self.email)?;
        validation::min_length("password", &self.password, 5)?;
        validation::confirmed(&self.password, &self.confirm_password)?;

        Ok(())
    }
}

/// The fields submitted when staff update their own profile.
#[derive(Clone, Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub first_name: String,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub last_name: String,

    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub email: String,

    pub role: Role,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub location: String,
}

impl Validate for ProfileForm {
    fn validate(&self) -> Result<(), BackendError> {
        validation::length("first_name", &self.first_name, 2, 20)?;
        validation::length("last_name", &self.last_name, 2, 20)?;
        validate_staff_email(&self.email)?;

        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginForm {
    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub email: String,

    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResetRequestForm {
    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub email: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub password: String,
    pub confirm_password: String,
}

impl Validate for ResetPasswordForm {
    fn validate(&self) -> Result<(), BackendError> {
        validation::min_length("password", &self.password, 5)?;
        validation::confirmed(&self.password, &self.confirm_password)
    }
}

fn validate_staff_email(email: &str) -> Result<(), BackendError> {
    validation::length("email", email, 5, 25)?;
    validation::email("email", email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("nurse".parse::<Role>().unwrap(), Role::Nurse);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("Janitor".parse::<Role>().is_err());
    }

    #[test]
    fn password_hashes_are_never_serialized() {
        let staff = Staff {
            id: 1,
            first_name: "Ann".to_owned(),
            last_name: "Smith".to_owned(),
            email: "ann@bank.org".to_owned(),
            password_hash: "$2b$04$secret".to_owned(),
            role: Role::Nurse,
            location_id: 1,
        };

        let json = serde_json::to_string(&staff).unwrap();

        assert!(!json.contains("secret"));
        assert!(json.contains("\"role\":\"Nurse\""));
    }

    #[test]
    fn registration_checks_passwords() {
        let form: RegistrationForm = serde_json::from_str(
            r#"{"first_name": "Ann", "last_name": "Smith", "email": "ann@bank.org", "password": "hunter2", "confirm_password": "hunter3", "role": "Nurse", "location": "Downtown"}"#,
        )
        .unwrap();

        assert!(form.validate().is_err());

        let form = RegistrationForm {
            confirm_password: "hunter2".to_owned(),
            ..form
        };
        assert!(form.validate().is_ok());

        let form = RegistrationForm {
            password: "abc".to_owned(),
            confirm_password: "abc".to_owned(),
            ..form
        };
        assert!(form.validate().is_err());
    }
}
