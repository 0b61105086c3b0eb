use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::normalization;
use crate::validation::{self, Validate};

/// A blood bank location.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Bank {
    pub id: i32,
    pub location: String,
    pub manager_id: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BankForm {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub location: String,

    pub manager_id: i32,
}

impl Validate for BankForm {
    fn validate(&self) -> Result<(), BackendError> {
        validation::length("location", &self.location, 2, 20)
    }
}
