use std::fmt;

use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

impl FlattenedRejection {
    /// For requests warp itself could not parse.
    pub fn malformed(e: &impl fmt::Display) -> Self {
        FlattenedRejection {
            context: Context::Request,
            message: e.to_string(),
        }
    }
}

/// The operation that failed, reported alongside the error message.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Context {
    Authenticate,
    CreateBank,
    CreateDonor,
    CurrentStaff,
    Inventory,
    ListBanks,
    ListDonors,
    Login,
    Logout,
    LookupDonor,
    RecordDonation { donor_id: i32 },
    Register,
    Request,
    RequestReset,
    ResetPassword,
    RetrieveDonor { id: i32 },
    UpdateDonor { id: i32 },
    UpdateStaff,
    Withdraw,
}

impl Context {
    pub fn record_donation(donor_id: i32) -> Context {
        Context::RecordDonation { donor_id }
    }

    pub fn retrieve_donor(id: i32) -> Context {
        Context::RetrieveDonor { id }
    }

    pub fn update_donor(id: i32) -> Context {
        Context::UpdateDonor { id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_name_the_operation() {
        let flattened = Rejection::new(Context::retrieve_donor(7), BackendError::UnknownDonor(7)).flatten();

        assert_eq!(
            serde_json::to_value(&flattened).unwrap(),
            serde_json::json!({
                "operation": "retrieve_donor",
                "id": 7,
                "message": "No donor with ID 7",
            })
        );

        let flattened = Rejection::new(Context::Withdraw, BackendError::MalformedQuantity("x".into())).flatten();

        assert_eq!(
            serde_json::to_value(&flattened).unwrap()["operation"],
            "withdraw"
        );
    }

    #[test]
    fn rejections_survive_conversion_to_warp() {
        let rejection: reject::Rejection =
            Rejection::new(Context::Logout, BackendError::Unauthorized).into();

        let found = rejection.find::<Rejection>().unwrap();
        assert!(matches!(found.context, Context::Logout));
        assert!(matches!(found.error, BackendError::Unauthorized));
    }
}
