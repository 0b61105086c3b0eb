use serde::Deserialize;

use crate::blood::{BloodType, Kind};
use crate::errors::BackendError;
use crate::normalization;
use crate::withdrawal::Quantity;

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    page: Option<u32>,
    per_page: Option<u32>,
}

impl Pagination {
    /// Returns the page number and page size, both counted from 1.
    pub fn resolve(&self) -> Result<(u32, u32), BackendError> {
        let page = self.page.unwrap_or(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE);

        if page == 0 {
            return Err(BackendError::validation("page", "must be at least 1"));
        }

        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(BackendError::validation(
                "per_page",
                format!("must be between 1 and {}", MAX_PER_PAGE),
            ));
        }

        Ok((page, per_page))
    }
}

#[derive(Debug, Deserialize)]
pub struct DonorLookupQuery {
    pub donor_id: Option<i32>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub first_name: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub last_name: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_email_option")]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    pub location_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct DonationRequest {
    pub kind: Kind,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub blood_type: BloodType,
    pub kind: Kind,
    pub units: Units,
}

/// A requested quantity as submitted: `"All"`, `"3"`, or `3`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Units {
    Count(i64),
    Text(String),
}

impl Units {
    pub fn parse(&self) -> Result<Quantity, BackendError> {
        match self {
            Units::Count(n) => n.to_string().parse(),
            Units::Text(s) => s.parse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_bounds() {
        assert_eq!(Pagination::default().resolve().unwrap(), (1, 20));

        let p = |page, per_page| Pagination { page, per_page }.resolve();

        assert_eq!(p(Some(3), Some(100)).unwrap(), (3, 100));
        assert!(p(Some(0), None).is_err());
        assert!(p(None, Some(0)).is_err());
        assert!(p(None, Some(101)).is_err());
    }

    #[tokio::test]
    async fn lookup_queries_are_normalized() {
        let query = warp::test::request()
            .path("/?first_name=%20Zoe%CC%88%20&last_name=+&email=Zoe@Example.ORG")
            .filter(&warp::query::<DonorLookupQuery>())
            .await
            .unwrap();

        assert_eq!(query.donor_id, None);
        assert_eq!(query.first_name.as_deref(), Some("Zo\u{00eb}"));
        assert_eq!(query.last_name, None);
        assert_eq!(query.email.as_deref(), Some("zoe@example.org"));

        let query = warp::test::request()
            .path("/?donor_id=4")
            .filter(&warp::query::<DonorLookupQuery>())
            .await
            .unwrap();

        assert_eq!(query.donor_id, Some(4));
        assert_eq!(query.first_name, None);
    }

    #[test]
    fn units_accept_numbers_and_text() {
        let parse = |json: &str| {
            serde_json::from_str::<Units>(json)
                .unwrap()
                .parse()
        };

        assert_eq!(parse("3").unwrap(), Quantity::Units(3));
        assert_eq!(parse("\"3\"").unwrap(), Quantity::Units(3));
        assert_eq!(parse("\" ALL \"").unwrap(), Quantity::All);
        assert!(parse("-2").is_err());
        assert!(parse("\"lots\"").is_err());
    }
}
