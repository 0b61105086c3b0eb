//! Password hashing and bearer sessions.

use time::Duration;
use tokio::task;
use uuid::Uuid;

use crate::errors::BackendError;

/// How long a password reset link stays valid.
pub const RESET_TOKEN_LIFETIME: Duration = Duration::minutes(30);

/// Who is making a request, and from which bank. Handed to every
/// operation that needs to know.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StaffContext {
    pub staff_id: i32,
    pub location_id: i32,

    /// The session the request was authenticated with.
    pub session: Uuid,
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, BackendError> {
    Ok(bcrypt::hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, BackendError> {
    Ok(bcrypt::verify(password, hash)?)
}

/// Runs `hash_password` on the blocking thread pool.
pub async fn hash_password_blocking(password: String, cost: u32) -> Result<String, BackendError> {
    task::spawn_blocking(move || hash_password(&password, cost)).await?
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool, BackendError> {
    task::spawn_blocking(move || verify_password(&password, &hash)).await?
}

/// Extracts the session token from an `Authorization: Bearer` header.
pub fn parse_bearer(header: Option<&str>) -> Result<Uuid, BackendError> {
    let header = header.ok_or(BackendError::Unauthorized)?.trim();

    let mut parts = header.splitn(2, ' ');

    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => {
            Uuid::parse_str(token.trim()).map_err(|_| BackendError::Unauthorized)
        }
        _ => Err(BackendError::Unauthorized),
    }
}
