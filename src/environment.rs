use std::sync::Arc;

use log::Logger;
use time::Duration;

use crate::db::Db;
use crate::mail::Mailer;
use crate::urls::Urls;

#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub mailer: Arc<dyn Mailer>,
    pub urls: Arc<Urls>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        mailer: Arc<dyn Mailer>,
        urls: Arc<Urls>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            mailer,
            urls,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// How long a login lasts.
    pub(crate) session_lifetime: Duration,

    /// The bcrypt work factor for new password hashes.
    pub(crate) bcrypt_cost: u32,
}

impl Config {
    pub fn new(session_lifetime: Duration, bcrypt_cost: u32) -> Self {
        Self {
            session_lifetime,
            bcrypt_cost,
        }
    }
}
