use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use sqlx::postgres::PgPool;
use time::Duration;
use tokio::sync::mpsc;
use warp::Filter;

use bloodbank::config::{get_optional_variable, get_variable, parse_variable, parse_variable_or};
use bloodbank::db::PgDb;
use bloodbank::environment::{Config, Environment};
use bloodbank::mail::{LogMailer, Mailer, SmtpMailer};
use bloodbank::routes::{self, admin::Terminator};
use bloodbank::urls::Urls;
use log::{info, Logger};

const DEFAULT_SESSION_HOURS: i64 = 12;
const DEFAULT_BCRYPT_COST: u32 = 12;
const DEFAULT_SMTP_PORT: u16 = 587;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    #[cfg(feature = "env_logging")]
    let (logger, _guard) = log::initialize_env_logger()?;

    #[cfg(not(feature = "env_logging"))]
    let logger = log::initialize_logger();

    let main_port: u16 = parse_variable("BACKEND_PORT")?;
    let admin_port: u16 = parse_variable("BACKEND_ADMIN_PORT")?;

    info!(logger, "Starting {}...", info::describe(); "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let pool = PgPool::connect(&get_variable("BACKEND_DB_CONNECTION_STRING")?).await?;
    let db = Arc::new(PgDb::new(pool));

    let urls = Arc::new(Urls::new(get_variable("BACKEND_BASE_URL")?)?);
    let mailer = make_mailer(logger.clone())?;

    let config = Config::new(
        Duration::hours(parse_variable_or("BACKEND_SESSION_HOURS", DEFAULT_SESSION_HOURS)?),
        parse_variable_or("BACKEND_BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
    );
    let environment = Environment::new(logger.clone(), db, mailer, urls, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate: Terminator = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            // fails only once shutdown is already under way
            termination_sender.send(()).await.ok();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let (_, main_server) = warp::serve(routes::api(environment.clone()))
            .bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async move {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) = warp::serve(routes)
            .bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async move {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}

/// Sends mail through SMTP when `BACKEND_SMTP_SERVER` is set, and only
/// logs it otherwise.
fn make_mailer(logger: Arc<Logger>) -> Result<Arc<dyn Mailer>, Box<dyn Error>> {
    match get_optional_variable("BACKEND_SMTP_SERVER") {
        Some(server) => {
            let port = parse_variable_or("BACKEND_SMTP_PORT", DEFAULT_SMTP_PORT)?;
            info!(logger, "Sending mail via SMTP"; "server" => &server, "port" => port);

            Ok(Arc::new(SmtpMailer::new(
                &server,
                port,
                get_variable("BACKEND_SMTP_USERNAME")?,
                get_variable("BACKEND_SMTP_PASSWORD")?,
                &get_variable("BACKEND_MAIL_FROM")?,
            )?))
        }
        None => {
            info!(logger, "BACKEND_SMTP_SERVER is not set, logging mail instead of sending it");

            Ok(Arc::new(LogMailer::new(logger)))
        }
    }
}
