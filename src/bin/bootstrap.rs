//! Creates the first bank and its manager. Registration needs an
//! existing bank and creating a bank needs an existing staff member,
//! so a fresh database has to start here.

use std::error::Error;

use dotenv::dotenv;
use sqlx::postgres::PgPool;
use structopt::StructOpt;

use bloodbank::auth::hash_password_blocking;
use bloodbank::config::{get_variable, parse_variable_or};
use bloodbank::db::{Db, PgDb};
use bloodbank::normalization::{normalize_email, normalize_name};
use bloodbank::staff::{NewStaff, RegistrationForm, Role};
use bloodbank::validation::{self, Validate};
use log::{debug, info, initialize_logger};

#[derive(Debug, StructOpt)]
#[structopt(name = "bootstrap", about = "Create a blood bank and the staff member who manages it")]
struct Opt {
    /// Where the bank is
    location: String,

    /// The manager’s email address
    email: String,

    #[structopt(long)]
    first_name: String,

    #[structopt(long)]
    last_name: String,

    /// The manager’s password; read from BOOTSTRAP_PASSWORD if omitted
    #[structopt(long)]
    password: Option<String>,

    #[structopt(long, default_value = "Admin")]
    role: Role,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();
    let logger = initialize_logger();

    let password = match opt.password {
        Some(password) => password,
        None => get_variable("BOOTSTRAP_PASSWORD")?,
    };

    let form = RegistrationForm {
        first_name: normalize_name(&opt.first_name),
        last_name: normalize_name(&opt.last_name),
        email: normalize_email(&opt.email),
        confirm_password: password.clone(),
        password,
        role: opt.role,
        location: normalize_name(&opt.location),
    };

    form.validate()?;
    validation::length("location", &form.location, 2, 20)?;

    debug!(logger, "Connecting to database...");
    let pool = PgPool::connect(&get_variable("BACKEND_DB_CONNECTION_STRING")?).await?;
    let db = PgDb::new(pool);

    let cost = parse_variable_or("BACKEND_BCRYPT_COST", 12)?;
    let password_hash = hash_password_blocking(form.password, cost).await?;

    info!(logger, "Creating bank..."; "location" => &form.location, "manager" => &form.email);

    let (bank, manager) = db
        .create_bank_with_manager(
            form.location,
            NewStaff {
                first_name: form.first_name,
                last_name: form.last_name,
                email: form.email,
                password_hash,
                role: form.role,
                location_id: 0,
            },
        )
        .await?;

    println!("{}", serde_json::json!({ "bank": bank, "manager": manager }));

    Ok(())
}
