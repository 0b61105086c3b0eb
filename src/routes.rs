use std::sync::Arc;

use log::{debug, error, Logger};
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The largest JSON body to accept.
const MAX_CONTENT_LENGTH: u64 = 64 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if status.is_server_error() {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        } else {
            debug!(logger, "Request refused"; "context" => ?r.context, "status" => %status, "message" => %r.error);
        }

        return Ok(with_status(json(&r.flatten()), status));
    }

    if let Some(e) = rej.find::<BodyDeserializeError>() {
        debug!(logger, "Malformed body"; "error" => %e);
        let flattened = rejection::FlattenedRejection::malformed(e);

        return Ok(with_status(json(&flattened), StatusCode::BAD_REQUEST));
    }

    if let Some(e) = rej.find::<reject::InvalidQuery>() {
        debug!(logger, "Malformed query"; "error" => %e);
        let flattened = rejection::FlattenedRejection::malformed(e);

        return Ok(with_status(json(&flattened), StatusCode::BAD_REQUEST));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        InvalidBloodType(..) | InvalidKind(..) | MalformedQuantity(..) | Validation { .. } => {
            StatusCode::BAD_REQUEST
        }
        InvalidCredentials | Unauthorized => StatusCode::UNAUTHORIZED,
        EmailAlreadyExists | LocationAlreadyExists => StatusCode::CONFLICT,
        UnknownDonor(..) | UnknownStaff(..) | UnknownBank(..) | NoMatchingDonor
        | InvalidResetToken => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use serde::de::DeserializeOwned;
    use uuid::Uuid;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{get as g, path as p, post, put, query};

    use super::{format_rejection, handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::auth::StaffContext;
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
        ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
        ($route_variable:ident; $first:expr, $($rest:expr),+) => (
            let $route_variable = $route_variable.and($first);
            route_filter!($route_variable; $($rest),+);
        )
    }

    macro_rules! route {
        ($name:ident => $handler:ident, $env:ident, $route_variable:ident; $($filters:expr),+) => (
            pub fn $name($env: Environment) -> Route {
                let $route_variable = warp::any().map({
                    let $env = $env.clone();
                    move || $env.clone()
                });

                route_filter!($route_variable; $($filters),+);

                $route_variable.and_then(handlers::$handler)
                    .boxed()
            }
        );
    }

    /// Resolves the bearer token on the request to the staff member
    /// making it.
    fn staff(
        environment: Environment,
    ) -> impl Filter<Extract = (StaffContext,), Error = warp::Rejection> + Clone {
        warp::header::optional::<String>("authorization").and_then(
            move |authorization: Option<String>| {
                let environment = environment.clone();

                async move { handlers::authenticate(environment, authorization).await }
            },
        )
    }

    fn json_body<T: DeserializeOwned + Send>(
    ) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
        warp::body::content_length_limit(MAX_CONTENT_LENGTH).and(warp::body::json())
    }

    route!(make_list_banks_route => list_banks, env, rt; p("banks"), end(), g());
    route!(make_create_bank_route => create_bank, env, rt; p("banks"), end(), post(), staff(env.clone()), json_body());

    route!(make_register_route => register, env, rt; p("staff"), end(), post(), json_body());
    route!(make_login_route => login, env, rt; p!("staff" / "login"), post(), json_body());
    route!(make_logout_route => logout, env, rt; p!("staff" / "logout"), post(), staff(env.clone()));
    route!(make_current_staff_route => current_staff, env, rt; p!("staff" / "me"), g(), staff(env.clone()));
    route!(make_update_staff_route => update_staff, env, rt; p!("staff" / "me"), put(), staff(env.clone()), json_body());
    route!(make_request_reset_route => request_reset, env, rt; p!("staff" / "reset_password"), post(), json_body());
    route!(make_reset_password_route => reset_password, env, rt; p!("staff" / "reset_password" / Uuid), post(), json_body());

    route!(make_list_donors_route => list_donors, env, rt; p("donors"), end(), g(), staff(env.clone()), query::<q::Pagination>());
    route!(make_create_donor_route => create_donor, env, rt; p("donors"), end(), post(), staff(env.clone()), json_body());
    route!(make_lookup_donor_route => lookup_donor, env, rt; p!("donors" / "lookup"), g(), staff(env.clone()), query::<q::DonorLookupQuery>());
    route!(make_retrieve_donor_route => retrieve_donor, env, rt; p!("donors" / i32), g(), staff(env.clone()));
    route!(make_update_donor_route => update_donor, env, rt; p!("donors" / i32), put(), staff(env.clone()), json_body());
    route!(make_record_donation_route => record_donation, env, rt; p!("donors" / i32 / "donations"), post(), staff(env.clone()), json_body());

    route!(make_inventory_route => inventory, env, rt; p("inventory"), end(), g(), staff(env.clone()), query::<q::InventoryQuery>());
    route!(make_withdrawal_route => withdraw, env, rt; p!("inventory" / "withdrawals"), post(), staff(env.clone()), json_body());

    /// Every route on the main port, with errors rendered as JSON.
    pub fn api(environment: Environment) -> Route {
        let logger = environment.logger.clone();

        make_list_banks_route(environment.clone())
            .or(make_create_bank_route(environment.clone()))
            .unify()
            .or(make_register_route(environment.clone()))
            .unify()
            .or(make_login_route(environment.clone()))
            .unify()
            .or(make_logout_route(environment.clone()))
            .unify()
            .or(make_current_staff_route(environment.clone()))
            .unify()
            .or(make_update_staff_route(environment.clone()))
            .unify()
            .or(make_request_reset_route(environment.clone()))
            .unify()
            .or(make_reset_password_route(environment.clone()))
            .unify()
            .or(make_list_donors_route(environment.clone()))
            .unify()
            .or(make_create_donor_route(environment.clone()))
            .unify()
            .or(make_lookup_donor_route(environment.clone()))
            .unify()
            .or(make_retrieve_donor_route(environment.clone()))
            .unify()
            .or(make_update_donor_route(environment.clone()))
            .unify()
            .or(make_record_donation_route(environment.clone()))
            .unify()
            .or(make_inventory_route(environment.clone()))
            .unify()
            .or(make_withdrawal_route(environment))
            .unify()
            .recover(move |r| format_rejection(logger.clone(), r))
            .map(|reply| Box::new(reply) as Box<dyn Reply>)
            .boxed()
    }
}
