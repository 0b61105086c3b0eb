use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, o};
use time::OffsetDateTime;
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::auth::{self, StaffContext, RESET_TOKEN_LIFETIME};
use crate::bank::BankForm;
use crate::donation::DonationOutcome;
use crate::donor::{DonorForm, DonorLookup};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::mail::{self, Email};
use crate::routes::{
    query::{DonationRequest, DonorLookupQuery, InventoryQuery, Pagination, WithdrawalRequest},
    rejection::{Context, Rejection},
    response::{DonorView, SuccessResponse},
};
use crate::staff::{
    LoginForm, NewStaff, ProfileForm, RegistrationForm, ResetPasswordForm, ResetRequestForm,
    StaffUpdate,
};
use crate::validation::Validate;

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn authenticate(
    environment: Environment,
    authorization: Option<String>,
) -> Result<StaffContext, reject::Rejection> {
    let error_handler = |e: BackendError| Rejection::new(Context::Authenticate, e);

    let token = auth::parse_bearer(authorization.as_deref()).map_err(error_handler)?;

    let staff = environment
        .db
        .retrieve_session(token, OffsetDateTime::now_utc())
        .await
        .map_err(error_handler)?
        .ok_or_else(|| error_handler(BackendError::Unauthorized))?;

    Ok(staff)
}

pub async fn list_banks(environment: Environment) -> RouteResult {
    timed! {
        let banks = environment
            .db
            .list_banks()
            .await
            .map_err(|e| Rejection::new(Context::ListBanks, e))?;

        json(&banks)
    }
}

pub async fn create_bank(
    environment: Environment,
    staff: StaffContext,
    form: BankForm,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::CreateBank, e);

        form.validate().map_err(error_handler)?;
        debug!(environment.logger, "Creating bank..."; "staff_id" => staff.staff_id, "location" => &form.location);

        let BankForm { location, manager_id } = form;

        let bank = environment
            .db
            .create_bank(location, manager_id)
            .await
            .map_err(error_handler)?;

        with_status(json(&bank), StatusCode::CREATED)
    }
}

pub async fn register(environment: Environment, form: RegistrationForm) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Register, e);

        form.validate().map_err(error_handler)?;

        let RegistrationForm {
            first_name,
            last_name,
            email,
            password,
            role,
            location,
            ..
        } = form;

        let bank = environment
            .db
            .find_bank(&location)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::UnknownBank(location.clone())))?;

        let password_hash = auth::hash_password_blocking(password, environment.config.bcrypt_cost)
            .await
            .map_err(error_handler)?;

        let staff = environment
            .db
            .create_staff(NewStaff {
                first_name,
                last_name,
                email,
                password_hash,
                role,
                location_id: bank.id,
            })
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Registered staff member"; "staff_id" => staff.id, "location_id" => bank.id);

        with_status(json(&staff), StatusCode::CREATED)
    }
}

pub async fn login(environment: Environment, form: LoginForm) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Login, e);

        let LoginForm { email, password } = form;

        let staff = environment
            .db
            .find_staff(&email)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::InvalidCredentials))?;

        let verified = auth::verify_password_blocking(password, staff.password_hash.clone())
            .await
            .map_err(error_handler)?;

        if !verified {
            return Err(error_handler(BackendError::InvalidCredentials).into());
        };

        let expires_at = OffsetDateTime::now_utc() + environment.config.session_lifetime;
        let token = environment
            .db
            .create_session(staff.id, expires_at)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Logged in"; "staff_id" => staff.id);

        json(&SuccessResponse::Session {
            token,
            expires_at,
            staff,
        })
    }
}

pub async fn logout(environment: Environment, staff: StaffContext) -> RouteResult {
    timed! {
        environment
            .db
            .delete_session(staff.session)
            .await
            .map_err(|e| Rejection::new(Context::Logout, e))?;

        debug!(environment.logger, "Logged out"; "staff_id" => staff.staff_id);

        StatusCode::NO_CONTENT
    }
}

pub async fn current_staff(environment: Environment, staff: StaffContext) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::CurrentStaff, e);

        let staff = environment
            .db
            .retrieve_staff(staff.staff_id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::UnknownStaff(staff.staff_id)))?;

        json(&staff)
    }
}

pub async fn update_staff(
    environment: Environment,
    staff: StaffContext,
    form: ProfileForm,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::UpdateStaff, e);

        form.validate().map_err(error_handler)?;

        let ProfileForm {
            first_name,
            last_name,
            email,
            role,
            location,
        } = form;

        let bank = environment
            .db
            .find_bank(&location)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::UnknownBank(location.clone())))?;

        let updated = environment
            .db
            .update_staff(
                staff.staff_id,
                StaffUpdate {
                    first_name,
                    last_name,
                    email,
                    role,
                    location_id: bank.id,
                },
            )
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Updated profile"; "staff_id" => staff.staff_id);

        json(&updated)
    }
}

pub async fn request_reset(environment: Environment, form: ResetRequestForm) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::RequestReset, e);

        let staff = environment
            .db
            .find_staff(&form.email)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| {
                error_handler(BackendError::validation(
                    "email",
                    "There is no account with that email. You must register first.",
                ))
            })?;

        let token = environment
            .db
            .create_reset_token(staff.id, OffsetDateTime::now_utc() + RESET_TOKEN_LIFETIME)
            .await
            .map_err(error_handler)?;

        let link = environment.urls.reset_password(&token).map_err(|e| {
            error_handler(BackendError::InvalidVariable {
                name: "BACKEND_BASE_URL".to_owned(),
                message: e.to_string(),
            })
        })?;

        let logger = environment.logger.new(o!("staff_id" => staff.id));
        debug!(logger, "Sending password reset");
        mail::dispatch(
            Arc::new(logger),
            environment.mailer.clone(),
            Email::password_reset(&staff, &link),
        );

        with_status(
            json(&SuccessResponse::Message {
                message: "An email has been sent with instructions to reset your password.",
            }),
            StatusCode::ACCEPTED,
        )
    }
}

pub async fn reset_password(
    environment: Environment,
    token: Uuid,
    form: ResetPasswordForm,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::ResetPassword, e);

        form.validate().map_err(error_handler)?;

        let password_hash = auth::hash_password_blocking(form.password, environment.config.bcrypt_cost)
            .await
            .map_err(error_handler)?;

        let staff_id = environment
            .db
            .reset_password(token, password_hash, OffsetDateTime::now_utc())
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Reset password"; "staff_id" => staff_id);

        json(&SuccessResponse::Message {
            message: "Your password has been updated! You are now able to log in.",
        })
    }
}

pub async fn list_donors(
    environment: Environment,
    staff: StaffContext,
    pagination: Pagination,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::ListDonors, e);

        let (page, per_page) = pagination.resolve().map_err(error_handler)?;
        debug!(environment.logger, "Listing donors..."; "staff_id" => staff.staff_id, "page" => page, "per_page" => per_page);

        let offset = i64::from(page - 1) * i64::from(per_page);
        let (donors, total) = environment
            .db
            .list_donors(offset, i64::from(per_page))
            .await
            .map_err(error_handler)?;

        let now = OffsetDateTime::now_utc();

        json(&SuccessResponse::Donors {
            page,
            per_page,
            total,
            donors: donors.into_iter().map(|d| DonorView::new(d, now)).collect(),
        })
    }
}

pub async fn create_donor(
    environment: Environment,
    staff: StaffContext,
    form: DonorForm,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::CreateDonor, e);

        form.validate().map_err(error_handler)?;

        let donor = environment
            .db
            .create_donor(form)
            .await
            .map_err(error_handler)?;

        let logger = environment.logger.new(o!("donor_id" => donor.id));
        debug!(logger, "Donor added to database"; "staff_id" => staff.staff_id);

        mail::dispatch(
            Arc::new(logger),
            environment.mailer.clone(),
            Email::welcome(&donor),
        );

        with_status(
            json(&DonorView::new(donor, OffsetDateTime::now_utc())),
            StatusCode::CREATED,
        )
    }
}

pub async fn lookup_donor(
    environment: Environment,
    staff: StaffContext,
    query: DonorLookupQuery,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::LookupDonor, e);

        let DonorLookupQuery {
            donor_id,
            first_name,
            last_name,
            email,
        } = query;

        let lookup = DonorLookup::new(donor_id, first_name, last_name, email).map_err(error_handler)?;
        debug!(environment.logger, "Looking up donor..."; "staff_id" => staff.staff_id, "lookup" => ?lookup);

        let donor = environment
            .db
            .lookup_donor(lookup)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NoMatchingDonor))?;

        json(&DonorView::new(donor, OffsetDateTime::now_utc()))
    }
}

pub async fn retrieve_donor(
    environment: Environment,
    id: i32,
    staff: StaffContext,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::retrieve_donor(id), e);
        debug!(environment.logger, "Retrieving donor..."; "staff_id" => staff.staff_id, "donor_id" => id);

        let donor = environment
            .db
            .retrieve_donor(id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::UnknownDonor(id)))?;

        json(&DonorView::new(donor, OffsetDateTime::now_utc()))
    }
}

pub async fn update_donor(
    environment: Environment,
    id: i32,
    staff: StaffContext,
    form: DonorForm,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::update_donor(id), e);

        form.validate().map_err(error_handler)?;
        debug!(environment.logger, "Updating donor..."; "staff_id" => staff.staff_id, "donor_id" => id);

        let donor = environment
            .db
            .update_donor(id, form)
            .await
            .map_err(error_handler)?;

        json(&DonorView::new(donor, OffsetDateTime::now_utc()))
    }
}

pub async fn record_donation(
    environment: Environment,
    id: i32,
    staff: StaffContext,
    request: DonationRequest,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::record_donation(id), e);
        let kind = request.kind;

        let logger = environment.logger.new(o!("donor_id" => id, "kind" => kind.as_str()));
        debug!(logger, "Recording donation..."; "staff_id" => staff.staff_id, "location_id" => staff.location_id);

        let outcome = environment
            .db
            .record_donation(id, kind, staff.location_id, OffsetDateTime::now_utc())
            .await
            .map_err(error_handler)?;

        match outcome {
            DonationOutcome::Recorded(donation) => {
                debug!(logger, "Donation recorded"; "donation_id" => donation.id);
                let message = format!("A unit of {} {} has been added to inventory", donation.blood_type, kind);

                with_status(
                    json(&SuccessResponse::Donation {
                        recorded: true,
                        donation: Some(donation),
                        next_eligible: None,
                        message,
                    }),
                    StatusCode::CREATED,
                )
            }
            DonationOutcome::NotYet { next_eligible } => {
                debug!(logger, "Donor not yet eligible"; "next_eligible" => next_eligible.unix_timestamp());
                let message = format!(
                    "This donor cannot give {} until {}",
                    kind,
                    next_eligible.format("%F")
                );

                with_status(
                    json(&SuccessResponse::Donation {
                        recorded: false,
                        donation: None,
                        next_eligible: Some(next_eligible),
                        message,
                    }),
                    StatusCode::OK,
                )
            }
        }
    }
}

pub async fn inventory(
    environment: Environment,
    staff: StaffContext,
    query: InventoryQuery,
) -> RouteResult {
    timed! {
        let InventoryQuery { location_id } = query;
        debug!(environment.logger, "Counting inventory..."; "staff_id" => staff.staff_id, "location_id" => ?location_id);

        let units = environment
            .db
            .inventory(location_id)
            .await
            .map_err(|e| Rejection::new(Context::Inventory, e))?;

        json(&SuccessResponse::Inventory { location_id, units })
    }
}

pub async fn withdraw(
    environment: Environment,
    staff: StaffContext,
    request: WithdrawalRequest,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::Withdraw, e);

        let quantity = request.units.parse().map_err(error_handler)?;

        let logger = environment.logger.new(o!(
            "blood_type" => request.blood_type.as_str(),
            "kind" => request.kind.as_str(),
            "quantity" => quantity.to_string()
        ));
        debug!(logger, "Withdrawing units..."; "staff_id" => staff.staff_id);

        let shipment = environment
            .db
            .withdraw(request.blood_type, request.kind, quantity)
            .await
            .map_err(error_handler)?;

        debug!(logger, "Withdrawal complete"; "shipped" => shipment.shipped, "available" => shipment.available);

        let message = shipment.message();
        json(&SuccessResponse::Withdrawal { shipment, message })
    }
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
