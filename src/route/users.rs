use chrono::{DateTime, Utc};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::data::user::{ProfileUpdate, User};
use crate::data::Page;
use crate::portal::Portal;
use crate::resp::jwt::{session_cookie, AUTH_COOKIE_NAME};
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::session::{LoginData, ResetConfirmData, ResetRequestData, Session, SignupData};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        SessionResponse {
            token: session.token,
            expires_at: session.expires_at,
            user: session.profile,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActiveData {
    pub active: bool,
}

/// Register an account, consuming an enrollment code
#[utoipa::path(
    request_body = SignupData,
    responses(
        (status = 200, description = "Account created and signed in", body = SessionResponse),
        (status = 400, description = "Enrollment code invalid or used", body = Problem),
        (status = 422, description = "Invalid registration data", body = Problem),
    )
)]
#[post("/auth/signup", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn signup(
    data: Json<SignupData>,
    cookies: &CookieJar<'_>,
    portal: &State<Portal>,
) -> Result<Json<SessionResponse>, Problem> {
    let session = portal.identity().sign_up(data.into_inner()).await?;
    cookies.add(session_cookie(&session));
    Ok(Json(session.into()))
}

/// Sign in with e-mail and password
#[utoipa::path(
    request_body = LoginData,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 403, description = "Bad credentials or disabled account", body = Problem),
    )
)]
#[post("/auth/login", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn login(
    data: Json<LoginData>,
    cookies: &CookieJar<'_>,
    portal: &State<Portal>,
) -> Result<Json<SessionResponse>, Problem> {
    let session = portal
        .identity()
        .sign_in(&data.email, &data.password)
        .await?;
    cookies.add(session_cookie(&session));
    Ok(Json(session.into()))
}

/// Request a password reset token for an e-mail address
///
/// The response doesn't reveal whether the address is registered.
#[utoipa::path(
    request_body = ResetRequestData,
    responses((status = 202, description = "Reset token issued if the account exists"))
)]
#[post("/auth/reset", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn reset_request(
    data: Json<ResetRequestData>,
    portal: &State<Portal>,
) -> Result<Status, Problem> {
    portal.identity().request_reset(&data.email).await?;
    Ok(Status::Accepted)
}

/// Set a new password using a reset token
#[utoipa::path(
    request_body = ResetConfirmData,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 403, description = "Token invalid, used or expired", body = Problem),
        (status = 422, description = "Unacceptable password", body = Problem),
    )
)]
#[post("/auth/reset/confirm", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn reset_confirm(
    data: Json<ResetConfirmData>,
    portal: &State<Portal>,
) -> Result<Status, Problem> {
    portal
        .identity()
        .reset_password(&data.token, &data.password)
        .await?;
    Ok(Status::NoContent)
}

#[utoipa::path(responses((status = 204)), security(("jwt" = [])))]
#[post("/auth/logout")]
#[tracing::instrument]
pub async fn logout(session: Session, cookies: &CookieJar<'_>, portal: &State<Portal>) -> Status {
    portal.identity().sign_out(&session);
    cookies.remove(Cookie::named(AUTH_COOKIE_NAME));
    Status::NoContent
}

/// Profile of the signed in user
#[utoipa::path(responses((status = 200, body = User)), security(("jwt" = [])))]
#[get("/users/me")]
#[tracing::instrument]
pub async fn user_me(session: Session) -> Json<User> {
    Json(session.profile)
}

#[utoipa::path(
    responses(
        (status = 200, body = User),
        (status = 403, body = Problem),
        (status = 404, body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/users/<id>")]
#[tracing::instrument]
pub async fn user_get(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<User>, Problem> {
    Ok(Json(portal.users().get(&session.principal, id).await?))
}

/// List users with a role (coordinators only)
#[utoipa::path(responses((status = 200, body = Vec<User>)), security(("jwt" = [])))]
#[get("/users?<role>")]
#[tracing::instrument]
pub async fn user_list(
    role: Role,
    page: Page,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<User>>, Problem> {
    Ok(Json(
        portal
            .users()
            .list_by_role(&session.principal, role, page)
            .await?,
    ))
}

#[utoipa::path(
    request_body = ProfileUpdate,
    responses((status = 200, body = User)),
    security(("jwt" = []))
)]
#[put("/users/<id>", format = "application/json", data = "<update>")]
#[tracing::instrument]
pub async fn user_update(
    id: &str,
    update: Json<ProfileUpdate>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<User>, Problem> {
    Ok(Json(
        portal
            .users()
            .update_profile(&session.principal, id, update.into_inner())
            .await?,
    ))
}

/// Enable or disable an account
#[utoipa::path(
    request_body = ActiveData,
    responses((status = 200, body = User)),
    security(("jwt" = []))
)]
#[put("/users/<id>/active", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn user_set_active(
    id: &str,
    data: Json<ActiveData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<User>, Problem> {
    Ok(Json(
        portal
            .users()
            .set_active(&session.principal, id, data.active)
            .await?,
    ))
}
