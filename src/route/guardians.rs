use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::guardian::{GuardianLink, LinkCreateData, LinkedUser};
use crate::portal::Portal;
use crate::resp::problem::Problem;
use crate::session::Session;

/// Link a guardian to a student. The first link of a student is primary.
#[utoipa::path(
    request_body = LinkCreateData,
    responses(
        (status = 200, body = GuardianLink),
        (status = 422, description = "Already linked or wrong roles", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/guardian-links", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn guardian_link(
    data: Json<LinkCreateData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<GuardianLink>, Problem> {
    Ok(Json(
        portal
            .guardians()
            .link(&session.principal, data.into_inner())
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<LinkedUser>)), security(("jwt" = [])))]
#[get("/guardians/<id>/students")]
#[tracing::instrument]
pub async fn guardian_students(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<LinkedUser>>, Problem> {
    Ok(Json(portal.guardians().students_of(&session.principal, id).await?))
}

#[utoipa::path(responses((status = 200, body = Vec<LinkedUser>)), security(("jwt" = [])))]
#[get("/students/<id>/guardians")]
#[tracing::instrument]
pub async fn student_guardians(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<LinkedUser>>, Problem> {
    Ok(Json(portal.guardians().guardians_of(&session.principal, id).await?))
}

#[utoipa::path(responses((status = 204), (status = 404, body = Problem)), security(("jwt" = [])))]
#[delete("/guardian-links/<id>")]
#[tracing::instrument]
pub async fn guardian_unlink(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Status, Problem> {
    portal.guardians().unlink(&session.principal, id).await?;
    Ok(Status::NoContent)
}
