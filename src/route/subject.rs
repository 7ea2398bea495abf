use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::subject::{Subject, SubjectData};
use crate::data::Page;
use crate::portal::Portal;
use crate::resp::problem::Problem;
use crate::session::Session;

#[utoipa::path(
    request_body = SubjectData,
    responses((status = 200, body = Subject), (status = 403, body = Problem)),
    security(("jwt" = []))
)]
#[post("/subjects", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn subject_create(
    data: Json<SubjectData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Subject>, Problem> {
    Ok(Json(
        portal
            .subjects()
            .create(&session.principal, data.into_inner())
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<Subject>)), security(("jwt" = [])))]
#[get("/subjects")]
#[tracing::instrument]
pub async fn subject_list(
    page: Page,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Subject>>, Problem> {
    Ok(Json(portal.subjects().list_all(&session.principal, page).await?))
}

#[utoipa::path(
    responses((status = 200, body = Subject), (status = 404, body = Problem)),
    security(("jwt" = []))
)]
#[get("/subjects/<id>")]
#[tracing::instrument]
pub async fn subject_get(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Subject>, Problem> {
    Ok(Json(portal.subjects().get(&session.principal, id).await?))
}

#[utoipa::path(
    request_body = SubjectData,
    responses((status = 200, body = Subject)),
    security(("jwt" = []))
)]
#[put("/subjects/<id>", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn subject_update(
    id: &str,
    data: Json<SubjectData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Subject>, Problem> {
    Ok(Json(
        portal
            .subjects()
            .update(&session.principal, id, data.into_inner())
            .await?,
    ))
}

#[utoipa::path(responses((status = 204)), security(("jwt" = [])))]
#[delete("/subjects/<id>")]
#[tracing::instrument]
pub async fn subject_delete(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Status, Problem> {
    portal.subjects().delete(&session.principal, id).await?;
    Ok(Status::NoContent)
}
