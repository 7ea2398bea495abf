use rocket::serde::json::Json;
use rocket::State;

use crate::data::grade::{Grade, GradeBatch, GradeUpdateData, NewGrade};
use crate::portal::Portal;
use crate::resp::problem::Problem;
use crate::session::Session;

/// Record one assessment for several students at once
///
/// Nothing is written if any entry is rejected.
#[utoipa::path(
    request_body = GradeBatch,
    responses(
        (status = 200, body = Vec<Grade>),
        (status = 403, body = Problem),
        (
            status = 422,
            description = "Value outside 0 to 10 or student not enrolled",
            body = Problem
        ),
    ),
    security(("jwt" = []))
)]
#[post("/grades/batch", format = "application/json", data = "<batch>")]
#[tracing::instrument]
pub async fn grade_batch(
    batch: Json<GradeBatch>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Grade>>, Problem> {
    Ok(Json(
        portal
            .grades()
            .record_batch(&session.principal, batch.into_inner())
            .await?,
    ))
}

#[utoipa::path(
    request_body = NewGrade,
    responses((status = 200, body = Grade)),
    security(("jwt" = []))
)]
#[post("/grades", format = "application/json", data = "<grade>")]
#[tracing::instrument]
pub async fn grade_record(
    grade: Json<NewGrade>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Grade>, Problem> {
    Ok(Json(
        portal
            .grades()
            .record(&session.principal, grade.into_inner())
            .await?,
    ))
}

#[utoipa::path(
    request_body = GradeUpdateData,
    responses((status = 200, body = Grade)),
    security(("jwt" = []))
)]
#[put("/grades/<id>", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn grade_update(
    id: &str,
    data: Json<GradeUpdateData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Grade>, Problem> {
    Ok(Json(
        portal
            .grades()
            .update(&session.principal, id, data.into_inner())
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<Grade>)), security(("jwt" = [])))]
#[get("/students/<id>/grades?<class_id>&<subject_id>")]
#[tracing::instrument]
pub async fn student_grades(
    id: &str,
    class_id: Option<&str>,
    subject_id: Option<&str>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Grade>>, Problem> {
    Ok(Json(
        portal
            .grades()
            .for_student(&session.principal, id, class_id, subject_id)
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<Grade>)), security(("jwt" = [])))]
#[get("/classes/<id>/subjects/<subject_id>/grades")]
#[tracing::instrument]
pub async fn class_subject_grades(
    id: &str,
    subject_id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Grade>>, Problem> {
    Ok(Json(
        portal
            .grades()
            .for_class_subject(&session.principal, id, subject_id)
            .await?,
    ))
}
