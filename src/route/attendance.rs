use rocket::serde::json::Json;
use rocket::State;

use crate::data::lesson::{AttendanceSummary, Lesson, NewLesson};
use crate::portal::Portal;
use crate::resp::problem::Problem;
use crate::session::Session;

/// Record a held lesson with presence for the whole class roster
#[utoipa::path(
    request_body = NewLesson,
    responses(
        (status = 200, body = Lesson),
        (status = 422, description = "Presence doesn't match the roster", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/lessons", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn lesson_record(
    data: Json<NewLesson>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Lesson>, Problem> {
    Ok(Json(
        portal
            .attendance()
            .record(&session.principal, data.into_inner())
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<Lesson>)), security(("jwt" = [])))]
#[get("/classes/<id>/lessons?<teacher_id>")]
#[tracing::instrument]
pub async fn class_lessons(
    id: &str,
    teacher_id: Option<&str>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Lesson>>, Problem> {
    let attendance = portal.attendance();
    let lessons = match teacher_id {
        Some(teacher_id) => {
            attendance
                .for_class_and_teacher(&session.principal, id, teacher_id)
                .await?
        }
        None => attendance.for_class(&session.principal, id).await?,
    };
    Ok(Json(lessons))
}

#[utoipa::path(responses((status = 200, body = AttendanceSummary)), security(("jwt" = [])))]
#[get("/students/<id>/attendance?<class_id>")]
#[tracing::instrument]
pub async fn student_attendance(
    id: &str,
    class_id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<AttendanceSummary>, Problem> {
    Ok(Json(
        portal
            .attendance()
            .for_student(&session.principal, id, class_id)
            .await?,
    ))
}
