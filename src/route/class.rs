use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::class::{Class, ClassCreateData, ClassUpdateData};
use crate::data::schedule::{Schedule, ScheduleData};
use crate::data::user::User;
use crate::data::Page;
use crate::portal::Portal;
use crate::resp::problem::Problem;
use crate::session::Session;

#[utoipa::path(
    request_body = ClassCreateData,
    responses(
        (status = 200, description = "Created class", body = Class),
        (status = 403, body = Problem),
        (status = 422, body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/classes", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn class_create(
    data: Json<ClassCreateData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Class>, Problem> {
    Ok(Json(
        portal
            .classes()
            .create(&session.principal, data.into_inner())
            .await?,
    ))
}

/// All classes, latest academic year first
#[utoipa::path(responses((status = 200, body = Vec<Class>)), security(("jwt" = [])))]
#[get("/classes")]
#[tracing::instrument]
pub async fn class_list(
    page: Page,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Class>>, Problem> {
    Ok(Json(portal.classes().list_all(&session.principal, page).await?))
}

#[utoipa::path(
    responses(
        (status = 200, body = Class),
        (status = 403, body = Problem),
        (status = 404, body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/classes/<id>")]
#[tracing::instrument]
pub async fn class_get(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Class>, Problem> {
    Ok(Json(portal.classes().get(&session.principal, id).await?))
}

#[utoipa::path(
    request_body = ClassUpdateData,
    responses((status = 200, body = Class)),
    security(("jwt" = []))
)]
#[put("/classes/<id>", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn class_update(
    id: &str,
    data: Json<ClassUpdateData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Class>, Problem> {
    Ok(Json(
        portal
            .classes()
            .update(&session.principal, id, data.into_inner())
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<User>)), security(("jwt" = [])))]
#[get("/classes/<id>/students")]
#[tracing::instrument]
pub async fn class_students(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<User>>, Problem> {
    Ok(Json(portal.classes().students(&session.principal, id).await?))
}

#[utoipa::path(responses((status = 200, body = Vec<User>)), security(("jwt" = [])))]
#[get("/classes/<id>/teachers")]
#[tracing::instrument]
pub async fn class_teachers(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<User>>, Problem> {
    Ok(Json(portal.classes().teachers(&session.principal, id).await?))
}

/// Enroll a student into a class
#[utoipa::path(responses((status = 200, body = Class)), security(("jwt" = [])))]
#[put("/classes/<id>/students/<user_id>")]
#[tracing::instrument]
pub async fn class_add_student(
    id: &str,
    user_id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Class>, Problem> {
    Ok(Json(
        portal
            .classes()
            .add_student(&session.principal, id, user_id)
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Class)), security(("jwt" = [])))]
#[delete("/classes/<id>/students/<user_id>")]
#[tracing::instrument]
pub async fn class_remove_student(
    id: &str,
    user_id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Class>, Problem> {
    Ok(Json(
        portal
            .classes()
            .remove_student(&session.principal, id, user_id)
            .await?,
    ))
}

/// Assign a teacher to a class
#[utoipa::path(responses((status = 200, body = Class)), security(("jwt" = [])))]
#[put("/classes/<id>/teachers/<user_id>")]
#[tracing::instrument]
pub async fn class_add_teacher(
    id: &str,
    user_id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Class>, Problem> {
    Ok(Json(
        portal
            .classes()
            .add_teacher(&session.principal, id, user_id)
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Class)), security(("jwt" = [])))]
#[delete("/classes/<id>/teachers/<user_id>")]
#[tracing::instrument]
pub async fn class_remove_teacher(
    id: &str,
    user_id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Class>, Problem> {
    Ok(Json(
        portal
            .classes()
            .remove_teacher(&session.principal, id, user_id)
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<Class>)), security(("jwt" = [])))]
#[get("/students/<id>/classes")]
#[tracing::instrument]
pub async fn student_classes(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Class>>, Problem> {
    Ok(Json(portal.classes().for_student(&session.principal, id).await?))
}

#[utoipa::path(responses((status = 200, body = Vec<Class>)), security(("jwt" = [])))]
#[get("/teachers/<id>/classes")]
#[tracing::instrument]
pub async fn teacher_classes(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Class>>, Problem> {
    Ok(Json(portal.classes().for_teacher(&session.principal, id).await?))
}

#[utoipa::path(
    request_body = ScheduleData,
    responses(
        (status = 200, body = Schedule),
        (status = 422, description = "Slot ends before it starts", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/schedules", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn schedule_create(
    data: Json<ScheduleData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Schedule>, Problem> {
    Ok(Json(
        portal
            .schedules()
            .create(&session.principal, data.into_inner())
            .await?,
    ))
}

/// Weekly timetable of a class
#[utoipa::path(responses((status = 200, body = Vec<Schedule>)), security(("jwt" = [])))]
#[get("/classes/<id>/schedules")]
#[tracing::instrument]
pub async fn class_schedules(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Schedule>>, Problem> {
    Ok(Json(portal.schedules().for_class(&session.principal, id).await?))
}

#[utoipa::path(
    request_body = ScheduleData,
    responses((status = 200, body = Schedule)),
    security(("jwt" = []))
)]
#[put("/schedules/<id>", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn schedule_update(
    id: &str,
    data: Json<ScheduleData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Schedule>, Problem> {
    Ok(Json(
        portal
            .schedules()
            .update(&session.principal, id, data.into_inner())
            .await?,
    ))
}

#[utoipa::path(responses((status = 204)), security(("jwt" = [])))]
#[delete("/schedules/<id>")]
#[tracing::instrument]
pub async fn schedule_delete(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Status, Problem> {
    portal.schedules().delete(&session.principal, id).await?;
    Ok(Status::NoContent)
}

#[cfg(test)]
mod class_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use crate::data::class::Class;
    use crate::route::testing::{bearer, bootstrap_coordinator, test_client};

    #[rocket::async_test]
    async fn coordinator_manages_classes() {
        let (client, _uploads) = test_client().await;
        let admin = bootstrap_coordinator(&client).await;

        let created = client
            .post("/api/v1/classes")
            .header(ContentType::JSON)
            .header(bearer(&admin.token))
            .body(json!({ "name": "7.B", "academic_year": 2024 }).to_string())
            .dispatch()
            .await;
        assert_eq!(created.status(), Status::Ok);
        let class: Class = created.into_json().await.expect("class json");

        let renamed: Class = client
            .put(format!("/api/v1/classes/{}", class.id))
            .header(ContentType::JSON)
            .header(bearer(&admin.token))
            .body(json!({ "name": "7.C" }).to_string())
            .dispatch()
            .await
            .into_json()
            .await
            .expect("updated class json");
        assert_eq!(renamed.name, "7.C");
        assert_eq!(renamed.academic_year, 2024);

        let missing = client
            .get("/api/v1/classes/000000000000000000000000")
            .header(bearer(&admin.token))
            .dispatch()
            .await;
        assert_eq!(missing.status(), Status::NotFound);

        let invalid = client
            .post("/api/v1/schedules")
            .header(ContentType::JSON)
            .header(bearer(&admin.token))
            .body(
                json!({
                    "class_id": class.id,
                    "subject_id": "none",
                    "teacher_id": "none",
                    "weekday": "monday",
                    "starts": "10:00:00",
                    "ends": "09:00:00",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(invalid.status(), Status::UnprocessableEntity);
    }
}
