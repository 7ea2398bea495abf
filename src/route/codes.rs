use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::data::enrollment::{CodeIssueData, EnrollmentCode};
use crate::data::Page;
use crate::portal::Portal;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::session::Session;

/// Issue a one-time enrollment code for a role
#[utoipa::path(
    request_body = CodeIssueData,
    responses(
        (status = 200, description = "Issued code", body = EnrollmentCode),
        (status = 403, body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/codes", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn code_issue(
    data: Json<CodeIssueData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<EnrollmentCode>, Problem> {
    Ok(Json(
        portal
            .enrollment()
            .issue(&session.principal, data.role)
            .await?,
    ))
}

/// Unused codes of a role, newest first
#[utoipa::path(responses((status = 200, body = Vec<EnrollmentCode>)), security(("jwt" = [])))]
#[get("/codes?<role>")]
#[tracing::instrument]
pub async fn code_list(
    role: Role,
    page: Page,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<EnrollmentCode>>, Problem> {
    Ok(Json(
        portal
            .enrollment()
            .list_available(&session.principal, role, page)
            .await?,
    ))
}

#[utoipa::path(responses((status = 204), (status = 404, body = Problem)), security(("jwt" = [])))]
#[delete("/codes/<id>")]
#[tracing::instrument]
pub async fn code_delete(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Status, Problem> {
    portal.enrollment().delete(&session.principal, id).await?;
    Ok(Status::NoContent)
}

#[cfg(test)]
mod code_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use crate::data::enrollment::EnrollmentCode;
    use crate::route::testing::{bearer, bootstrap_coordinator, test_client};
    use crate::route::users::SessionResponse;

    #[rocket::async_test]
    async fn issued_code_registers_a_teacher_once() {
        let (client, _uploads) = test_client().await;
        let admin = bootstrap_coordinator(&client).await;

        let issued = client
            .post("/api/v1/codes")
            .header(ContentType::JSON)
            .header(bearer(&admin.token))
            .body(json!({ "role": "teacher" }).to_string())
            .dispatch()
            .await;
        assert_eq!(issued.status(), Status::Ok);
        let code: EnrollmentCode = issued.into_json().await.expect("code json");
        assert!(code.code.starts_with("PROF"));

        let listed: Vec<EnrollmentCode> = client
            .get("/api/v1/codes?role=teacher&len=5")
            .header(bearer(&admin.token))
            .dispatch()
            .await
            .into_json()
            .await
            .expect("list json");
        assert_eq!(listed.len(), 1);

        let signup = |email: &'static str| {
            json!({
                "email": email,
                "password": "correct horse",
                "display_name": "Prof",
                "role": "teacher",
                "enrollment_code": code.code,
            })
            .to_string()
        };

        let first = client
            .post("/api/v1/auth/signup")
            .header(ContentType::JSON)
            .body(signup("prof@school.org"))
            .dispatch()
            .await;
        assert_eq!(first.status(), Status::Ok);
        let teacher: SessionResponse = first.into_json().await.expect("session json");

        let second = client
            .post("/api/v1/auth/signup")
            .header(ContentType::JSON)
            .body(signup("prof2@school.org"))
            .dispatch()
            .await;
        assert_eq!(second.status(), Status::BadRequest);

        let forbidden = client
            .post("/api/v1/codes")
            .header(ContentType::JSON)
            .header(bearer(&teacher.token))
            .body(json!({ "role": "student" }).to_string())
            .dispatch()
            .await;
        assert_eq!(forbidden.status(), Status::Forbidden);
    }
}
