use std::collections::BTreeMap;

use rocket::http::Status;
use rocket::{Build, Request, Rocket, Route};

pub mod attendance;
pub mod class;
pub mod codes;
pub mod coursework;
pub mod files;
pub mod grades;
pub mod guardians;
pub mod subject;
pub mod users;

use attendance::*;
use class::*;
use codes::*;
use coursework::*;
use files::*;
use grades::*;
use guardians::*;
use subject::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        assignment::{
            Assignment, AssignmentCreateData, Submission, SubmissionGradeData, SubmissionStatus,
        },
        class::{Class, ClassCreateData, ClassUpdateData},
        enrollment::{CodeIssueData, EnrollmentCode},
        grade::{AssessmentType, Grade, GradeBatch, GradeEntry, GradeUpdateData, NewGrade},
        guardian::{GuardianLink, LinkCreateData, LinkedUser},
        lesson::{AttendanceEntry, AttendanceSummary, Lesson, NewLesson, Presence},
        schedule::{Schedule, ScheduleData, Weekday},
        subject::{Subject, SubjectData},
        user::{ProfileUpdate, User},
    },
    resp::{jwt::doc::JWTAuth, problem::Problem},
    role::Role,
    session::{LoginData, ResetConfirmData, ResetRequestData, SignupData},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        signup,
        login,
        logout,
        reset_request,
        reset_confirm,
        user_me,
        user_get,
        user_list,
        user_update,
        user_set_active,
        code_issue,
        code_list,
        code_delete,
        class_create,
        class_list,
        class_get,
        class_update,
        class_students,
        class_teachers,
        class_add_student,
        class_remove_student,
        class_add_teacher,
        class_remove_teacher,
        student_classes,
        teacher_classes,
        schedule_create,
        class_schedules,
        schedule_update,
        schedule_delete,
        subject_create,
        subject_list,
        subject_get,
        subject_update,
        subject_delete,
        assignment_create,
        class_assignments,
        assignment_get,
        submission_create,
        assignment_submissions,
        submission_grade,
        my_submissions,
        grade_batch,
        grade_record,
        grade_update,
        student_grades,
        class_subject_grades,
        lesson_record,
        class_lessons,
        student_attendance,
        guardian_link,
        guardian_students,
        student_guardians,
        guardian_unlink
    ),
    components(schemas(
        Role,
        User,
        ProfileUpdate,
        SignupData,
        LoginData,
        ResetRequestData,
        ResetConfirmData,
        SessionResponse,
        ActiveData,
        EnrollmentCode,
        CodeIssueData,
        Class,
        ClassCreateData,
        ClassUpdateData,
        Schedule,
        ScheduleData,
        Weekday,
        Subject,
        SubjectData,
        Assignment,
        AssignmentCreateData,
        AssignmentUploadData,
        Submission,
        SubmissionStatus,
        SubmissionUploadData,
        SubmissionGradeData,
        FileData,
        AssessmentType,
        Grade,
        GradeEntry,
        GradeBatch,
        NewGrade,
        GradeUpdateData,
        Presence,
        Lesson,
        NewLesson,
        AttendanceEntry,
        AttendanceSummary,
        GuardianLink,
        LinkCreateData,
        LinkedUser,
        Problem
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api_v1() -> Vec<Route> {
    routes![
        signup,
        login,
        logout,
        reset_request,
        reset_confirm,
        user_me,
        user_get,
        user_list,
        user_update,
        user_set_active,
        code_issue,
        code_list,
        code_delete,
        class_create,
        class_list,
        class_get,
        class_update,
        class_students,
        class_teachers,
        class_add_student,
        class_remove_student,
        class_add_teacher,
        class_remove_teacher,
        student_classes,
        teacher_classes,
        schedule_create,
        class_schedules,
        schedule_update,
        schedule_delete,
        subject_create,
        subject_list,
        subject_get,
        subject_update,
        subject_delete,
        assignment_create,
        class_assignments,
        assignment_get,
        submission_create,
        assignment_submissions,
        submission_grade,
        my_submissions,
        grade_batch,
        grade_record,
        grade_update,
        student_grades,
        class_subject_grades,
        lesson_record,
        class_lessons,
        student_attendance,
        guardian_link,
        guardian_students,
        student_guardians,
        guardian_unlink
    ]
}

/// Renders guard failures and unmatched routes as problem documents.
#[catch(default)]
pub fn problem_catcher(status: Status, _: &Request<'_>) -> Problem {
    Problem::new_untyped(status, status.reason().unwrap_or("Request failed."))
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .register("/", catchers![problem_catcher])
        .mount("/api/v1", api_v1())
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
        )
        .mount("/files", routes![uploaded_file])
}

#[cfg(test)]
pub(crate) mod testing {
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use tempfile::TempDir;

    use super::users::SessionResponse;
    use crate::config::Config;
    use crate::portal::tests::test_portal;

    /// An untracked client, so cookies from one request never leak into the next.
    pub async fn test_client() -> (Client, TempDir) {
        let fixture = test_portal().await;
        let mut config = Config::default();
        config.upload_dir = fixture.uploads.path().to_path_buf();
        let rocket = crate::build(config, fixture.portal).expect("valid rocket");
        let client = Client::untracked(rocket).await.expect("valid client");
        (client, fixture.uploads)
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    pub async fn bootstrap_coordinator(client: &Client) -> SessionResponse {
        let response = client
            .post("/api/v1/auth/signup")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": "admin@localhost",
                    "password": "correct horse",
                    "display_name": "Admin",
                    "role": "coordinator",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        response.into_json().await.expect("session json")
    }
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};

    use super::testing::test_client;

    #[rocket::async_test]
    async fn openapi_lists_prefixed_paths() {
        let (client, _uploads) = test_client().await;
        let response = client.get("/api/v1/openapi.json").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let doc: serde_json::Value = response.into_json().await.expect("openapi json");
        let paths = doc["paths"].as_object().expect("paths object");
        assert!(paths.contains_key("/api/v1/auth/signup"));
        assert!(paths.contains_key("/api/v1/grades/batch"));
        assert!(paths.keys().all(|it| it.starts_with("/api/v1/")));
    }

    #[rocket::async_test]
    async fn guard_failures_are_problems() {
        let (client, _uploads) = test_client().await;
        let response = client.get("/api/v1/classes").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(
            response.content_type(),
            Some(ContentType::new("application", "problem+json"))
        );
    }

    #[rocket::async_test]
    async fn serves_uploaded_files() {
        let (client, uploads) = test_client().await;
        std::fs::create_dir_all(uploads.path().join("assignments")).expect("dir");
        std::fs::write(uploads.path().join("assignments/task.txt"), "solve it").expect("write");

        let found = client.get("/files/assignments/task.txt").dispatch().await;
        assert_eq!(found.status(), Status::Ok);
        assert_eq!(found.into_string().await.as_deref(), Some("solve it"));

        let missing = client.get("/files/assignments/none.txt").dispatch().await;
        assert_eq!(missing.status(), Status::NotFound);
    }
}
