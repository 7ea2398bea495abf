use rocket::serde::json::Json;
use rocket::State;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::data::assignment::{Assignment, AssignmentCreateData, Submission, SubmissionGradeData};
use crate::error::{ServiceError, ServiceResult};
use crate::portal::Portal;
use crate::resp::problem::Problem;
use crate::session::Session;
use crate::storage::Upload;
use crate::util;

/// An uploaded file carried inline in a JSON body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FileData {
    pub name: String,
    /// Standard base64, padding optional
    pub content_base64: String,
}

impl FileData {
    fn into_upload(self) -> ServiceResult<Upload> {
        let bytes = util::decode_base64(self.content_base64.trim())
            .map_err(|e| {
                ServiceError::invalid(format!("File '{}' isn't valid base64: {}", self.name, e))
            })?;
        Ok(Upload {
            name: self.name,
            bytes,
        })
    }
}

fn uploads(files: Vec<FileData>) -> ServiceResult<Vec<Upload>> {
    files.into_iter().map(FileData::into_upload).collect()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignmentUploadData {
    #[serde(flatten)]
    pub assignment: AssignmentCreateData,
    #[serde(default)]
    pub attachments: Vec<FileData>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmissionUploadData {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub files: Vec<FileData>,
}

/// Publish an assignment with optional attachments
#[utoipa::path(
    request_body = AssignmentUploadData,
    responses(
        (status = 200, body = Assignment),
        (status = 403, body = Problem),
        (status = 422, description = "Due date in the past or bad attachment", body = Problem),
        (status = 503, description = "File storage unavailable", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/assignments", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(data))]
pub async fn assignment_create(
    data: Json<AssignmentUploadData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Assignment>, Problem> {
    let data = data.into_inner();
    let attachments = uploads(data.attachments)?;
    Ok(Json(
        portal
            .assignments()
            .create(&session.principal, data.assignment, attachments)
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<Assignment>)), security(("jwt" = [])))]
#[get("/classes/<id>/assignments?<subject_id>")]
#[tracing::instrument]
pub async fn class_assignments(
    id: &str,
    subject_id: Option<&str>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Assignment>>, Problem> {
    Ok(Json(
        portal
            .assignments()
            .list_for_class(&session.principal, id, subject_id)
            .await?,
    ))
}

#[utoipa::path(
    responses((status = 200, body = Assignment), (status = 404, body = Problem)),
    security(("jwt" = []))
)]
#[get("/assignments/<id>")]
#[tracing::instrument]
pub async fn assignment_get(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Assignment>, Problem> {
    Ok(Json(portal.assignments().get(&session.principal, id).await?))
}

/// Hand in work for an assignment, once per student and before it's due
#[utoipa::path(
    request_body = SubmissionUploadData,
    responses(
        (status = 200, body = Submission),
        (status = 422, description = "Past due or already submitted", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/assignments/<id>/submissions", format = "application/json", data = "<data>")]
#[tracing::instrument(skip(data))]
pub async fn submission_create(
    id: &str,
    data: Json<SubmissionUploadData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Submission>, Problem> {
    let data = data.into_inner();
    let files = uploads(data.files)?;
    Ok(Json(
        portal
            .assignments()
            .submit(&session.principal, id, data.comment, files)
            .await?,
    ))
}

#[utoipa::path(responses((status = 200, body = Vec<Submission>)), security(("jwt" = [])))]
#[get("/assignments/<id>/submissions")]
#[tracing::instrument]
pub async fn assignment_submissions(
    id: &str,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Submission>>, Problem> {
    Ok(Json(
        portal
            .assignments()
            .submissions_for(&session.principal, id)
            .await?,
    ))
}

#[utoipa::path(
    request_body = SubmissionGradeData,
    responses((status = 200, body = Submission)),
    security(("jwt" = []))
)]
#[put("/submissions/<id>/grade", format = "application/json", data = "<data>")]
#[tracing::instrument]
pub async fn submission_grade(
    id: &str,
    data: Json<SubmissionGradeData>,
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Submission>, Problem> {
    Ok(Json(
        portal
            .assignments()
            .grade_submission(&session.principal, id, data.into_inner())
            .await?,
    ))
}

/// Submissions of the signed in student
#[utoipa::path(responses((status = 200, body = Vec<Submission>)), security(("jwt" = [])))]
#[get("/submissions/mine")]
#[tracing::instrument]
pub async fn my_submissions(
    session: Session,
    portal: &State<Portal>,
) -> Result<Json<Vec<Submission>>, Problem> {
    Ok(Json(
        portal
            .assignments()
            .my_submissions(&session.principal)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_data_decodes_into_uploads() {
        let files = vec![FileData {
            name: "essay.txt".to_string(),
            content_base64: util::encode_base64("hello"),
        }];
        let decoded = uploads(files).expect("valid base64");
        assert_eq!(decoded[0].bytes, b"hello".to_vec());

        let broken = vec![FileData {
            name: "bad.bin".to_string(),
            content_base64: "***".to_string(),
        }];
        assert!(matches!(uploads(broken), Err(ServiceError::ValidationFailed(_))));
    }
}
