use bson::doc;

use super::{Assignment, AssignmentCreateData, Submission, SubmissionGradeData, SubmissionStatus};
use crate::data::grade::validate_value;
use crate::data::subject::Subject;
use crate::data::{fetch, find, require_text, to_document, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::session::Principal;
use crate::storage::{upload_all, Upload, ASSIGNMENT_FILES, SUBMISSION_FILES};
use crate::store::{Direction, Predicate, Query};

pub struct AssignmentService<'a> {
    portal: &'a Portal,
}

impl<'a> AssignmentService<'a> {
    pub fn new(portal: &'a Portal) -> AssignmentService<'a> {
        AssignmentService { portal }
    }

    pub async fn create(
        &self,
        principal: &Principal,
        data: AssignmentCreateData,
        attachments: Vec<Upload>,
    ) -> ServiceResult<Assignment> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Create,
                Resource::Assignment {
                    class_id: &data.class_id,
                },
            )
            .await?;
        require_text("title", &data.title)?;

        let now = self.portal.now();
        if data.due <= now {
            return Err(ServiceError::invalid("Due date must be in the future."));
        }
        fetch::<Subject>(self.portal.store(), &data.subject_id).await?;

        let attachments =
            upload_all(self.portal.objects(), ASSIGNMENT_FILES, now, attachments).await?;

        let mut assignment = Assignment {
            id: String::new(),
            title: data.title.trim().to_string(),
            description: data.description,
            due: data.due,
            class_id: data.class_id,
            subject_id: data.subject_id,
            teacher_id: principal.id.clone(),
            attachments,
            created_at: now,
        };
        assignment.id = self
            .portal
            .store()
            .insert(Assignment::COLLECTION, to_document(&assignment)?)
            .await?;

        tracing::info!(
            "'{}' created assignment '{}' for class '{}'",
            principal.id,
            assignment.id,
            assignment.class_id
        );
        Ok(assignment)
    }

    /// Assignments of a class, latest due date first.
    pub async fn list_for_class(
        &self,
        principal: &Principal,
        class_id: &str,
        subject_id: Option<&str>,
    ) -> ServiceResult<Vec<Assignment>> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::Assignment { class_id })
            .await?;

        let mut query = Query::new().eq("class_id", class_id);
        if let Some(subject_id) = subject_id {
            query = query.eq("subject_id", subject_id);
        }
        find(self.portal.store(), &query.order_by("due", Direction::Desc)).await
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> ServiceResult<Assignment> {
        let assignment: Assignment = fetch(self.portal.store(), id).await?;
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::Assignment {
                    class_id: &assignment.class_id,
                },
            )
            .await?;
        Ok(assignment)
    }

    pub async fn submit(
        &self,
        principal: &Principal,
        assignment_id: &str,
        comment: Option<String>,
        files: Vec<Upload>,
    ) -> ServiceResult<Submission> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Create,
                Resource::Submission {
                    assignment_id: Some(assignment_id),
                    student_id: Some(&principal.id),
                },
            )
            .await?;

        let now = self.portal.now();
        let assignment: Assignment = fetch(self.portal.store(), assignment_id).await?;
        assignment.accepts_submission_at(now)?;

        let key = [
            Predicate::eq("assignment_id", assignment_id),
            Predicate::eq("student_id", principal.id.as_str()),
        ];
        let already_submitted = || ServiceError::invalid("Assignment was already submitted.");
        let existing = Query {
            predicates: key.to_vec(),
            limit: Some(1),
            ..Query::default()
        };
        if !find::<Submission>(self.portal.store(), &existing).await?.is_empty() {
            return Err(already_submitted());
        }

        let mut submission = Submission {
            id: String::new(),
            assignment_id: assignment_id.to_string(),
            student_id: principal.id.clone(),
            files: Vec::new(),
            comment: comment.filter(|it| !it.trim().is_empty()),
            submitted_at: now,
            status: SubmissionStatus::Submitted,
            score: None,
            teacher_comment: String::new(),
            graded_at: None,
        };

        let store = self.portal.store();
        submission.id = store
            .insert_unique(Submission::COLLECTION, &key, to_document(&submission)?)
            .await?
            .ok_or_else(already_submitted)?;

        if !files.is_empty() {
            submission.files =
                match upload_all(self.portal.objects(), SUBMISSION_FILES, now, files).await {
                    Ok(urls) => urls,
                    Err(e) => {
                        store.delete(Submission::COLLECTION, &submission.id).await?;
                        return Err(e.into());
                    }
                };
            store
                .update(
                    Submission::COLLECTION,
                    &submission.id,
                    doc! { "files": submission.files.clone() },
                )
                .await?;
        }

        tracing::info!(
            "'{}' submitted assignment '{}'",
            principal.id,
            assignment_id
        );
        Ok(submission)
    }

    /// Scores a submission. Only grading fields are written.
    pub async fn grade_submission(
        &self,
        principal: &Principal,
        submission_id: &str,
        data: SubmissionGradeData,
    ) -> ServiceResult<Submission> {
        let submission: Submission = fetch(self.portal.store(), submission_id).await?;
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Update,
                Resource::Submission {
                    assignment_id: Some(&submission.assignment_id),
                    student_id: None,
                },
            )
            .await?;
        let score = validate_value(data.score)?;

        let patch = doc! {
            "score": score,
            "teacher_comment": data.comment.trim(),
            "status": bson::to_bson(&SubmissionStatus::Graded)?,
            "graded_at": self.portal.now().timestamp_millis(),
        };
        if !self
            .portal
            .store()
            .update(Submission::COLLECTION, submission_id, patch)
            .await?
        {
            return Err(ServiceError::not_found(Submission::COLLECTION, submission_id));
        }

        tracing::info!(
            "'{}' graded submission '{}' with {}",
            principal.id,
            submission_id,
            score
        );
        fetch(self.portal.store(), submission_id).await
    }

    pub async fn submissions_for(
        &self,
        principal: &Principal,
        assignment_id: &str,
    ) -> ServiceResult<Vec<Submission>> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::Submission {
                    assignment_id: Some(assignment_id),
                    student_id: None,
                },
            )
            .await?;

        let query = Query::new()
            .eq("assignment_id", assignment_id)
            .order_by("submitted_at", Direction::Asc);
        find(self.portal.store(), &query).await
    }

    pub async fn my_submissions(&self, principal: &Principal) -> ServiceResult<Vec<Submission>> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::Submission {
                    assignment_id: None,
                    student_id: Some(&principal.id),
                },
            )
            .await?;

        let query = Query::new()
            .eq("student_id", principal.id.as_str())
            .order_by("submitted_at", Direction::Desc);
        find(self.portal.store(), &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::class::db::tests::class_of;
    use crate::data::subject::SubjectData;
    use crate::portal::tests::{add_user, start_time, test_portal, Fixture};
    use crate::role::Role;
    use crate::store::memory::tests::race;
    use chrono::Duration;
    use std::sync::Arc;

    struct Classroom {
        fixture: Fixture,
        class_id: String,
        subject_id: String,
        teacher: Principal,
        student: Principal,
    }

    async fn classroom() -> Classroom {
        let fixture = test_portal().await;
        let coordinator = fixture.coordinator.clone();
        let class = class_of(&fixture.portal, &coordinator, "7A").await;
        let subject = fixture
            .portal
            .subjects()
            .create(&coordinator, SubjectData { name: "História".to_string() })
            .await
            .unwrap();
        let teacher = add_user(&fixture.store, "t@school.org", Role::Teacher).await;
        let student = add_user(&fixture.store, "s@school.org", Role::Student).await;
        let classes = fixture.portal.classes();
        classes.add_teacher(&coordinator, &class.id, &teacher.id).await.unwrap();
        classes.add_student(&coordinator, &class.id, &student.id).await.unwrap();

        Classroom {
            class_id: class.id,
            subject_id: subject.id,
            fixture,
            teacher,
            student,
        }
    }

    fn due_in(room: &Classroom, due: Duration) -> AssignmentCreateData {
        AssignmentCreateData {
            title: "Essay".to_string(),
            description: "Two pages".to_string(),
            due: start_time() + due,
            class_id: room.class_id.clone(),
            subject_id: room.subject_id.clone(),
        }
    }

    #[tokio::test]
    async fn due_date_must_be_in_the_future() {
        let room = classroom().await;
        let assignments = room.fixture.portal.assignments();

        let past = assignments
            .create(&room.teacher, due_in(&room, Duration::zero()), vec![])
            .await;
        assert!(matches!(past, Err(ServiceError::ValidationFailed(_))));

        let foreign = assignments
            .create(&room.student, due_in(&room, Duration::days(1)), vec![])
            .await;
        assert!(matches!(foreign, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn submissions_close_after_the_due_instant() {
        let room = classroom().await;
        let assignments = room.fixture.portal.assignments();
        let assignment = assignments
            .create(
                &room.teacher,
                due_in(&room, Duration::days(2)),
                vec![Upload {
                    name: "rubric.pdf".to_string(),
                    bytes: b"%PDF".to_vec(),
                }],
            )
            .await
            .expect("create");
        assert_eq!(assignment.attachments.len(), 1);
        assert!(assignment.attachments[0].starts_with("http://localhost:8000/files/assignments/"));

        room.fixture.clock.set(assignment.due + Duration::seconds(1));
        let late = assignments
            .submit(&room.student, &assignment.id, None, vec![])
            .await;
        assert!(matches!(late, Err(ServiceError::ValidationFailed(_))));

        room.fixture.clock.set(assignment.due - Duration::seconds(1));
        let submission = assignments
            .submit(
                &room.student,
                &assignment.id,
                Some("done".to_string()),
                vec![Upload {
                    name: "essay.txt".to_string(),
                    bytes: b"words".to_vec(),
                }],
            )
            .await
            .expect("on time");
        assert_eq!(submission.status, SubmissionStatus::Submitted);
        assert_eq!(submission.files.len(), 1);

        let again = assignments
            .submit(&room.student, &assignment.id, None, vec![])
            .await;
        assert!(matches!(again, Err(ServiceError::ValidationFailed(_))));
        assert_eq!(assignments.my_submissions(&room.student).await.unwrap().len(), 1);
    }

    fn stored_submission_files(room: &Classroom) -> usize {
        let dir = room.fixture.uploads.path().join(SUBMISSION_FILES);
        std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
    }

    fn scored(score: f64) -> SubmissionGradeData {
        SubmissionGradeData {
            score,
            comment: String::new(),
        }
    }

    fn essay() -> Vec<Upload> {
        vec![Upload {
            name: "essay.txt".to_string(),
            bytes: b"words".to_vec(),
        }]
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_store_one_record() {
        let room = classroom().await;
        let assignment = room
            .fixture
            .portal
            .assignments()
            .create(&room.teacher, due_in(&room, Duration::days(1)), vec![])
            .await
            .unwrap();

        let portal = Arc::new(room.fixture.portal);
        let results = race(8, |_| {
            let portal = portal.clone();
            let student = room.student.clone();
            let assignment_id = assignment.id.clone();
            async move {
                portal
                    .assignments()
                    .submit(&student, &assignment_id, None, essay())
                    .await
            }
        })
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(room.fixture.store.count(Submission::COLLECTION).await, 1);
        let dir = room.fixture.uploads.path().join(SUBMISSION_FILES);
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn rejected_resubmission_uploads_nothing() {
        let room = classroom().await;
        let assignments = room.fixture.portal.assignments();
        let assignment = assignments
            .create(&room.teacher, due_in(&room, Duration::days(1)), vec![])
            .await
            .unwrap();

        let first = assignments
            .submit(&room.student, &assignment.id, None, essay())
            .await
            .expect("first");
        let stored: Submission = fetch(room.fixture.portal.store(), &first.id).await.unwrap();
        assert_eq!(stored.files, first.files);
        assert_eq!(stored_submission_files(&room), 1);

        let again = assignments
            .submit(&room.student, &assignment.id, None, essay())
            .await;
        assert!(matches!(again, Err(ServiceError::ValidationFailed(_))));
        assert_eq!(stored_submission_files(&room), 1);
    }

    #[tokio::test]
    async fn only_the_author_grades() {
        let room = classroom().await;
        let assignments = room.fixture.portal.assignments();
        let assignment = assignments
            .create(&room.teacher, due_in(&room, Duration::days(1)), vec![])
            .await
            .unwrap();
        let submission = assignments
            .submit(&room.student, &assignment.id, None, vec![])
            .await
            .unwrap();

        let other = add_user(&room.fixture.store, "t2@school.org", Role::Teacher).await;
        let denied = assignments
            .grade_submission(&other, &submission.id, scored(8.0))
            .await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));

        let out_of_range = assignments
            .grade_submission(&room.teacher, &submission.id, scored(10.5))
            .await;
        assert!(matches!(out_of_range, Err(ServiceError::ValidationFailed(_))));

        let graded = assignments
            .grade_submission(
                &room.teacher,
                &submission.id,
                SubmissionGradeData {
                    score: 8.46,
                    comment: "Good".to_string(),
                },
            )
            .await
            .expect("grade");
        assert_eq!(graded.status, SubmissionStatus::Graded);
        assert_eq!(graded.score, Some(8.5));
        assert_eq!(graded.teacher_comment, "Good");
        assert_eq!(graded.files, submission.files);
        assert!(graded.graded_at.is_some());

        let listed = assignments
            .submissions_for(&room.teacher, &assignment.id)
            .await
            .unwrap();
        assert_eq!(listed, vec![graded]);
        assert!(assignments.submissions_for(&room.student, &assignment.id).await.is_err());
    }
}
