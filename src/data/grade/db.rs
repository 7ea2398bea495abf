use std::collections::HashSet;

use bson::doc;

use super::{validate_value, Grade, GradeBatch, GradeUpdateData, NewGrade};
use crate::data::class::Class;
use crate::data::subject::Subject;
use crate::data::{fetch, find, to_document, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::session::Principal;
use crate::store::{Direction, Predicate, Query};

pub struct GradeService<'a> {
    portal: &'a Portal,
}

impl<'a> GradeService<'a> {
    pub fn new(portal: &'a Portal) -> GradeService<'a> {
        GradeService { portal }
    }

    /// Records a batch of grades.
    ///
    /// Every entry is validated before anything is written, so a single bad
    /// entry rejects the whole batch. Entries overwrite a previous grade of
    /// the same student, class, subject and assessment type.
    pub async fn record_batch(
        &self,
        principal: &Principal,
        batch: GradeBatch,
    ) -> ServiceResult<Vec<Grade>> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Create,
                Resource::Grade {
                    class_id: Some(&batch.class_id),
                    student_id: None,
                },
            )
            .await?;

        let class: Class = fetch(self.portal.store(), &batch.class_id).await?;
        fetch::<Subject>(self.portal.store(), &batch.subject_id).await?;

        if batch.entries.is_empty() {
            return Err(ServiceError::invalid("Grade batch is empty."));
        }

        let now = self.portal.now();
        let mut seen = HashSet::new();
        let mut grades = Vec::with_capacity(batch.entries.len());
        for entry in batch.entries {
            let value = validate_value(entry.value)?;
            if !class.has_student(&entry.student_id) {
                return Err(ServiceError::invalid(format!(
                    "student '{}' isn't enrolled in class '{}'",
                    entry.student_id, class.name
                )));
            }
            if !seen.insert(entry.student_id.clone()) {
                return Err(ServiceError::invalid(format!(
                    "student '{}' appears twice in the batch",
                    entry.student_id
                )));
            }

            grades.push(Grade {
                id: String::new(),
                student_id: entry.student_id,
                class_id: batch.class_id.clone(),
                subject_id: batch.subject_id.clone(),
                teacher_id: principal.id.clone(),
                assessment: batch.assessment,
                value,
                note: entry.note.filter(|it| !it.trim().is_empty()),
                recorded_at: now,
            });
        }

        for grade in grades.iter_mut() {
            let key = [
                Predicate::eq("student_id", grade.student_id.as_str()),
                Predicate::eq("class_id", grade.class_id.as_str()),
                Predicate::eq("subject_id", grade.subject_id.as_str()),
                Predicate::eq("assessment", grade.assessment),
            ];
            grade.id = self
                .portal
                .store()
                .upsert(Grade::COLLECTION, &key, to_document(&*grade)?)
                .await?;
        }

        tracing::info!(
            "'{}' recorded {} grade(s) for class '{}'",
            principal.id,
            grades.len(),
            class.id
        );
        Ok(grades)
    }

    pub async fn record(&self, principal: &Principal, grade: NewGrade) -> ServiceResult<Grade> {
        self.record_batch(principal, grade.into())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::invalid("Grade batch is empty."))
    }

    /// Overwrites the value of an existing grade.
    pub async fn update(
        &self,
        principal: &Principal,
        grade_id: &str,
        data: GradeUpdateData,
    ) -> ServiceResult<Grade> {
        let grade: Grade = fetch(self.portal.store(), grade_id).await?;
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Update,
                Resource::Grade {
                    class_id: Some(&grade.class_id),
                    student_id: Some(&grade.student_id),
                },
            )
            .await?;
        let value = validate_value(data.value)?;

        let note = data.note.filter(|it| !it.trim().is_empty());
        let patch = doc! {
            "value": value,
            "note": note,
            "teacher_id": principal.id.as_str(),
            "recorded_at": self.portal.now().timestamp_millis(),
        };
        if !self
            .portal
            .store()
            .update(Grade::COLLECTION, grade_id, patch)
            .await?
        {
            return Err(ServiceError::not_found(Grade::COLLECTION, grade_id));
        }

        tracing::info!("'{}' changed grade '{}' to {}", principal.id, grade_id, value);
        fetch(self.portal.store(), grade_id).await
    }

    pub async fn for_student(
        &self,
        principal: &Principal,
        student_id: &str,
        class_id: Option<&str>,
        subject_id: Option<&str>,
    ) -> ServiceResult<Vec<Grade>> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::Grade {
                    class_id,
                    student_id: Some(student_id),
                },
            )
            .await?;

        let mut query = Query::new().eq("student_id", student_id);
        if let Some(class_id) = class_id {
            query = query.eq("class_id", class_id);
        }
        if let Some(subject_id) = subject_id {
            query = query.eq("subject_id", subject_id);
        }
        find(
            self.portal.store(),
            &query.order_by("recorded_at", Direction::Desc),
        )
        .await
    }

    pub async fn for_class_subject(
        &self,
        principal: &Principal,
        class_id: &str,
        subject_id: &str,
    ) -> ServiceResult<Vec<Grade>> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::Grade {
                    class_id: Some(class_id),
                    student_id: None,
                },
            )
            .await?;

        let query = Query::new()
            .eq("class_id", class_id)
            .eq("subject_id", subject_id)
            .order_by("student_id", Direction::Asc);
        find(self.portal.store(), &query).await
    }
}
