use std::collections::HashSet;

use super::{AttendanceSummary, Lesson, NewLesson};
use crate::data::class::Class;
use crate::data::subject::Subject;
use crate::data::{create, fetch, find};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::session::Principal;
use crate::store::{Direction, Query};

/// The presence list must name every enrolled student exactly once.
fn check_roster(class: &Class, lesson: &NewLesson) -> ServiceResult<()> {
    let mut listed = HashSet::new();
    for entry in &lesson.presence {
        if !class.has_student(&entry.student_id) {
            return Err(ServiceError::invalid(format!(
                "student '{}' isn't enrolled in class '{}'",
                entry.student_id, class.name
            )));
        }
        if !listed.insert(entry.student_id.as_str()) {
            return Err(ServiceError::invalid(format!(
                "student '{}' is listed twice",
                entry.student_id
            )));
        }
    }

    let missing: Vec<&str> = class
        .students
        .iter()
        .map(String::as_str)
        .filter(|it| !listed.contains(it))
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::invalid(format!(
            "missing presence for: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

pub struct AttendanceService<'a> {
    portal: &'a Portal,
}

impl<'a> AttendanceService<'a> {
    pub fn new(portal: &'a Portal) -> AttendanceService<'a> {
        AttendanceService { portal }
    }

    pub async fn record(&self, principal: &Principal, data: NewLesson) -> ServiceResult<Lesson> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Create,
                Resource::Attendance {
                    class_id: Some(&data.class_id),
                    student_id: None,
                },
            )
            .await?;

        let class: Class = fetch(self.portal.store(), &data.class_id).await?;
        fetch::<Subject>(self.portal.store(), &data.subject_id).await?;
        check_roster(&class, &data)?;

        let mut lesson = Lesson {
            id: String::new(),
            date: data.date,
            class_id: data.class_id,
            subject_id: data.subject_id,
            teacher_id: principal.id.clone(),
            presence: data.presence,
            notes: data.notes,
            recorded_at: self.portal.now(),
        };
        lesson.id = create(self.portal.store(), &lesson).await?;

        tracing::info!(
            "'{}' recorded lesson '{}' for class '{}' ({} present of {})",
            principal.id,
            lesson.id,
            lesson.class_id,
            lesson.presence.iter().filter(|it| it.present).count(),
            lesson.presence.len()
        );
        Ok(lesson)
    }

    pub async fn for_class(
        &self,
        principal: &Principal,
        class_id: &str,
    ) -> ServiceResult<Vec<Lesson>> {
        self.authorize_class(principal, class_id).await?;
        let query = Query::new()
            .eq("class_id", class_id)
            .order_by("date", Direction::Desc);
        find(self.portal.store(), &query).await
    }

    pub async fn for_class_and_teacher(
        &self,
        principal: &Principal,
        class_id: &str,
        teacher_id: &str,
    ) -> ServiceResult<Vec<Lesson>> {
        self.authorize_class(principal, class_id).await?;
        let query = Query::new()
            .eq("class_id", class_id)
            .eq("teacher_id", teacher_id)
            .order_by("date", Direction::Desc);
        find(self.portal.store(), &query).await
    }

    pub async fn for_student(
        &self,
        principal: &Principal,
        student_id: &str,
        class_id: &str,
    ) -> ServiceResult<AttendanceSummary> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::Attendance {
                    class_id: Some(class_id),
                    student_id: Some(student_id),
                },
            )
            .await?;

        let query = Query::new()
            .eq("class_id", class_id)
            .order_by("date", Direction::Desc);
        let lessons: Vec<Lesson> = find(self.portal.store(), &query).await?;
        Ok(AttendanceSummary::from_lessons(student_id, &lessons))
    }

    async fn authorize_class(&self, principal: &Principal, class_id: &str) -> ServiceResult<()> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::Attendance {
                    class_id: Some(class_id),
                    student_id: None,
                },
            )
            .await
    }
}
