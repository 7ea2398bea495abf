//! Role- and relationship-based authorization.
//!
//! The role narrows what a principal may attempt; scoped resources are then
//! checked against the stored relationship (class membership, assignment
//! authorship, guardian links). A failed check is always reported as
//! [`ServiceError::Unauthorized`], never as an empty result.

use std::fmt::{Display, Formatter};

use crate::data::assignment::Assignment;
use crate::data::class::Class;
use crate::data::guardian::GuardianLink;
use crate::data::{fetch, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::role::Role;
use crate::session::Principal;
use crate::store::{Query, RecordStore};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Resource<'r> {
    User { id: &'r str },
    UserListing,
    ClassCatalog,
    Class { id: &'r str },
    /// Membership lists (students and teachers) of a class.
    Roster { class_id: &'r str },
    Subject,
    EnrollmentCode,
    Assignment { class_id: &'r str },
    Submission {
        assignment_id: Option<&'r str>,
        student_id: Option<&'r str>,
    },
    Grade {
        class_id: Option<&'r str>,
        student_id: Option<&'r str>,
    },
    Attendance {
        class_id: Option<&'r str>,
        student_id: Option<&'r str>,
    },
    GuardianLink {
        guardian_id: Option<&'r str>,
        student_id: Option<&'r str>,
    },
    StudentClasses { student_id: &'r str },
    Schedule { class_id: &'r str },
}

impl Display for Resource<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::User { id } => write!(f, "user '{}'", id),
            Resource::UserListing => write!(f, "user listings"),
            Resource::ClassCatalog => write!(f, "classes"),
            Resource::Class { id } => write!(f, "class '{}'", id),
            Resource::Roster { class_id } => write!(f, "roster of class '{}'", class_id),
            Resource::Subject => write!(f, "subjects"),
            Resource::EnrollmentCode => write!(f, "enrollment codes"),
            Resource::Assignment { class_id } => write!(f, "assignments of class '{}'", class_id),
            Resource::Submission { .. } => write!(f, "submissions"),
            Resource::Grade { .. } => write!(f, "grades"),
            Resource::Attendance { .. } => write!(f, "attendance"),
            Resource::GuardianLink { .. } => write!(f, "guardian links"),
            Resource::StudentClasses { student_id } => {
                write!(f, "classes of student '{}'", student_id)
            }
            Resource::Schedule { class_id } => write!(f, "schedule of class '{}'", class_id),
        }
    }
}

pub struct Policy<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> Policy<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Policy<'a> {
        Policy { store }
    }

    pub async fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        resource: Resource<'_>,
    ) -> ServiceResult<()> {
        if self.allows(principal, action, resource).await? {
            return Ok(());
        }

        tracing::debug!(
            "denied {} '{}' to {} {}",
            principal.role,
            principal.id,
            action,
            resource
        );
        Err(ServiceError::unauthorized(format!(
            "a {} may not {} {}",
            principal.role, action, resource
        )))
    }

    pub async fn allows(
        &self,
        principal: &Principal,
        action: Action,
        resource: Resource<'_>,
    ) -> ServiceResult<bool> {
        match principal.role {
            Role::Student => self.student_allows(principal, action, resource).await,
            Role::Teacher => self.teacher_allows(principal, action, resource).await,
            Role::Coordinator => Ok(coordinator_allows(action, resource)),
            Role::Guardian => self.guardian_allows(principal, action, resource).await,
        }
    }

    async fn student_allows(
        &self,
        me: &Principal,
        action: Action,
        resource: Resource<'_>,
    ) -> ServiceResult<bool> {
        use Action::*;

        Ok(match (action, resource) {
            (Read | Update, Resource::User { id }) => id == me.id,
            (Read, Resource::Subject) => true,
            (Read, Resource::StudentClasses { student_id }) => student_id == me.id,
            (Read, Resource::Class { id: class_id })
            | (Read, Resource::Assignment { class_id })
            | (Read, Resource::Schedule { class_id })
            | (Read, Resource::Attendance { class_id: Some(class_id), student_id: None }) => {
                self.class(class_id).await?.has_student(&me.id)
            }
            (Read, Resource::Grade { class_id, student_id: Some(student_id) })
            | (Read, Resource::Attendance { class_id, student_id: Some(student_id) }) => {
                student_id == me.id && self.in_class_if_scoped(class_id, student_id).await?
            }
            (
                Create,
                Resource::Submission {
                    assignment_id: Some(assignment_id),
                    student_id: Some(student_id),
                },
            ) => {
                if student_id != me.id {
                    return Ok(false);
                }
                let assignment = self.assignment(assignment_id).await?;
                self.class(&assignment.class_id).await?.has_student(&me.id)
            }
            (Read, Resource::Submission { student_id: Some(student_id), .. }) => {
                student_id == me.id
            }
            (Read, Resource::GuardianLink { guardian_id: None, student_id: Some(student_id) }) => {
                student_id == me.id
            }
            _ => false,
        })
    }

    async fn teacher_allows(
        &self,
        me: &Principal,
        action: Action,
        resource: Resource<'_>,
    ) -> ServiceResult<bool> {
        use Action::*;

        Ok(match (action, resource) {
            (Read | Update, Resource::User { id }) => id == me.id,
            (Read, Resource::Subject) => true,
            (Read | Update, Resource::Class { id: class_id })
            | (Read, Resource::Schedule { class_id })
            | (_, Resource::Assignment { class_id })
            | (_, Resource::Grade { class_id: Some(class_id), .. })
            | (_, Resource::Attendance { class_id: Some(class_id), .. }) => {
                self.class(class_id).await?.has_teacher(&me.id)
            }
            (Read | Update, Resource::Submission { assignment_id: Some(assignment_id), .. }) => {
                self.assignment(assignment_id).await?.teacher_id == me.id
            }
            _ => false,
        })
    }

    async fn guardian_allows(
        &self,
        me: &Principal,
        action: Action,
        resource: Resource<'_>,
    ) -> ServiceResult<bool> {
        use Action::*;

        Ok(match (action, resource) {
            (Read | Update, Resource::User { id }) if id == me.id => true,
            (Read, Resource::User { id: student_id })
            | (Read, Resource::StudentClasses { student_id }) => {
                self.linked(&me.id, student_id).await?
            }
            (Read, Resource::Subject) => true,
            (Read, Resource::Grade { class_id, student_id: Some(student_id) })
            | (Read, Resource::Attendance { class_id, student_id: Some(student_id) }) => {
                self.linked(&me.id, student_id).await?
                    && self.in_class_if_scoped(class_id, student_id).await?
            }
            (
                Create | Read | Delete,
                Resource::GuardianLink {
                    guardian_id: Some(guardian_id),
                    ..
                },
            ) => guardian_id == me.id,
            _ => false,
        })
    }

    async fn class(&self, id: &str) -> ServiceResult<Class> {
        fetch(self.store, id).await
    }

    async fn assignment(&self, id: &str) -> ServiceResult<Assignment> {
        fetch(self.store, id).await
    }

    async fn in_class_if_scoped(
        &self,
        class_id: Option<&str>,
        student_id: &str,
    ) -> ServiceResult<bool> {
        match class_id {
            Some(class_id) => Ok(self.class(class_id).await?.has_student(student_id)),
            None => Ok(true),
        }
    }

    /// Whether a guardian link between the two users exists.
    pub async fn linked(&self, guardian_id: &str, student_id: &str) -> ServiceResult<bool> {
        let links = self
            .store
            .query_many(
                GuardianLink::COLLECTION,
                &Query::new()
                    .eq("guardian_id", guardian_id)
                    .eq("student_id", student_id)
                    .limit(1),
            )
            .await?;
        Ok(!links.is_empty())
    }
}

fn coordinator_allows(action: Action, resource: Resource<'_>) -> bool {
    use Action::*;

    match (action, resource) {
        (_, Resource::User { .. })
        | (_, Resource::UserListing)
        | (_, Resource::ClassCatalog)
        | (_, Resource::Class { .. })
        | (_, Resource::Roster { .. })
        | (_, Resource::Subject)
        | (_, Resource::EnrollmentCode)
        | (_, Resource::StudentClasses { .. })
        | (_, Resource::Schedule { .. }) => true,
        (Create | Read | Delete, Resource::GuardianLink { .. }) => true,
        (Update, Resource::GuardianLink { .. })
        | (_, Resource::Assignment { .. })
        | (_, Resource::Submission { .. })
        | (_, Resource::Grade { .. })
        | (_, Resource::Attendance { .. }) => false,
    }
}
