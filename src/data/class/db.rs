use bson::{Bson, Document};

use super::{Class, ClassCreateData, ClassUpdateData};
use crate::data::user::db::{profiles, require_role};
use crate::data::user::User;
use crate::data::{create, fetch, find, require_text, Page, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::role::Role;
use crate::session::Principal;
use crate::store::{Direction, Query};

const STUDENTS: &str = "students";
const TEACHERS: &str = "teachers";

fn check_year(year: i32) -> ServiceResult<()> {
    if !(1900..=9999).contains(&year) {
        return Err(ServiceError::invalid(format!(
            "{} isn't a valid academic year",
            year
        )));
    }
    Ok(())
}

pub struct ClassService<'a> {
    portal: &'a Portal,
}

impl<'a> ClassService<'a> {
    pub fn new(portal: &'a Portal) -> ClassService<'a> {
        ClassService { portal }
    }

    pub async fn create(
        &self,
        principal: &Principal,
        data: ClassCreateData,
    ) -> ServiceResult<Class> {
        self.portal
            .policy()
            .authorize(principal, Action::Create, Resource::ClassCatalog)
            .await?;
        require_text("class name", &data.name)?;
        check_year(data.academic_year)?;

        let mut class = Class {
            id: String::new(),
            name: data.name.trim().to_string(),
            academic_year: data.academic_year,
            students: vec![],
            teachers: vec![],
            created_by: principal.id.clone(),
            created_at: self.portal.now(),
        };
        class.id = create(self.portal.store(), &class).await?;

        tracing::info!("'{}' created class '{}' ({})", principal.id, class.name, class.id);
        Ok(class)
    }

    pub async fn list_all(&self, principal: &Principal, page: Page) -> ServiceResult<Vec<Class>> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::ClassCatalog)
            .await?;

        let query = Query::new().order_by("academic_year", Direction::Desc);
        find(self.portal.store(), &page.apply(query)).await
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> ServiceResult<Class> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::Class { id })
            .await?;
        fetch(self.portal.store(), id).await
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: &str,
        data: ClassUpdateData,
    ) -> ServiceResult<Class> {
        self.portal
            .policy()
            .authorize(principal, Action::Update, Resource::Class { id })
            .await?;

        let mut patch = Document::new();
        if let Some(name) = data.name {
            require_text("class name", &name)?;
            patch.insert("name", name.trim());
        }
        if let Some(year) = data.academic_year {
            check_year(year)?;
            patch.insert("academic_year", year);
        }

        if !patch.is_empty() && !self.portal.store().update(Class::COLLECTION, id, patch).await? {
            return Err(ServiceError::not_found(Class::COLLECTION, id));
        }
        tracing::debug!("'{}' updated class '{}'", principal.id, id);
        fetch(self.portal.store(), id).await
    }

    pub async fn for_student(
        &self,
        principal: &Principal,
        student_id: &str,
    ) -> ServiceResult<Vec<Class>> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::StudentClasses { student_id })
            .await?;

        let query = Query::new()
            .contains(STUDENTS, student_id)
            .order_by("name", Direction::Asc);
        find(self.portal.store(), &query).await
    }

    /// Teachers may list their own classes, coordinators anyone's.
    pub async fn for_teacher(
        &self,
        principal: &Principal,
        teacher_id: &str,
    ) -> ServiceResult<Vec<Class>> {
        if principal.id != teacher_id || principal.role != Role::Teacher {
            self.portal
                .policy()
                .authorize(principal, Action::Read, Resource::ClassCatalog)
                .await?;
        }

        let query = Query::new()
            .contains(TEACHERS, teacher_id)
            .order_by("name", Direction::Asc);
        find(self.portal.store(), &query).await
    }

    pub async fn add_student(
        &self,
        principal: &Principal,
        class_id: &str,
        student_id: &str,
    ) -> ServiceResult<Class> {
        self.add_member(principal, class_id, STUDENTS, student_id, Role::Student)
            .await
    }

    pub async fn remove_student(
        &self,
        principal: &Principal,
        class_id: &str,
        student_id: &str,
    ) -> ServiceResult<Class> {
        self.remove_member(principal, class_id, STUDENTS, student_id)
            .await
    }

    pub async fn add_teacher(
        &self,
        principal: &Principal,
        class_id: &str,
        teacher_id: &str,
    ) -> ServiceResult<Class> {
        self.add_member(principal, class_id, TEACHERS, teacher_id, Role::Teacher)
            .await
    }

    pub async fn remove_teacher(
        &self,
        principal: &Principal,
        class_id: &str,
        teacher_id: &str,
    ) -> ServiceResult<Class> {
        self.remove_member(principal, class_id, TEACHERS, teacher_id)
            .await
    }

    async fn add_member(
        &self,
        principal: &Principal,
        class_id: &str,
        field: &str,
        user_id: &str,
        role: Role,
    ) -> ServiceResult<Class> {
        self.portal
            .policy()
            .authorize(principal, Action::Update, Resource::Roster { class_id })
            .await?;
        require_role(self.portal.store(), user_id, role).await?;

        match self
            .portal
            .store()
            .add_to_set(Class::COLLECTION, class_id, field, Bson::from(user_id))
            .await?
        {
            None => Err(ServiceError::not_found(Class::COLLECTION, class_id)),
            Some(false) => Err(ServiceError::invalid(format!(
                "{} '{}' is already in class '{}'",
                role, user_id, class_id
            ))),
            Some(true) => {
                tracing::info!("added {} '{}' to class '{}'", role, user_id, class_id);
                fetch(self.portal.store(), class_id).await
            }
        }
    }

    async fn remove_member(
        &self,
        principal: &Principal,
        class_id: &str,
        field: &str,
        user_id: &str,
    ) -> ServiceResult<Class> {
        self.portal
            .policy()
            .authorize(principal, Action::Update, Resource::Roster { class_id })
            .await?;

        match self
            .portal
            .store()
            .pull(Class::COLLECTION, class_id, field, Bson::from(user_id))
            .await?
        {
            None => Err(ServiceError::not_found(Class::COLLECTION, class_id)),
            Some(false) => Err(ServiceError::invalid(format!(
                "'{}' isn't a member of class '{}'",
                user_id, class_id
            ))),
            Some(true) => {
                tracing::info!("removed '{}' from {} of class '{}'", user_id, field, class_id);
                fetch(self.portal.store(), class_id).await
            }
        }
    }

    pub async fn students(
        &self,
        principal: &Principal,
        class_id: &str,
    ) -> ServiceResult<Vec<User>> {
        let class = self.get(principal, class_id).await?;
        profiles(self.portal.store(), &class.students).await
    }

    pub async fn teachers(
        &self,
        principal: &Principal,
        class_id: &str,
    ) -> ServiceResult<Vec<User>> {
        let class = self.get(principal, class_id).await?;
        profiles(self.portal.store(), &class.teachers).await
    }
}
