use bson::doc;

use super::{Subject, SubjectData};
use crate::data::{create, fetch, find, require_text, Page, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::session::Principal;
use crate::store::{Direction, Query};

pub struct SubjectService<'a> {
    portal: &'a Portal,
}

impl<'a> SubjectService<'a> {
    pub fn new(portal: &'a Portal) -> SubjectService<'a> {
        SubjectService { portal }
    }

    pub async fn create(&self, principal: &Principal, data: SubjectData) -> ServiceResult<Subject> {
        self.portal
            .policy()
            .authorize(principal, Action::Create, Resource::Subject)
            .await?;
        require_text("subject name", &data.name)?;

        let mut subject = Subject {
            id: String::new(),
            name: data.name.trim().to_string(),
            created_by: principal.id.clone(),
            created_at: self.portal.now(),
        };
        subject.id = create(self.portal.store(), &subject).await?;

        tracing::info!("'{}' created subject '{}'", principal.id, subject.name);
        Ok(subject)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: &str,
        data: SubjectData,
    ) -> ServiceResult<Subject> {
        self.portal
            .policy()
            .authorize(principal, Action::Update, Resource::Subject)
            .await?;
        require_text("subject name", &data.name)?;

        if !self
            .portal
            .store()
            .update(Subject::COLLECTION, id, doc! { "name": data.name.trim() })
            .await?
        {
            return Err(ServiceError::not_found(Subject::COLLECTION, id));
        }
        fetch(self.portal.store(), id).await
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> ServiceResult<()> {
        self.portal
            .policy()
            .authorize(principal, Action::Delete, Resource::Subject)
            .await?;

        if !self.portal.store().delete(Subject::COLLECTION, id).await? {
            return Err(ServiceError::not_found(Subject::COLLECTION, id));
        }
        tracing::info!("'{}' deleted subject '{}'", principal.id, id);
        Ok(())
    }

    pub async fn list_all(&self, principal: &Principal, page: Page) -> ServiceResult<Vec<Subject>> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::Subject)
            .await?;

        let query = Query::new().order_by("name", Direction::Asc);
        find(self.portal.store(), &page.apply(query)).await
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> ServiceResult<Subject> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::Subject)
            .await?;
        fetch(self.portal.store(), id).await
    }
}
