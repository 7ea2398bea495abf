use super::{GuardianLink, LinkCreateData, LinkedUser};
use crate::data::user::db::require_role;
use crate::data::user::User;
use crate::data::{fetch, fetch_optional, find, require_text, to_document, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::role::Role;
use crate::session::Principal;
use crate::store::{Direction, Predicate, Query};

pub struct GuardianService<'a> {
    portal: &'a Portal,
}

impl<'a> GuardianService<'a> {
    pub fn new(portal: &'a Portal) -> GuardianService<'a> {
        GuardianService { portal }
    }

    /// Links a guardian to a student.
    ///
    /// The first link of a student becomes its primary one and stays primary;
    /// the flag is never recomputed, not even when that link is removed.
    pub async fn link(
        &self,
        principal: &Principal,
        data: LinkCreateData,
    ) -> ServiceResult<GuardianLink> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Create,
                Resource::GuardianLink {
                    guardian_id: Some(&data.guardian_id),
                    student_id: Some(&data.student_id),
                },
            )
            .await?;
        require_text("relation", &data.relation)?;

        let store = self.portal.store();
        require_role(store, &data.student_id, Role::Student).await?;
        require_role(store, &data.guardian_id, Role::Guardian).await?;

        let existing: Vec<GuardianLink> = find(
            store,
            &Query::new().eq("student_id", data.student_id.as_str()).limit(1),
        )
        .await?;

        let mut link = GuardianLink {
            id: String::new(),
            student_id: data.student_id,
            guardian_id: data.guardian_id,
            relation: data.relation.trim().to_string(),
            is_primary: existing.is_empty(),
            created_at: self.portal.now(),
        };
        link.id = store
            .insert_unique(
                GuardianLink::COLLECTION,
                &[
                    Predicate::eq("student_id", link.student_id.as_str()),
                    Predicate::eq("guardian_id", link.guardian_id.as_str()),
                ],
                to_document(&link)?,
            )
            .await?
            .ok_or_else(|| ServiceError::invalid("Guardian is already linked to this student."))?;

        tracing::info!(
            "linked guardian '{}' to student '{}' (primary: {})",
            link.guardian_id,
            link.student_id,
            link.is_primary
        );
        Ok(link)
    }

    pub async fn students_of(
        &self,
        principal: &Principal,
        guardian_id: &str,
    ) -> ServiceResult<Vec<LinkedUser>> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::GuardianLink {
                    guardian_id: Some(guardian_id),
                    student_id: None,
                },
            )
            .await?;

        let links = self.links(Query::new().eq("guardian_id", guardian_id)).await?;
        self.resolve(links, |link| &link.student_id).await
    }

    pub async fn guardians_of(
        &self,
        principal: &Principal,
        student_id: &str,
    ) -> ServiceResult<Vec<LinkedUser>> {
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Read,
                Resource::GuardianLink {
                    guardian_id: None,
                    student_id: Some(student_id),
                },
            )
            .await?;

        let links = self.links(Query::new().eq("student_id", student_id)).await?;
        self.resolve(links, |link| &link.guardian_id).await
    }

    pub async fn unlink(&self, principal: &Principal, link_id: &str) -> ServiceResult<()> {
        let link: GuardianLink = fetch(self.portal.store(), link_id).await?;
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Delete,
                Resource::GuardianLink {
                    guardian_id: Some(&link.guardian_id),
                    student_id: Some(&link.student_id),
                },
            )
            .await?;

        if !self.portal.store().delete(GuardianLink::COLLECTION, link_id).await? {
            return Err(ServiceError::not_found(GuardianLink::COLLECTION, link_id));
        }
        tracing::info!(
            "'{}' unlinked guardian '{}' from student '{}'",
            principal.id,
            link.guardian_id,
            link.student_id
        );
        Ok(())
    }

    async fn links(&self, query: Query) -> ServiceResult<Vec<GuardianLink>> {
        find(self.portal.store(), &query.order_by("created_at", Direction::Asc)).await
    }

    async fn resolve(
        &self,
        links: Vec<GuardianLink>,
        other_party: impl Fn(&GuardianLink) -> &String,
    ) -> ServiceResult<Vec<LinkedUser>> {
        let mut linked = Vec::with_capacity(links.len());
        for link in links {
            let found = fetch_optional::<User>(self.portal.store(), other_party(&link)).await?;
            let user = match found {
                Some(user) => user,
                None => {
                    tracing::warn!("guardian link '{}' points to a missing user", link.id);
                    continue;
                }
            };
            linked.push(LinkedUser {
                link_id: link.id,
                relation: link.relation,
                is_primary: link.is_primary,
                user,
            });
        }
        Ok(linked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::tests::{add_user, test_portal};
    use crate::store::memory::tests::race;
    use std::sync::Arc;

    fn link_data(student: &Principal, guardian: &Principal, relation: &str) -> LinkCreateData {
        LinkCreateData {
            student_id: student.id.clone(),
            guardian_id: guardian.id.clone(),
            relation: relation.to_string(),
        }
    }

    #[tokio::test]
    async fn first_link_stays_primary() {
        let fixture = test_portal().await;
        let guardians = fixture.portal.guardians();
        let student = add_user(&fixture.store, "s@school.org", Role::Student).await;
        let mother = add_user(&fixture.store, "m@school.org", Role::Guardian).await;
        let father = add_user(&fixture.store, "f@school.org", Role::Guardian).await;
        let aunt = add_user(&fixture.store, "a@school.org", Role::Guardian).await;

        let first = guardians
            .link(&mother, link_data(&student, &mother, "mother"))
            .await
            .expect("first link");
        assert!(first.is_primary);

        let second = guardians
            .link(&fixture.coordinator, link_data(&student, &father, "father"))
            .await
            .expect("second link");
        assert!(!second.is_primary);

        guardians.unlink(&mother, &first.id).await.expect("unlink");
        let third = guardians
            .link(&aunt, link_data(&student, &aunt, "aunt"))
            .await
            .expect("third link");
        assert!(!third.is_primary);

        let listed = guardians
            .guardians_of(&student, &student.id)
            .await
            .expect("student sees own guardians");
        let relations: Vec<&str> = listed.iter().map(|it| it.relation.as_str()).collect();
        assert_eq!(relations, vec!["father", "aunt"]);
        assert!(listed.iter().all(|it| !it.is_primary));
    }

    #[tokio::test]
    async fn links_are_unique_and_role_checked() {
        let fixture = test_portal().await;
        let student = add_user(&fixture.store, "s@school.org", Role::Student).await;
        let guardian = add_user(&fixture.store, "g@school.org", Role::Guardian).await;
        let other = add_user(&fixture.store, "o@school.org", Role::Guardian).await;
        let teacher = add_user(&fixture.store, "t@school.org", Role::Teacher).await;

        let coordinator = fixture.coordinator.clone();
        let portal = Arc::new(fixture.portal);
        let results = race(4, |_| {
            let portal = portal.clone();
            let data = link_data(&student, &guardian, "mother");
            let guardian = guardian.clone();
            async move { portal.guardians().link(&guardian, data).await }
        })
        .await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ServiceError::ValidationFailed(_))));

        let guardians = portal.guardians();

        assert!(matches!(
            guardians.link(&other, link_data(&student, &guardian, "uncle")).await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            guardians
                .link(&coordinator, link_data(&teacher, &guardian, "uncle"))
                .await,
            Err(ServiceError::ValidationFailed(_))
        ));

        let children = guardians
            .students_of(&guardian, &guardian.id)
            .await
            .expect("own students");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].user.id, student.id);
        assert!(guardians.students_of(&other, &guardian.id).await.is_err());
    }
}
