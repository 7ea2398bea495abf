use bson::{doc, Document};

use super::{ProfileUpdate, User};
use crate::data::{fetch, fetch_optional, find, require_text, Page, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::role::Role;
use crate::session::Principal;
use crate::store::{Direction, Query, RecordStore};

pub struct UserService<'a> {
    portal: &'a Portal,
}

impl<'a> UserService<'a> {
    pub fn new(portal: &'a Portal) -> UserService<'a> {
        UserService { portal }
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> ServiceResult<User> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::User { id })
            .await?;
        fetch(self.portal.store(), id).await
    }

    pub async fn list_by_role(
        &self,
        principal: &Principal,
        role: Role,
        page: Page,
    ) -> ServiceResult<Vec<User>> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::UserListing)
            .await?;

        let query = Query::new()
            .eq("role", role)
            .order_by("display_name", Direction::Asc);
        find(self.portal.store(), &page.apply(query)).await
    }

    pub async fn update_profile(
        &self,
        principal: &Principal,
        id: &str,
        update: ProfileUpdate,
    ) -> ServiceResult<User> {
        self.portal
            .policy()
            .authorize(principal, Action::Update, Resource::User { id })
            .await?;

        let mut patch = Document::new();
        if let Some(name) = update.display_name {
            require_text("display name", &name)?;
            patch.insert("display_name", name.trim());
        }
        if let Some(phone) = update.phone {
            let phone = phone.trim();
            if phone.is_empty() {
                patch.insert("phone", bson::Bson::Null);
            } else {
                patch.insert("phone", phone);
            }
        }

        if !patch.is_empty() && !self.portal.store().update(User::COLLECTION, id, patch).await? {
            return Err(ServiceError::not_found(User::COLLECTION, id));
        }
        tracing::debug!("'{}' updated profile '{}'", principal.id, id);
        fetch(self.portal.store(), id).await
    }

    /// Inactive accounts can't sign in or resume sessions.
    pub async fn set_active(
        &self,
        principal: &Principal,
        id: &str,
        active: bool,
    ) -> ServiceResult<User> {
        self.portal
            .policy()
            .authorize(principal, Action::Update, Resource::UserListing)
            .await?;

        if !self
            .portal
            .store()
            .update(User::COLLECTION, id, doc! { "active": active })
            .await?
        {
            return Err(ServiceError::not_found(User::COLLECTION, id));
        }
        tracing::info!("'{}' set active={} on '{}'", principal.id, active, id);
        fetch(self.portal.store(), id).await
    }
}

/// Loads the profiles of `ids`, skipping users that no longer exist.
pub(crate) async fn profiles(store: &dyn RecordStore, ids: &[String]) -> ServiceResult<Vec<User>> {
    let mut users = Vec::with_capacity(ids.len());
    for id in ids {
        match fetch_optional::<User>(store, id).await? {
            Some(user) => users.push(user),
            None => tracing::warn!("dangling reference to user '{}'", id),
        }
    }
    Ok(users)
}

/// Fails unless `id` names an existing user with the given role.
pub(crate) async fn require_role(
    store: &dyn RecordStore,
    id: &str,
    role: Role,
) -> ServiceResult<User> {
    let user: User = fetch(store, id).await?;
    if user.role != role {
        return Err(ServiceError::invalid(format!(
            "user '{}' is a {}, not a {}",
            id, user.role, role
        )));
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::tests::{add_user, test_portal};

    #[tokio::test]
    async fn profile_updates_are_self_or_coordinator() {
        let fixture = test_portal().await;
        let users = fixture.portal.users();
        let student = add_user(&fixture.store, "s@school.org", Role::Student).await;
        let other = add_user(&fixture.store, "o@school.org", Role::Student).await;

        let updated = users
            .update_profile(
                &student,
                &student.id,
                ProfileUpdate {
                    display_name: Some(" Bia ".to_string()),
                    phone: Some("+55 11 5555".to_string()),
                },
            )
            .await
            .expect("own profile");
        assert_eq!(updated.display_name, "Bia");
        assert_eq!(updated.phone.as_deref(), Some("+55 11 5555"));
        assert_eq!(updated.role, Role::Student);

        let foreign = users
            .update_profile(&other, &student.id, ProfileUpdate::default())
            .await;
        assert!(matches!(foreign, Err(ServiceError::Unauthorized(_))));

        let blank = users
            .update_profile(
                &fixture.coordinator,
                &student.id,
                ProfileUpdate {
                    display_name: Some("  ".to_string()),
                    phone: None,
                },
            )
            .await;
        assert!(matches!(blank, Err(ServiceError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn listing_and_deactivation_need_a_coordinator() {
        let fixture = test_portal().await;
        let users = fixture.portal.users();
        let teacher = add_user(&fixture.store, "t@school.org", Role::Teacher).await;
        add_user(&fixture.store, "s@school.org", Role::Student).await;

        let teachers = users
            .list_by_role(&fixture.coordinator, Role::Teacher, Page::default())
            .await
            .expect("list");
        assert_eq!(teachers.len(), 1);
        assert_eq!(teachers[0].id, teacher.id);

        assert!(users
            .list_by_role(&teacher, Role::Student, Page::default())
            .await
            .is_err());
        assert!(matches!(
            users.set_active(&teacher, &teacher.id, false).await,
            Err(ServiceError::Unauthorized(_))
        ));

        let disabled = users
            .set_active(&fixture.coordinator, &teacher.id, false)
            .await
            .expect("deactivate");
        assert!(!disabled.active);
        assert!(matches!(
            users.set_active(&fixture.coordinator, "missing", true).await,
            Err(ServiceError::NotFound { .. })
        ));
    }
}
