use bson::doc;
use chrono::Datelike;
use rand::Rng;

use super::{format_code, EnrollmentCode, Redemption};
use crate::data::{find, from_document, to_document, Page, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::role::Role;
use crate::session::Principal;
use crate::store::{Direction, Predicate, Query};

const ISSUE_ATTEMPTS: usize = 8;

pub struct EnrollmentRegistry<'a> {
    portal: &'a Portal,
}

impl<'a> EnrollmentRegistry<'a> {
    pub fn new(portal: &'a Portal) -> EnrollmentRegistry<'a> {
        EnrollmentRegistry { portal }
    }

    pub async fn issue(&self, principal: &Principal, role: Role) -> ServiceResult<EnrollmentCode> {
        self.portal
            .policy()
            .authorize(principal, Action::Create, Resource::EnrollmentCode)
            .await?;

        let now = self.portal.now();
        for _ in 0..ISSUE_ATTEMPTS {
            let serial: u16 = rand::thread_rng().gen_range(0..10_000);
            let mut code = EnrollmentCode {
                id: String::new(),
                code: format_code(role, now.year(), serial),
                role,
                consumed: false,
                issued_by: principal.id.clone(),
                issued_at: now,
                consumed_at: None,
            };

            let inserted = self
                .portal
                .store()
                .insert_unique(
                    EnrollmentCode::COLLECTION,
                    &[Predicate::eq("code", code.code.as_str())],
                    to_document(&code)?,
                )
                .await?;

            match inserted {
                Some(id) => {
                    code.id = id;
                    tracing::info!("'{}' issued {} code '{}'", principal.id, role, code.code);
                    return Ok(code);
                }
                None => tracing::debug!("code '{}' already exists, retrying", code.code),
            }
        }

        Err(ServiceError::invalid(
            "Unable to generate a unique enrollment code, try again.",
        ))
    }

    /// Consumes an unused code issued for `role`.
    ///
    /// The consumed flag is flipped with a single conditional write, so of
    /// several concurrent redemptions of the same code exactly one succeeds.
    pub async fn redeem(&self, code: &str, role: Role) -> ServiceResult<Redemption> {
        let claimed = self
            .portal
            .store()
            .claim_one(
                EnrollmentCode::COLLECTION,
                &[
                    Predicate::eq("code", code),
                    Predicate::eq("consumed", false),
                    Predicate::eq("role", role),
                ],
                doc! {
                    "consumed": true,
                    "consumed_at": self.portal.now().timestamp_millis(),
                },
            )
            .await?
            .ok_or(ServiceError::InvalidOrUsedCode)?;

        let claimed: EnrollmentCode = from_document(claimed)?;
        tracing::info!("consumed {} code '{}'", role, claimed.code);

        Ok(Redemption {
            matched_code_id: claimed.id,
        })
    }

    /// Unconsumed codes for `role`, newest first.
    pub async fn list_available(
        &self,
        principal: &Principal,
        role: Role,
        page: Page,
    ) -> ServiceResult<Vec<EnrollmentCode>> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::EnrollmentCode)
            .await?;

        let query = Query::new()
            .eq("role", role)
            .eq("consumed", false)
            .order_by("issued_at", Direction::Desc);
        find(self.portal.store(), &page.apply(query)).await
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> ServiceResult<()> {
        self.portal
            .policy()
            .authorize(principal, Action::Delete, Resource::EnrollmentCode)
            .await?;

        if !self
            .portal
            .store()
            .delete(EnrollmentCode::COLLECTION, id)
            .await?
        {
            return Err(ServiceError::not_found(EnrollmentCode::COLLECTION, id));
        }
        tracing::info!("'{}' deleted enrollment code '{}'", principal.id, id);
        Ok(())
    }
}
