use super::{Schedule, ScheduleData};
use crate::data::class::Class;
use crate::data::subject::Subject;
use crate::data::user::db::require_role;
use crate::data::{fetch, find, to_document, Record};
use crate::error::{ServiceError, ServiceResult};
use crate::policy::{Action, Resource};
use crate::portal::Portal;
use crate::role::Role;
use crate::session::Principal;
use crate::store::{Direction, Query};

pub struct ScheduleService<'a> {
    portal: &'a Portal,
}

impl<'a> ScheduleService<'a> {
    pub fn new(portal: &'a Portal) -> ScheduleService<'a> {
        ScheduleService { portal }
    }

    async fn checked(
        &self,
        principal: &Principal,
        action: Action,
        data: ScheduleData,
    ) -> ServiceResult<Schedule> {
        self.portal
            .policy()
            .authorize(
                principal,
                action,
                Resource::Schedule {
                    class_id: &data.class_id,
                },
            )
            .await?;
        data.validate()?;

        let store = self.portal.store();
        fetch::<Class>(store, &data.class_id).await?;
        fetch::<Subject>(store, &data.subject_id).await?;
        require_role(store, &data.teacher_id, Role::Teacher).await?;

        Ok(Schedule {
            id: String::new(),
            class_id: data.class_id,
            subject_id: data.subject_id,
            teacher_id: data.teacher_id,
            weekday: data.weekday,
            starts: data.starts,
            ends: data.ends,
            room: data.room.filter(|it| !it.trim().is_empty()),
        })
    }

    pub async fn create(
        &self,
        principal: &Principal,
        data: ScheduleData,
    ) -> ServiceResult<Schedule> {
        let mut schedule = self.checked(principal, Action::Create, data).await?;
        schedule.id = self
            .portal
            .store()
            .insert(Schedule::COLLECTION, to_document(&schedule)?)
            .await?;

        tracing::info!("'{}' added schedule slot '{}'", principal.id, schedule.id);
        Ok(schedule)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: &str,
        data: ScheduleData,
    ) -> ServiceResult<Schedule> {
        fetch::<Schedule>(self.portal.store(), id).await?;
        let mut schedule = self.checked(principal, Action::Update, data).await?;

        if !self
            .portal
            .store()
            .update(Schedule::COLLECTION, id, to_document(&schedule)?)
            .await?
        {
            return Err(ServiceError::not_found(Schedule::COLLECTION, id));
        }
        schedule.id = id.to_string();
        Ok(schedule)
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> ServiceResult<()> {
        let schedule: Schedule = fetch(self.portal.store(), id).await?;
        self.portal
            .policy()
            .authorize(
                principal,
                Action::Delete,
                Resource::Schedule {
                    class_id: &schedule.class_id,
                },
            )
            .await?;

        if !self.portal.store().delete(Schedule::COLLECTION, id).await? {
            return Err(ServiceError::not_found(Schedule::COLLECTION, id));
        }
        tracing::info!("'{}' removed schedule slot '{}'", principal.id, id);
        Ok(())
    }

    pub async fn for_class(
        &self,
        principal: &Principal,
        class_id: &str,
    ) -> ServiceResult<Vec<Schedule>> {
        self.portal
            .policy()
            .authorize(principal, Action::Read, Resource::Schedule { class_id })
            .await?;

        let query = Query::new()
            .eq("class_id", class_id)
            .order_by("starts", Direction::Asc);
        let mut slots: Vec<Schedule> = find(self.portal.store(), &query).await?;
        slots.sort_by_key(|it| (it.weekday as u8, it.starts));
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::class::db::tests::class_of;
    use crate::data::schedule::Weekday;
    use crate::data::subject::SubjectData;
    use crate::portal::tests::{add_user, test_portal};
    use chrono::NaiveTime;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn slots_are_validated_and_sorted() {
        let fixture = test_portal().await;
        let portal = &fixture.portal;
        let coordinator = &fixture.coordinator;
        let class = class_of(portal, coordinator, "5A").await;
        let subject = portal
            .subjects()
            .create(coordinator, SubjectData { name: "Inglês".to_string() })
            .await
            .unwrap();
        let teacher = add_user(&fixture.store, "t@school.org", Role::Teacher).await;
        let student = add_user(&fixture.store, "s@school.org", Role::Student).await;
        portal.classes().add_student(coordinator, &class.id, &student.id).await.unwrap();

        let slot = |weekday: Weekday, starts: NaiveTime, ends: NaiveTime| ScheduleData {
            class_id: class.id.clone(),
            subject_id: subject.id.clone(),
            teacher_id: teacher.id.clone(),
            weekday,
            starts,
            ends,
            room: Some("12".to_string()),
        };
        let schedules = portal.schedules();

        assert!(matches!(
            schedules
                .create(coordinator, slot(Weekday::Monday, at(9, 0), at(9, 0)))
                .await,
            Err(ServiceError::ValidationFailed(_))
        ));
        assert!(matches!(
            schedules
                .create(&teacher, slot(Weekday::Monday, at(9, 0), at(9, 50)))
                .await,
            Err(ServiceError::Unauthorized(_))
        ));

        let friday = schedules
            .create(coordinator, slot(Weekday::Friday, at(7, 30), at(8, 20)))
            .await
            .unwrap();
        schedules
            .create(coordinator, slot(Weekday::Monday, at(10, 0), at(10, 50)))
            .await
            .unwrap();
        schedules
            .create(coordinator, slot(Weekday::Monday, at(8, 0), at(8, 50)))
            .await
            .unwrap();

        let listed = schedules.for_class(&student, &class.id).await.expect("member reads");
        let order: Vec<(Weekday, NaiveTime)> =
            listed.iter().map(|it| (it.weekday, it.starts)).collect();
        assert_eq!(
            order,
            vec![
                (Weekday::Monday, at(8, 0)),
                (Weekday::Monday, at(10, 0)),
                (Weekday::Friday, at(7, 30)),
            ]
        );

        let moved = schedules
            .update(coordinator, &friday.id, slot(Weekday::Thursday, at(7, 30), at(8, 20)))
            .await
            .unwrap();
        assert_eq!(moved.weekday, Weekday::Thursday);
        schedules.delete(coordinator, &friday.id).await.unwrap();
        assert_eq!(schedules.for_class(coordinator, &class.id).await.unwrap().len(), 2);
    }
}
