//! Shared service context handed to every request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;

use crate::data::assignment::db::AssignmentService;
use crate::data::class::db::ClassService;
use crate::data::enrollment::db::EnrollmentRegistry;
use crate::data::grade::db::GradeService;
use crate::data::guardian::db::GuardianService;
use crate::data::lesson::db::AttendanceService;
use crate::data::schedule::db::ScheduleService;
use crate::data::subject::db::SubjectService;
use crate::data::user::db::UserService;
use crate::policy::Policy;
use crate::session::{AuthSettings, Identity, SessionHub};
use crate::storage::ObjectStorage;
use crate::store::RecordStore;

/// Collections and the fields that must be unique within them.
pub const UNIQUE_KEYS: &[(&str, &[&str])] = &[
    ("users", &["email"]),
    ("credentials", &["email"]),
    ("password_resets", &["token_hash"]),
    ("enrollment_codes", &["code"]),
    ("guardian_links", &["student_id", "guardian_id"]),
    ("submissions", &["assignment_id", "student_id"]),
    ("grades", &["student_id", "class_id", "subject_id", "assessment"]),
];

pub struct Portal {
    store: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock + Send + Sync>,
    auth: AuthSettings,
    sessions: SessionHub,
}

impl std::fmt::Debug for Portal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portal")
            .field("session_days", &self.auth.session_days)
            .finish_non_exhaustive()
    }
}

impl Portal {
    pub fn new(
        store: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStorage>,
        clock: Arc<dyn Clock + Send + Sync>,
        auth: AuthSettings,
    ) -> Portal {
        Portal {
            store,
            objects,
            clock,
            auth,
            sessions: SessionHub::default(),
        }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn objects(&self) -> &dyn ObjectStorage {
        self.objects.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    pub fn auth(&self) -> &AuthSettings {
        &self.auth
    }

    pub fn sessions(&self) -> &SessionHub {
        &self.sessions
    }

    pub fn policy(&self) -> Policy<'_> {
        Policy::new(self.store())
    }

    pub fn identity(&self) -> Identity<'_> {
        Identity::new(self)
    }

    pub fn enrollment(&self) -> EnrollmentRegistry<'_> {
        EnrollmentRegistry::new(self)
    }

    pub fn users(&self) -> UserService<'_> {
        UserService::new(self)
    }

    pub fn classes(&self) -> ClassService<'_> {
        ClassService::new(self)
    }

    pub fn subjects(&self) -> SubjectService<'_> {
        SubjectService::new(self)
    }

    pub fn assignments(&self) -> AssignmentService<'_> {
        AssignmentService::new(self)
    }

    pub fn grades(&self) -> GradeService<'_> {
        GradeService::new(self)
    }

    pub fn attendance(&self) -> AttendanceService<'_> {
        AttendanceService::new(self)
    }

    pub fn guardians(&self) -> GuardianService<'_> {
        GuardianService::new(self)
    }

    pub fn schedules(&self) -> ScheduleService<'_> {
        ScheduleService::new(self)
    }
}
