use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::{normalize_phone, student_login, teacher_login, RecordOutcome, SyncEntity, SyncReport};
use crate::crm::{self, CrmCustomer, CrmEntity, CrmError, CrmLesson, CrmSource, CrmTeacher, IndexQuery, MAX_PAGE_SIZE};
use crate::database::models::{NewAssignment, NewUser, UserUpdate};
use crate::database::{DatabaseError, SchoolStore};
use crate::types::{LessonStatus, LessonType, Role};

const LESSON_ASSIGNMENT_TYPE: &str = "lesson";
const DEFAULT_LESSON_TITLE: &str = "Занятие";

/// Failures that abort a whole run; per-record problems end up in the report instead
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Crm(#[from] CrmError),
}

/// Runs the student, teacher and lesson passes, in that order, against one store
pub struct SyncEngine<'a> {
    crm: &'a dyn CrmSource,
    store: &'a mut dyn SchoolStore,
    branch_id: i64,
}

impl<'a> SyncEngine<'a> {
    pub fn new(crm: &'a dyn CrmSource, store: &'a mut dyn SchoolStore, branch_id: i64) -> Self {
        Self { crm, store, branch_id }
    }

    /// Each pass fetches its full page before touching the store
    #[instrument(skip(self), fields(branch = self.branch_id))]
    pub async fn run(&mut self) -> Result<SyncReport, SyncError> {
        let token = crm::login(self.crm).await?;
        let mut report = SyncReport::default();

        let customers = fetch(self.crm, self.branch_id, &token, CrmEntity::Customer).await?;
        for raw in customers {
            let outcome = match decode::<CrmCustomer>(raw) {
                Ok(customer) => self.sync_student(&customer).await,
                Err(reason) => RecordOutcome::Failed(format!("Student: {}", reason)),
            };
            report.record(SyncEntity::Student, outcome);
        }
        info!("Student pass done: {:?}", report.students);

        let teachers = fetch(self.crm, self.branch_id, &token, CrmEntity::Teacher).await?;
        for raw in teachers {
            let outcome = match decode::<CrmTeacher>(raw) {
                Ok(teacher) => self.sync_teacher(&teacher).await,
                Err(reason) => RecordOutcome::Failed(format!("Teacher: {}", reason)),
            };
            report.record(SyncEntity::Teacher, outcome);
        }
        info!("Teacher pass done: {:?}", report.teachers);

        let lessons = fetch(self.crm, self.branch_id, &token, CrmEntity::Lesson).await?;
        for raw in lessons {
            let outcome = match decode::<CrmLesson>(raw) {
                Ok(lesson) => self.sync_lesson(&lesson).await,
                Err(reason) => RecordOutcome::Failed(format!("Lesson: {}", reason)),
            };
            report.record(SyncEntity::Lesson, outcome);
        }
        info!("Lesson pass done: {:?}", report.lessons);

        Ok(report)
    }

    async fn sync_student(&mut self, customer: &CrmCustomer) -> RecordOutcome {
        if customer.name.is_empty() {
            return RecordOutcome::Skipped(format!("customer {} has no name", customer.id));
        }
        let login = student_login(customer.id);
        let phone = customer.first_phone().map(normalize_phone).filter(|p| !p.is_empty());

        let result = self
            .upsert_user(
                login,
                &customer.name,
                phone,
                customer.paid_lessons(),
                Role::Student,
                customer.id,
            )
            .await;
        outcome_of(SyncEntity::Student, &customer.name, result)
    }

    async fn sync_teacher(&mut self, teacher: &CrmTeacher) -> RecordOutcome {
        if teacher.name.is_empty() {
            return RecordOutcome::Skipped(format!("teacher {} has no name", teacher.id));
        }
        let login = teacher_login(teacher.id);
        let phone = teacher.first_phone().map(normalize_phone).filter(|p| !p.is_empty());

        let result = self
            .upsert_user(login, &teacher.name, phone, None, Role::Teacher, teacher.id)
            .await;
        outcome_of(SyncEntity::Teacher, &teacher.name, result)
    }

    /// Match by login; students also match a not-yet-linked row by phone, which then adopts the login
    async fn upsert_user(
        &mut self,
        login: String,
        full_name: &str,
        phone: Option<String>,
        lessons_paid: Option<i32>,
        role: Role,
        remote_id: i64,
    ) -> Result<RecordOutcome, DatabaseError> {
        let mut existing = self.store.find_user_by_login(&login).await?;
        if existing.is_none() && role == Role::Student {
            if let Some(phone) = &phone {
                existing = self.store.find_unlinked_by_phone(phone, role).await?;
            }
        }

        match existing {
            Some(user) => {
                let update = UserUpdate {
                    login,
                    full_name: full_name.to_string(),
                    phone,
                    lessons_paid,
                };
                self.store.update_user(user.id, update).await?;
                Ok(RecordOutcome::Updated)
            }
            None => {
                let password = phone.clone().unwrap_or_else(|| remote_id.to_string());
                let user = NewUser {
                    login,
                    password,
                    full_name: full_name.to_string(),
                    role,
                    phone,
                    lessons_paid,
                };
                self.store.insert_user(user).await?;
                Ok(RecordOutcome::Added)
            }
        }
    }

    async fn sync_lesson(&mut self, lesson: &CrmLesson) -> RecordOutcome {
        let label = format!("#{}", lesson.id);
        match self.upsert_lesson(lesson).await {
            Ok(outcome) => outcome,
            Err(err) => failed(SyncEntity::Lesson, &label, &err),
        }
    }

    async fn upsert_lesson(&mut self, lesson: &CrmLesson) -> Result<RecordOutcome, DatabaseError> {
        let Some(customer_id) = lesson.customer_ids.first().copied() else {
            return Ok(RecordOutcome::Skipped(format!("lesson {} has no customer", lesson.id)));
        };
        let Some(student) = self.store.find_user_by_login(&student_login(customer_id)).await? else {
            return Ok(RecordOutcome::Skipped(format!(
                "lesson {}: customer {} is not synced",
                lesson.id, customer_id
            )));
        };
        let teacher_id = match lesson.teacher_ids.first() {
            Some(id) => self
                .store
                .find_user_by_login(&teacher_login(*id))
                .await?
                .map(|teacher| teacher.id),
            None => None,
        };

        let status = LessonStatus::from_crm_code(lesson.status);
        let assignment = NewAssignment {
            student_id: student.id,
            teacher_id,
            title: lesson
                .topic
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_LESSON_TITLE)
                .to_string(),
            subject: lesson.subject_id.map(|id| id.to_string()),
            due_date: lesson.day(),
            due_time: lesson.start_time(),
            assignment_type: LESSON_ASSIGNMENT_TYPE.to_string(),
            lesson_type: LessonType::from_crm_code(lesson.lesson_type_id),
            status,
            completed: status == LessonStatus::Attended,
            description: lesson.note.clone().filter(|n| !n.trim().is_empty()),
            alfacrm_id: lesson.id.to_string(),
        };

        match self.store.find_assignment_by_external_id(&assignment.alfacrm_id).await? {
            Some(row) => {
                self.store.update_assignment(row.id, assignment).await?;
                Ok(RecordOutcome::Updated)
            }
            None => {
                self.store.insert_assignment(assignment).await?;
                Ok(RecordOutcome::Added)
            }
        }
    }
}

/// One full page of `entity`; takes the CRM handle alone so no borrow of the store crosses the await
async fn fetch(crm: &dyn CrmSource, branch_id: i64, token: &str, entity: CrmEntity) -> Result<Vec<Value>, CrmError> {
    let query = IndexQuery::new(branch_id, 0, MAX_PAGE_SIZE);
    let page = crm.index(token, entity, &query).await?;
    debug!("Fetched {} of {} from {}", page.items.len(), page.total, entity.path());
    Ok(page.items)
}

fn decode<T: DeserializeOwned>(raw: Value) -> Result<T, String> {
    serde_json::from_value(raw).map_err(|e| format!("invalid record: {}", e))
}

fn outcome_of(entity: SyncEntity, label: &str, result: Result<RecordOutcome, DatabaseError>) -> RecordOutcome {
    result.unwrap_or_else(|err| failed(entity, label, &err))
}

fn failed(entity: SyncEntity, label: &str, err: &DatabaseError) -> RecordOutcome {
    warn!("{} {} failed to sync: {}", entity.label(), label, err);
    RecordOutcome::Failed(format!("{} {}: {}", entity.label(), label, err))
}
