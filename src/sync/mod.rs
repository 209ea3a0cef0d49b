//! One-way AlfaCRM → database reconciliation.

pub mod engine;

use serde::Serialize;
use serde_json::{json, Value};

use crate::database::models::LINKED_LOGIN_PREFIX;

pub use engine::{SyncEngine, SyncError};

/// Failure messages kept in a report; later ones are only counted
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Login a CRM customer is matched by
pub fn student_login(remote_id: i64) -> String {
    format!("{}{}", LINKED_LOGIN_PREFIX, remote_id)
}

/// Teachers get their own prefix so customer and teacher ids never collide
pub fn teacher_login(remote_id: i64) -> String {
    format!("{}teacher_{}", LINKED_LOGIN_PREFIX, remote_id)
}

/// Digits only; `"+7 (900) 123-45-67"` becomes `"79001234567"`
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// What happened to one remote record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Added,
    Updated,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEntity {
    Student,
    Teacher,
    Lesson,
}

impl SyncEntity {
    pub fn label(&self) -> &'static str {
        match self {
            SyncEntity::Student => "Student",
            SyncEntity::Teacher => "Teacher",
            SyncEntity::Lesson => "Lesson",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassTally {
    pub added: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl PassTally {
    pub fn processed(&self) -> u32 {
        self.added + self.updated + self.skipped + self.failed
    }
}

/// Per-entity tallies plus the first few failure messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub students: PassTally,
    pub teachers: PassTally,
    pub lessons: PassTally,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn tally(&self, entity: SyncEntity) -> &PassTally {
        match entity {
            SyncEntity::Student => &self.students,
            SyncEntity::Teacher => &self.teachers,
            SyncEntity::Lesson => &self.lessons,
        }
    }

    fn tally_mut(&mut self, entity: SyncEntity) -> &mut PassTally {
        match entity {
            SyncEntity::Student => &mut self.students,
            SyncEntity::Teacher => &mut self.teachers,
            SyncEntity::Lesson => &mut self.lessons,
        }
    }

    pub fn record(&mut self, entity: SyncEntity, outcome: RecordOutcome) {
        let tally = self.tally_mut(entity);
        match outcome {
            RecordOutcome::Added => tally.added += 1,
            RecordOutcome::Updated => tally.updated += 1,
            RecordOutcome::Skipped(_) => tally.skipped += 1,
            RecordOutcome::Failed(reason) => {
                tally.failed += 1;
                if self.errors.len() < MAX_REPORTED_ERRORS {
                    self.errors.push(reason);
                }
            }
        }
    }

    pub fn skipped(&self) -> u32 {
        self.students.skipped + self.teachers.skipped + self.lessons.skipped
    }

    pub fn failed(&self) -> u32 {
        self.students.failed + self.teachers.failed + self.lessons.failed
    }

    /// `stats` object of the sync response
    pub fn stats(&self) -> Value {
        json!({
            "students_added": self.students.added,
            "students_updated": self.students.updated,
            "teachers_added": self.teachers.added,
            "teachers_updated": self.teachers.updated,
            "lessons_added": self.lessons.added,
            "lessons_updated": self.lessons.updated,
            "skipped": self.skipped(),
            "failed": self.failed(),
        })
    }
}
