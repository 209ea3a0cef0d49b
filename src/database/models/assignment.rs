use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;

use crate::types::{LessonStatus, LessonType};

#[derive(Debug, Clone, FromRow)]
pub struct Assignment {
    pub id: i32,
    pub student_id: i32,
    pub teacher_id: Option<i32>,
    pub title: String,
    pub subject: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
    pub assignment_type: String,
    pub lesson_type: Option<String>,
    pub status: Option<String>,
    pub completed: bool,
    pub description: Option<String>,
    pub answer: Option<String>,
    pub alfacrm_id: Option<String>,
}

/// Insert/update payload; lessons synced from the CRM always carry `alfacrm_id`
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub student_id: i32,
    pub teacher_id: Option<i32>,
    pub title: String,
    pub subject: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
    pub assignment_type: String,
    pub lesson_type: LessonType,
    pub status: LessonStatus,
    pub completed: bool,
    pub description: Option<String>,
    pub alfacrm_id: String,
}

/// Shape consumed by the dashboard
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub id: String,
    pub student_id: String,
    pub teacher_id: Option<String>,
    pub title: String,
    pub subject: String,
    pub date: Option<String>,
    pub due_time: Option<String>,
    #[serde(rename = "type")]
    pub assignment_type: String,
    pub lesson_type: Option<String>,
    pub status: Option<String>,
    pub completed: bool,
    pub description: Option<String>,
    pub answer: Option<String>,
    pub external_id: Option<String>,
}

impl From<Assignment> for AssignmentView {
    fn from(row: Assignment) -> Self {
        Self {
            id: row.id.to_string(),
            student_id: row.student_id.to_string(),
            teacher_id: row.teacher_id.map(|id| id.to_string()),
            title: row.title,
            subject: row.subject.unwrap_or_default(),
            date: row.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            due_time: row.due_time,
            assignment_type: row.assignment_type,
            lesson_type: row.lesson_type,
            status: row.status,
            completed: row.completed,
            description: row.description,
            answer: row.answer,
            external_id: row.alfacrm_id,
        }
    }
}
