use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::Role;

/// Every login written by the CRM sync starts with this; such rows are owned by one remote record
pub const LINKED_LOGIN_PREFIX: &str = "alfacrm_";

/// Row of the unified `users` table (admins, teachers and students)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub login: String,
    pub full_name: Option<String>,
    pub role: String,
    pub phone: Option<String>,
    pub lessons_attended: Option<i32>,
    pub lessons_missed: Option<i32>,
    pub lessons_paid: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub login: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub lessons_paid: Option<i32>,
}

/// Fields the CRM sync overwrites on an existing row
#[derive(Debug, Clone, PartialEq)]
pub struct UserUpdate {
    pub login: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub lessons_paid: Option<i32>,
}

/// Public profile returned by the admin login
#[derive(Debug, Clone, Serialize)]
pub struct AdminProfile {
    pub id: i32,
    pub login: String,
    #[serde(rename = "fullName")]
    pub full_name: Option<String>,
    pub role: String,
    pub phone: Option<String>,
    pub lessons_attended: Option<i32>,
    pub lessons_missed: Option<i32>,
    pub lessons_paid: Option<i32>,
}

impl From<User> for AdminProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            login: user.login,
            full_name: user.full_name,
            role: user.role,
            phone: user.phone,
            lessons_attended: user.lessons_attended,
            lessons_missed: user.lessons_missed,
            lessons_paid: user.lessons_paid,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: String,
    pub login: String,
    pub full_name: String,
    pub role: String,
    pub phone: String,
    pub teacher_id: String,
    pub balance: i64,
    pub lessons_attended: i32,
    pub lessons_missed: i32,
    pub lessons_paid: i32,
}

impl From<User> for StudentSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            login: user.login,
            full_name: user.full_name.unwrap_or_default(),
            role: user.role,
            phone: user.phone.unwrap_or_default(),
            teacher_id: String::new(),
            balance: 0,
            lessons_attended: user.lessons_attended.unwrap_or(0),
            lessons_missed: user.lessons_missed.unwrap_or(0),
            lessons_paid: user.lessons_paid.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSummary {
    pub id: String,
    pub login: String,
    pub full_name: String,
    pub role: String,
    pub phone: String,
}

impl From<User> for TeacherSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            login: user.login,
            full_name: user.full_name.unwrap_or_default(),
            role: user.role,
            phone: user.phone.unwrap_or_default(),
        }
    }
}
