use serde::{Deserialize, Serialize};

/// User role; closed set stored as lowercase text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attendance state of a lesson
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    Scheduled,
    Attended,
    Missed,
}

impl LessonStatus {
    /// AlfaCRM lesson status: 1 planned, 2 held, 3 cancelled/missed
    pub fn from_crm_code(code: Option<i64>) -> Self {
        match code {
            Some(2) => LessonStatus::Attended,
            Some(3) => LessonStatus::Missed,
            _ => LessonStatus::Scheduled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Scheduled => "scheduled",
            LessonStatus::Attended => "attended",
            LessonStatus::Missed => "missed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    Group,
    IndividualSpeech,
    IndividualNeuro,
}

impl LessonType {
    /// AlfaCRM `lesson_type_id`: 1 individual, 2 group, 3 second individual track
    pub fn from_crm_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => LessonType::IndividualSpeech,
            Some(3) => LessonType::IndividualNeuro,
            _ => LessonType::Group,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LessonType::Group => "group",
            LessonType::IndividualSpeech => "individual_speech",
            LessonType::IndividualNeuro => "individual_neuro",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_with_scheduled_fallback() {
        assert_eq!(LessonStatus::from_crm_code(Some(1)), LessonStatus::Scheduled);
        assert_eq!(LessonStatus::from_crm_code(Some(2)), LessonStatus::Attended);
        assert_eq!(LessonStatus::from_crm_code(Some(3)), LessonStatus::Missed);
        assert_eq!(LessonStatus::from_crm_code(Some(99)), LessonStatus::Scheduled);
        assert_eq!(LessonStatus::from_crm_code(None), LessonStatus::Scheduled);
    }

    #[test]
    fn lesson_types_map_with_group_fallback() {
        assert_eq!(LessonType::from_crm_code(Some(1)), LessonType::IndividualSpeech);
        assert_eq!(LessonType::from_crm_code(Some(2)), LessonType::Group);
        assert_eq!(LessonType::from_crm_code(Some(3)), LessonType::IndividualNeuro);
        assert_eq!(LessonType::from_crm_code(Some(42)), LessonType::Group);
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(serde_json::to_value(LessonType::IndividualSpeech).unwrap(), "individual_speech");
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "admin");
    }
}
