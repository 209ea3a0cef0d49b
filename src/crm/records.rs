use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// AlfaCRM customer (a student)
#[derive(Debug, Clone, Deserialize)]
pub struct CrmCustomer {
    #[serde(deserialize_with = "required_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text_list")]
    pub phone: Vec<String>,
    #[serde(default, deserialize_with = "text_list")]
    pub email: Vec<String>,
    #[serde(default, deserialize_with = "optional_number")]
    pub paid_lesson_count: Option<i64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub paid_count: Option<i64>,
}

impl CrmCustomer {
    /// Paid lessons; older accounts only report `paid_count`
    pub fn paid_lessons(&self) -> Option<i32> {
        self.paid_lesson_count
            .or(self.paid_count)
            .and_then(|n| i32::try_from(n).ok())
    }

    pub fn first_phone(&self) -> Option<&str> {
        self.phone.iter().map(String::as_str).find(|p| !p.trim().is_empty())
    }
}

/// AlfaCRM teacher
#[derive(Debug, Clone, Deserialize)]
pub struct CrmTeacher {
    #[serde(deserialize_with = "required_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text_list")]
    pub phone: Vec<String>,
    #[serde(default, deserialize_with = "text_list")]
    pub email: Vec<String>,
}

impl CrmTeacher {
    pub fn first_phone(&self) -> Option<&str> {
        self.phone.iter().map(String::as_str).find(|p| !p.trim().is_empty())
    }
}

/// AlfaCRM lesson; `status` and `lesson_type_id` are raw codes
#[derive(Debug, Clone, Deserialize)]
pub struct CrmLesson {
    #[serde(deserialize_with = "required_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "id_list")]
    pub customer_ids: Vec<i64>,
    #[serde(default, deserialize_with = "id_list")]
    pub teacher_ids: Vec<i64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub subject_id: Option<i64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub lesson_type_id: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time_from: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl CrmLesson {
    /// Lesson day, from `date` or the date part of `time_from`
    pub fn day(&self) -> Option<NaiveDate> {
        self.date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
            .or_else(|| self.start().map(|ts| ts.date()))
    }

    /// Start time as `HH:MM`
    pub fn start_time(&self) -> Option<String> {
        self.start().map(|ts| ts.format("%H:%M").to_string())
    }

    fn start(&self) -> Option<NaiveDateTime> {
        let raw = self.time_from.as_deref()?.trim();
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
            .ok()
    }
}

// AlfaCRM is loose with JSON types: ids and counters arrive as numbers or
// numeric strings, contact fields as a string or a list.

fn number_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

fn required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    number_of(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid id: {}", value)))
}

fn optional_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(number_of(&value))
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn text_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

fn id_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(number_of).collect(),
        other => number_of(&other).into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn customer_accepts_loose_types() {
        let customer: CrmCustomer = serde_json::from_value(json!({
            "id": "15",
            "name": " Анна Петрова ",
            "phone": "+7 (900) 123-45-67",
            "paid_lesson_count": "8"
        }))
        .unwrap();
        assert_eq!(customer.id, 15);
        assert_eq!(customer.name, "Анна Петрова");
        assert_eq!(customer.first_phone(), Some("+7 (900) 123-45-67"));
        assert_eq!(customer.paid_lessons(), Some(8));
        assert!(customer.email.is_empty());
    }

    #[test]
    fn customer_phone_list_skips_blanks() {
        let customer: CrmCustomer = serde_json::from_value(json!({
            "id": 3,
            "name": "Ivan",
            "phone": ["", "89001112233"],
            "paid_count": 4
        }))
        .unwrap();
        assert_eq!(customer.first_phone(), Some("89001112233"));
        assert_eq!(customer.paid_lessons(), Some(4));
    }

    #[test]
    fn customer_without_id_is_rejected() {
        let parsed: Result<CrmCustomer, _> = serde_json::from_value(json!({"name": "x"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn lesson_time_parts() {
        let lesson: CrmLesson = serde_json::from_value(json!({
            "id": 501,
            "customer_ids": [10, "11"],
            "teacher_ids": [],
            "status": 2,
            "lesson_type_id": "1",
            "time_from": "2024-03-05 16:30:00"
        }))
        .unwrap();
        assert_eq!(lesson.customer_ids, vec![10, 11]);
        assert_eq!(lesson.day(), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(lesson.start_time().as_deref(), Some("16:30"));
        assert_eq!(lesson.lesson_type_id, Some(1));
    }

    #[test]
    fn lesson_date_field_wins() {
        let lesson: CrmLesson = serde_json::from_value(json!({
            "id": 1,
            "date": "2024-03-06",
            "time_from": "2024-03-05 16:30:00"
        }))
        .unwrap();
        assert_eq!(lesson.day(), NaiveDate::from_ymd_opt(2024, 3, 6));
    }
}
