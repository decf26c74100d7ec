use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{check_id, check_required, finish, Collection, Entity, FieldErrors};

/// A clock-in/clock-out span. `clock_out == None` means the employee is
/// still on the clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRecord {
    #[serde(default)]
    pub id: String,
    pub employee_id: String,
    pub location_id: Option<String>,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub breaks: Vec<Break>,
}

/// Break within a shift; an open break has no `end` yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Break {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Break>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Break>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Entity for TimeRecord {
    const COLLECTION: Collection = Collection::TimeRecords;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "employee_id",
        "location_id",
        "clock_in",
        "clock_out",
        "breaks",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_id(&self.id, &mut errors);
        check_required("employeeId", &self.employee_id, &mut errors);

        if let Some(clock_out) = self.clock_out {
            if clock_out < self.clock_in {
                errors.insert("clockOut".into(), "clockOut must not precede clockIn".into());
            }
        }

        for (index, b) in self.breaks.iter().enumerate() {
            if b.end.is_some_and(|end| end < b.start) {
                errors.insert(
                    format!("breaks[{index}]"),
                    "break end must not precede its start".into(),
                );
            }
        }

        finish(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn shift() -> TimeRecord {
        TimeRecord {
            id: "TR001".into(),
            employee_id: "EMP001".into(),
            location_id: None,
            clock_in: Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap(),
            clock_out: Some(Utc.with_ymd_and_hms(2024, 3, 4, 16, 30, 0).unwrap()),
            breaks: vec![],
        }
    }

    #[test]
    fn accepts_a_closed_shift() {
        assert!(shift().validate().is_ok());
    }

    #[test]
    fn rejects_clock_out_before_clock_in() {
        let mut record = shift();
        record.clock_out = Some(Utc.with_ymd_and_hms(2024, 3, 4, 7, 0, 0).unwrap());
        let errors = record.validate().unwrap_err();
        assert!(errors.contains_key("clockOut"));
    }

    #[test]
    fn rejects_inverted_break() {
        let mut record = shift();
        record.breaks.push(Break {
            start: Utc.with_ymd_and_hms(2024, 3, 4, 12, 30, 0).unwrap(),
            end: Some(Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap()),
        });
        let errors = record.validate().unwrap_err();
        assert!(errors.contains_key("breaks[0]"));
    }

    #[test]
    fn open_break_is_valid() {
        let mut record = shift();
        record.clock_out = None;
        record.breaks.push(Break {
            start: Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
            end: None,
        });
        assert!(record.validate().is_ok());
    }
}
