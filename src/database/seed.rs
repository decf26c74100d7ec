//! First-run data: the settings singleton and a small sample roster.
//!
//! Runs through [`RecordStore`] so the memory and Postgres backends seed
//! identically.

use tracing::info;

use crate::records::{Collection, Department, Employee, Location, Record, Settings, GLOBAL_SETTINGS_ID};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub settings_created: bool,
    pub samples_inserted: usize,
}

/// Ensures the settings singleton exists and, when `with_samples` is set
/// and there are no employees yet, inserts the sample rows.
pub async fn bootstrap(store: &dyn RecordStore, with_samples: bool) -> Result<SeedReport, StoreError> {
    let mut report = SeedReport::default();

    match store.get(Collection::Settings, GLOBAL_SETTINGS_ID).await {
        Ok(_) => {}
        Err(StoreError::NotFound { .. }) => {
            report.settings_created = insert_if_absent(store, Settings::default().into()).await?;
        }
        Err(e) => return Err(e),
    }

    if with_samples && store.list(Collection::Employees).await?.is_empty() {
        for record in sample_records() {
            if insert_if_absent(store, record).await? {
                report.samples_inserted += 1;
            }
        }
        info!(rows = report.samples_inserted, "Seeded sample data");
    }

    Ok(report)
}

/// A concurrent writer winning the race is fine; the row exists either way.
async fn insert_if_absent(store: &dyn RecordStore, record: Record) -> Result<bool, StoreError> {
    match store.create(record).await {
        Ok(_) => Ok(true),
        Err(StoreError::Conflict { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

fn location(id: &str, name: &str, abbreviation: &str) -> Record {
    Location {
        id: id.into(),
        name: name.into(),
        abbreviation: Some(abbreviation.into()),
    }
    .into()
}

fn department(id: &str, name: &str) -> Record {
    Department { id: id.into(), name: name.into() }.into()
}

fn employee(id: &str, name: &str, pin: &str, location_id: &str, department_id: &str) -> Employee {
    Employee {
        id: id.into(),
        name: name.into(),
        pin: Some(pin.into()),
        image_url: None,
        archived: false,
        auto_deduct_lunch: false,
        location_id: Some(location_id.into()),
        department_id: Some(department_id.into()),
        is_temp: false,
        temp_agency: None,
    }
}

pub fn sample_records() -> Vec<Record> {
    vec![
        location("LOC001", "Main Office", "MO"),
        location("LOC002", "Warehouse", "WH"),
        department("DEP001", "Operations"),
        department("DEP002", "Administration"),
        employee("EMP001", "Alex Johnson", "1234", "LOC001", "DEP001").into(),
        Employee {
            auto_deduct_lunch: true,
            ..employee("EMP002", "Maria Garcia", "5678", "LOC001", "DEP002")
        }
        .into(),
        Employee {
            is_temp: true,
            temp_agency: Some("Staffing Co".into()),
            ..employee("EMP003", "Sam Lee", "4321", "LOC002", "DEP001")
        }
        .into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn seeds_empty_store() {
        let store = MemoryStore::new();
        let report = bootstrap(&store, true).await.unwrap();

        assert!(report.settings_created);
        assert_eq!(report.samples_inserted, sample_records().len());
        assert_eq!(store.list(Collection::Employees).await.unwrap().len(), 3);
        assert_eq!(store.list(Collection::Locations).await.unwrap().len(), 2);
        assert_eq!(store.list(Collection::Departments).await.unwrap().len(), 2);
        assert_eq!(
            store.get(Collection::Settings, GLOBAL_SETTINGS_ID).await.unwrap(),
            Record::Settings(Settings::default())
        );
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let store = MemoryStore::new();
        bootstrap(&store, true).await.unwrap();
        let report = bootstrap(&store, true).await.unwrap();
        assert_eq!(report, SeedReport::default());
    }

    #[tokio::test]
    async fn existing_employees_suppress_samples() {
        let store = MemoryStore::new();
        store
            .create(employee("EMP100", "Existing", "0000", "LOC9", "DEP9").into())
            .await
            .unwrap();

        let report = bootstrap(&store, true).await.unwrap();
        assert!(report.settings_created);
        assert_eq!(report.samples_inserted, 0);
        assert!(store.list(Collection::Locations).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn samples_can_be_disabled() {
        let store = MemoryStore::new();
        let report = bootstrap(&store, false).await.unwrap();
        assert!(report.settings_created);
        assert_eq!(report.samples_inserted, 0);
        assert!(store.list(Collection::Employees).await.unwrap().is_empty());
    }

    #[test]
    fn samples_are_valid() {
        for record in sample_records() {
            assert!(record.validate().is_ok(), "{record:?}");
        }
    }
}
