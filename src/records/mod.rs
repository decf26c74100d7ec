//! Record kinds served by the API.
//!
//! Each kind is a typed struct whose Rust field names double as storage
//! column names (snake_case) while serde renames them to camelCase on the
//! wire. `Collection` is the closed set of kinds; `Record` carries one value
//! of any kind.

pub mod department;
pub mod employee;
pub mod location;
pub mod mapper;
pub mod settings;
pub mod time_record;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use department::Department;
pub use employee::Employee;
pub use location::Location;
pub use settings::{Settings, GLOBAL_SETTINGS_ID};
pub use time_record::{Break, TimeRecord};

/// Field name -> problem description, reported back to clients.
pub type FieldErrors = HashMap<String, String>;

/// The five record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Employees,
    TimeRecords,
    Locations,
    Departments,
    Settings,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Employees,
        Collection::TimeRecords,
        Collection::Locations,
        Collection::Departments,
        Collection::Settings,
    ];

    /// Canonical name used in URLs and tombstones.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Employees => "employees",
            Collection::TimeRecords => "timeRecords",
            Collection::Locations => "locations",
            Collection::Departments => "departments",
            Collection::Settings => "settings",
        }
    }

    /// Backing table in the relational store.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Employees => "employees",
            Collection::TimeRecords => "time_records",
            Collection::Locations => "locations",
            Collection::Departments => "departments",
            Collection::Settings => "settings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown collection '{0}'")]
pub struct UnknownCollection(pub String);

impl FromStr for Collection {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employees" => Ok(Collection::Employees),
            "timeRecords" | "time_records" | "time-records" => Ok(Collection::TimeRecords),
            "locations" => Ok(Collection::Locations),
            "departments" => Ok(Collection::Departments),
            "settings" => Ok(Collection::Settings),
            other => Err(UnknownCollection(other.to_string())),
        }
    }
}

/// Behaviour shared by every record kind.
pub trait Entity:
    Clone + PartialEq + Serialize + DeserializeOwned + Into<Record> + Send + Sync + 'static
{
    const COLLECTION: Collection;

    /// Storage columns in bind order; `id` always comes first.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn validate(&self) -> Result<(), FieldErrors>;
}

/// One record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Employee(Employee),
    TimeRecord(TimeRecord),
    Location(Location),
    Department(Department),
    Settings(Settings),
}

/// Runs `$body` with `$inner` bound to the struct inside a `Record`.
macro_rules! each_record {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            $crate::records::Record::Employee($inner) => $body,
            $crate::records::Record::TimeRecord($inner) => $body,
            $crate::records::Record::Location($inner) => $body,
            $crate::records::Record::Department($inner) => $body,
            $crate::records::Record::Settings($inner) => $body,
        }
    };
}

/// Runs `$body` with the type alias `$entity` naming the struct of a `Collection`.
macro_rules! with_entity {
    ($collection:expr, $entity:ident => $body:expr) => {
        match $collection {
            $crate::records::Collection::Employees => {
                type $entity = $crate::records::Employee;
                $body
            }
            $crate::records::Collection::TimeRecords => {
                type $entity = $crate::records::TimeRecord;
                $body
            }
            $crate::records::Collection::Locations => {
                type $entity = $crate::records::Location;
                $body
            }
            $crate::records::Collection::Departments => {
                type $entity = $crate::records::Department;
                $body
            }
            $crate::records::Collection::Settings => {
                type $entity = $crate::records::Settings;
                $body
            }
        }
    };
}

pub(crate) use each_record;
pub(crate) use with_entity;

impl Record {
    pub fn collection(&self) -> Collection {
        match self {
            Record::Employee(_) => Collection::Employees,
            Record::TimeRecord(_) => Collection::TimeRecords,
            Record::Location(_) => Collection::Locations,
            Record::Department(_) => Collection::Departments,
            Record::Settings(_) => Collection::Settings,
        }
    }

    pub fn id(&self) -> &str {
        each_record!(self, r => r.id())
    }

    pub fn set_id(&mut self, id: String) {
        each_record!(self, r => r.set_id(id))
    }

    pub fn validate(&self) -> Result<(), FieldErrors> {
        each_record!(self, r => r.validate())
    }
}

macro_rules! impl_into_record {
    ($($entity:ident),*) => {
        $(
            impl From<$entity> for Record {
                fn from(entity: $entity) -> Self {
                    Record::$entity(entity)
                }
            }
        )*
    };
}

impl_into_record!(Employee, TimeRecord, Location, Department, Settings);

pub(crate) fn check_id(id: &str, errors: &mut FieldErrors) {
    if id.trim().is_empty() {
        errors.insert("id".into(), "id is required".into());
    } else if id.len() > 128 {
        errors.insert("id".into(), "id must be at most 128 characters".into());
    }
}

pub(crate) fn check_required(field: &str, value: &str, errors: &mut FieldErrors) {
    if value.trim().is_empty() {
        errors.insert(field.into(), format!("{field} must not be empty"));
    }
}

pub(crate) fn finish(errors: FieldErrors) -> Result<(), FieldErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
