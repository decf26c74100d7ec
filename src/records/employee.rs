use serde::{Deserialize, Serialize};

use super::{check_id, check_required, finish, Collection, Entity, FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Kiosk PIN, kept as entered.
    pub pin: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub auto_deduct_lunch: bool,
    pub location_id: Option<String>,
    pub department_id: Option<String>,
    #[serde(default)]
    pub is_temp: bool,
    pub temp_agency: Option<String>,
}

impl Entity for Employee {
    const COLLECTION: Collection = Collection::Employees;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "pin",
        "image_url",
        "archived",
        "auto_deduct_lunch",
        "location_id",
        "department_id",
        "is_temp",
        "temp_agency",
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
        check_required("name", &self.name, &mut errors);
        finish(errors)
    }
}
