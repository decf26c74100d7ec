use serde::{Deserialize, Serialize};

use super::{check_id, check_required, finish, Collection, Entity, FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub abbreviation: Option<String>,
}

impl Entity for Location {
    const COLLECTION: Collection = Collection::Locations;
    const COLUMNS: &'static [&'static str] = &["id", "name", "abbreviation"];

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
