use serde::{Deserialize, Serialize};

use super::{check_id, check_required, finish, Collection, Entity, FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

impl Entity for Department {
    const COLLECTION: Collection = Collection::Departments;
    const COLUMNS: &'static [&'static str] = &["id", "name"];

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
