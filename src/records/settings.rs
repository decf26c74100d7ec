use serde::{Deserialize, Serialize};

use super::{check_id, finish, Collection, Entity, FieldErrors};

/// Key of the settings singleton row.
pub const GLOBAL_SETTINGS_ID: &str = "GLOBAL_SETTINGS";

const CLOCK_FORMATS: &[&str] = &["12h", "24h"];

/// Kiosk-wide settings. One row keyed [`GLOBAL_SETTINGS_ID`] is created at
/// startup and only ever updated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "global_settings_id")]
    pub id: String,
    pub logo_url: Option<String>,
    /// 0 = Sunday .. 6 = Saturday
    #[serde(default)]
    pub week_start_day: i32,
    pub remote_db_url: Option<String>,
    #[serde(default)]
    pub screen_saver_enabled: bool,
    pub clock_format: Option<String>,
    /// Seconds of inactivity before the screen saver starts.
    pub screen_saver_timeout: Option<i32>,
    pub clock_in_screen_timeout: Option<i32>,
    pub admin_screen_timeout: Option<i32>,
}

fn global_settings_id() -> String {
    GLOBAL_SETTINGS_ID.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: global_settings_id(),
            logo_url: None,
            week_start_day: 0,
            remote_db_url: None,
            screen_saver_enabled: false,
            clock_format: None,
            screen_saver_timeout: None,
            clock_in_screen_timeout: None,
            admin_screen_timeout: None,
        }
    }
}

impl Entity for Settings {
    const COLLECTION: Collection = Collection::Settings;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "logo_url",
        "week_start_day",
        "remote_db_url",
        "screen_saver_enabled",
        "clock_format",
        "screen_saver_timeout",
        "clock_in_screen_timeout",
        "admin_screen_timeout",
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
        if !errors.contains_key("id") && self.id != GLOBAL_SETTINGS_ID {
            errors.insert("id".into(), format!("settings id must be '{GLOBAL_SETTINGS_ID}'"));
        }

        if !(0..=6).contains(&self.week_start_day) {
            errors.insert("weekStartDay".into(), "weekStartDay must be between 0 and 6".into());
        }
        if let Some(format) = &self.clock_format {
            if !CLOCK_FORMATS.contains(&format.as_str()) {
                errors.insert("clockFormat".into(), "clockFormat must be '12h' or '24h'".into());
            }
        }
        for (field, value) in [
            ("screenSaverTimeout", self.screen_saver_timeout),
            ("clockInScreenTimeout", self.clock_in_screen_timeout),
            ("adminScreenTimeout", self.admin_screen_timeout),
        ] {
            if value.is_some_and(|seconds| seconds < 0) {
                errors.insert(field.into(), format!("{field} must not be negative"));
            }
        }

        finish(errors)
    }
}
