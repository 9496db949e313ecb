//! Application configuration. Storage paths, lesson generation horizon, code expiry.

use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_PHONE_CODE_TTL_SECS: u64 = 600;
const VERIFICATION_CODES_FILE: &str = "verification_codes.log";

/// Read from `CRM_*` environment variables and the optional file named by `CRM_CONFIG`.
#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Directory holding the SQLite database. Read from CRM_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Where issued phone codes are appended. Read from CRM_VERIFICATION_CODES_FILE.
    #[serde(default)]
    pub verification_codes_file: Option<String>,

    /// How many weeks ahead schedule generation covers. Read from CRM_LESSON_WEEKS_AHEAD.
    #[serde(default)]
    pub lesson_weeks_ahead: Option<u32>,

    #[serde(default)]
    pub phone_code_ttl_secs: Option<u64>,

    /// Phone that gets an administrator account at startup. Read from CRM_ADMIN_PHONE.
    #[serde(default)]
    pub admin_phone: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var("CRM_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        // Environment wins over the file.
        c = c.add_source(config::Environment::with_prefix("CRM").try_parsing(true));
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(
            self.data_dir
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(DEFAULT_DATA_DIR),
        )
    }

    /// Defaults to `verification_codes.log` inside the data directory.
    pub fn verification_codes_file_or_default(&self) -> PathBuf {
        match self.verification_codes_file.as_deref() {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => self.data_dir_or_default().join(VERIFICATION_CODES_FILE),
        }
    }

    /// Returns the generation horizon in weeks. Zero counts as unset.
    pub fn lesson_weeks_ahead_or_default(&self) -> u32 {
        self.lesson_weeks_ahead
            .filter(|w| *w > 0)
            .unwrap_or(crate::domain::schedule::DEFAULT_LESSON_GENERATION_WEEKS)
    }

    pub fn phone_code_ttl_secs_or_default(&self) -> u64 {
        self.phone_code_ttl_secs
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PHONE_CODE_TTL_SECS)
    }

    /// Configured bootstrap admin phone, if any. Blank values count as unset.
    pub fn admin_phone(&self) -> Option<&str> {
        self.admin_phone
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_unset() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.data_dir_or_default(), PathBuf::from("./data"));
        assert_eq!(
            cfg.verification_codes_file_or_default(),
            PathBuf::from("./data").join("verification_codes.log")
        );
        assert_eq!(cfg.lesson_weeks_ahead_or_default(), 4);
        assert_eq!(cfg.phone_code_ttl_secs_or_default(), 600);
        assert_eq!(cfg.admin_phone(), None);
    }

    #[test]
    fn codes_file_follows_data_dir() {
        let cfg = AppConfig {
            data_dir: Some("/srv/crm".into()),
            admin_phone: Some("  ".into()),
            lesson_weeks_ahead: Some(0),
            ..AppConfig::default()
        };
        assert_eq!(
            cfg.verification_codes_file_or_default(),
            PathBuf::from("/srv/crm/verification_codes.log")
        );
        assert_eq!(cfg.lesson_weeks_ahead_or_default(), 4);
        assert_eq!(cfg.admin_phone(), None);
    }

    #[test]
    fn reads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "data_dir = \"/tmp/crm\"\nlesson_weeks_ahead = 6\nphone_code_ttl_secs = 120\nadmin_phone = \"+70000000001\""
        )
        .unwrap();
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from(file.path()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.data_dir_or_default(), PathBuf::from("/tmp/crm"));
        assert_eq!(cfg.lesson_weeks_ahead_or_default(), 6);
        assert_eq!(cfg.phone_code_ttl_secs_or_default(), 120);
        assert_eq!(cfg.admin_phone(), Some("+70000000001"));
    }
}
