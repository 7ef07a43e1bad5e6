//! Configuration for the import engine
//!
//! A run configuration is assembled from JSON layers: the built-in defaults
//! first, then each override layer in order. Objects merge recursively and
//! every other value replaces the one below it (last wins per key path).
//! The merged document is frozen in a [`Configuration`], which offers both
//! segmented-path access (`"csv:mapping:Vorname"`) and the typed
//! [`ImportConfig`] view.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::models::Role;

/// Separator for segmented key paths
pub const PATH_SEPARATOR: char = ':';

/// Key under which role-independent entries of role maps are stored
pub const DEFAULT_KEY: &str = "default";

/// Merged, immutable run configuration
#[derive(Debug, Clone)]
pub struct Configuration {
    raw: Arc<Value>,
    settings: Arc<ImportConfig>,
}

impl Configuration {
    /// Merge `layers` on top of the built-in defaults and freeze the result
    pub fn load(layers: impl IntoIterator<Item = Value>) -> Result<Self, crate::Error> {
        let mut raw = default_layer()?;
        for layer in layers {
            if !layer.is_object() {
                return Err(crate::Error::config(
                    "configuration layer must be a JSON object",
                ));
            }
            merge(&mut raw, layer);
        }

        let settings: ImportConfig = serde_json::from_value(raw.clone())
            .map_err(|e| crate::Error::config(format!("malformed configuration: {}", e)))?;

        Ok(Self {
            raw: Arc::new(raw),
            settings: Arc::new(settings),
        })
    }

    /// Read each file as one override layer, in order, then apply `overrides`
    pub fn from_files<P: AsRef<Path>>(
        paths: &[P],
        overrides: impl IntoIterator<Item = Value>,
    ) -> Result<Self, crate::Error> {
        let mut layers = Vec::with_capacity(paths.len() + 1);
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path).map_err(|e| {
                crate::Error::config(format!("cannot read {}: {}", path.display(), e))
            })?;
            let layer: Value = serde_json::from_str(&content).map_err(|e| {
                crate::Error::config(format!("cannot parse {}: {}", path.display(), e))
            })?;
            layers.push(layer);
        }
        layers.extend(overrides);
        Self::load(layers)
    }

    /// Look up a value by segmented path, e.g. `deletion_grace_period:deletion`
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split(PATH_SEPARATOR)
            .try_fold(self.raw.as_ref(), |node, segment| node.get(segment))
    }

    /// Whether the key path was set to a non-null value
    pub fn contains(&self, path: &str) -> bool {
        self.get_path(path).is_some_and(|v| !v.is_null())
    }

    /// The merged document
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// The typed view
    pub fn settings(&self) -> &ImportConfig {
        &self.settings
    }
}

/// Recursively merge `overlay` into `base`
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// The built-in default layer
pub fn default_layer() -> Result<Value, crate::Error> {
    Ok(serde_json::to_value(ImportConfig::default())?)
}

/// Typed view of the merged configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Identifier of the data source; scopes record identities
    #[serde(default)]
    pub source_uid: String,

    /// Role for all records when the input has no `__role` column
    #[serde(default)]
    pub user_role: Option<Role>,

    /// School for records without one; also the partition removal is limited to
    #[serde(default)]
    pub school: Option<String>,

    #[serde(default)]
    pub dry_run: bool,

    /// Skip the deactivation/removal phase
    #[serde(default)]
    pub no_delete: bool,

    /// Abort once more than this many record errors occurred
    #[serde(default)]
    pub tolerate_errors: Option<usize>,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub csv: CsvConfig,

    #[serde(default)]
    pub scheme: SchemeConfig,

    #[serde(default)]
    pub username: UsernameConfig,

    #[serde(default)]
    pub password: PasswordConfig,

    /// Attached complexity policy; overrides the password length
    #[serde(default)]
    pub password_policy: Option<PasswordPolicy>,

    /// Whether new users start enabled, per role
    #[serde(default = "default_activate_new_users")]
    pub activate_new_users: BTreeMap<String, bool>,

    #[serde(default = "default_mandatory_attributes")]
    pub mandatory_attributes: Vec<String>,

    /// Attributes owned by the directory; never compared or overwritten
    #[serde(default)]
    pub machine_managed_attributes: Vec<String>,

    /// Domain used for `<maildomain>` in schemes
    #[serde(default)]
    pub maildomain: Option<String>,

    #[serde(default)]
    pub deletion_grace_period: GracePeriodConfig,

    /// Named configuration checks to run at startup
    #[serde(default = "default_configuration_checks")]
    pub configuration_checks: Vec<String>,

    /// Individual check tests to skip
    #[serde(default)]
    pub disabled_checks: Vec<String>,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            source_uid: String::new(),
            user_role: None,
            school: None,
            dry_run: false,
            no_delete: false,
            tolerate_errors: None,
            input: InputConfig::default(),
            csv: CsvConfig::default(),
            scheme: SchemeConfig::default(),
            username: UsernameConfig::default(),
            password: PasswordConfig::default(),
            password_policy: None,
            activate_new_users: default_activate_new_users(),
            mandatory_attributes: default_mandatory_attributes(),
            machine_managed_attributes: Vec::new(),
            maildomain: None,
            deletion_grace_period: GracePeriodConfig::default(),
            configuration_checks: default_configuration_checks(),
            disabled_checks: Vec::new(),
            output: OutputConfig::default(),
            directory: DirectoryConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ImportConfig {
    /// Username scheme for `role`, falling back to the default scheme
    pub fn username_scheme(&self, role: Role) -> Option<&str> {
        self.scheme
            .username
            .get(role.as_str())
            .or_else(|| self.scheme.username.get(DEFAULT_KEY))
            .map(String::as_str)
    }

    /// Maximum username length for `role`
    pub fn username_max_length(&self, role: Role) -> usize {
        lookup_role(&self.username.max_length, role)
            .copied()
            .unwrap_or(DEFAULT_USERNAME_MAX_LENGTH)
    }

    /// Whether a newly created user of `role` starts enabled
    pub fn activate_new_user(&self, role: Role) -> bool {
        lookup_role(&self.activate_new_users, role)
            .copied()
            .unwrap_or(true)
    }

    /// Effective password length, honouring an attached policy
    pub fn password_length(&self) -> usize {
        match &self.password_policy {
            Some(policy) if policy.min_length > 0 => policy.min_length,
            _ => self.password.length,
        }
    }
}

fn lookup_role<T>(map: &BTreeMap<String, T>, role: Role) -> Option<&T> {
    map.get(role.as_str()).or_else(|| map.get(DEFAULT_KEY))
}

/// Input settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Reader type; only `csv` is supported
    #[serde(rename = "type", default = "default_input_type")]
    pub input_type: String,

    #[serde(default)]
    pub filename: Option<String>,

    /// 0: no header, columns are numbered; n: the n-th line is the header
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,

    /// Forced encoding; detected when unset
    #[serde(default)]
    pub encoding: Option<String>,

    /// Forced delimiter; sniffed when unset
    #[serde(default)]
    pub delimiter: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            input_type: default_input_type(),
            filename: None,
            header_lines: default_header_lines(),
            encoding: None,
            delimiter: None,
        }
    }
}

/// CSV column handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CsvConfig {
    /// Input column name to attribute or pseudo-column
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,

    /// Mapped columns that may be absent from the header
    #[serde(default)]
    pub allowed_missing_columns: Vec<String>,

    #[serde(default)]
    pub variant: ReaderVariant,
}

/// Column interpretation variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderVariant {
    #[default]
    Default,
    /// `__active` column, true means enabled
    InvertedActive,
}

/// Naming schemes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeConfig {
    /// Username scheme per role, `default` as fallback
    #[serde(default = "default_username_schemes")]
    pub username: BTreeMap<String, String>,

    /// Schemes for other attributes (`record_uid`, `email`, …)
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            username: default_username_schemes(),
            attributes: BTreeMap::new(),
        }
    }
}

/// Username generation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameConfig {
    /// Maximum length per role, `default` as fallback
    #[serde(default = "default_max_length")]
    pub max_length: BTreeMap<String, usize>,

    /// Zero padding of counter tokens
    #[serde(default = "default_counter_width")]
    pub counter_width: usize,

    /// Counter values tried before giving up on a record
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl Default for UsernameConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            counter_width: default_counter_width(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Character classes for password generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    Lower,
    Upper,
    Digit,
    Special,
}

impl CharClass {
    pub fn alphabet(&self) -> &'static str {
        match self {
            CharClass::Lower => "abcdefghijklmnopqrstuvwxyz",
            CharClass::Upper => "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            CharClass::Digit => "0123456789",
            CharClass::Special => "!#$%&()*+,-./:;<=>?@[]^_{|}~",
        }
    }
}

/// Password generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    #[serde(default = "default_password_length")]
    pub length: usize,

    #[serde(default = "default_password_classes")]
    pub classes: Vec<CharClass>,

    /// Classes guaranteed at least one character when the length permits
    #[serde(default = "default_mandatory_classes")]
    pub mandatory_classes: Vec<CharClass>,

    /// Characters never used
    #[serde(default = "default_password_exclude")]
    pub exclude: String,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            length: default_password_length(),
            classes: default_password_classes(),
            mandatory_classes: default_mandatory_classes(),
            exclude: default_password_exclude(),
        }
    }
}

/// Attached password complexity policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordPolicy {
    #[serde(default)]
    pub min_length: usize,
}

/// Grace periods in days, both counted from the first run a user was missing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GracePeriodConfig {
    #[serde(default)]
    pub deactivation: u32,
    #[serde(default)]
    pub deletion: u32,
}

/// Output files and statistics layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub summary_file: Option<String>,

    #[serde(default)]
    pub password_file: Option<String>,

    /// Suppress header rows
    #[serde(default)]
    pub legacy: bool,

    /// Usernames per statistics line
    #[serde(default = "default_stats_columns")]
    pub stats_columns: usize,

    /// Statistics lines per log entry
    #[serde(default = "default_stats_lines")]
    pub stats_lines: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_file: None,
            password_file: None,
            legacy: false,
            stats_columns: default_stats_columns(),
            stats_lines: default_stats_lines(),
        }
    }
}

/// Directory backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Per-call timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

const DEFAULT_USERNAME_MAX_LENGTH: usize = 20;

fn default_input_type() -> String {
    "csv".to_string()
}

fn default_header_lines() -> usize {
    1
}

fn default_username_schemes() -> BTreeMap<String, String> {
    BTreeMap::from([(
        DEFAULT_KEY.to_string(),
        "<:umlauts><firstname>[0]<lastname>[COUNTER2]".to_string(),
    )])
}

fn default_max_length() -> BTreeMap<String, usize> {
    BTreeMap::from([
        (DEFAULT_KEY.to_string(), DEFAULT_USERNAME_MAX_LENGTH),
        (Role::Student.as_str().to_string(), 15),
    ])
}

fn default_counter_width() -> usize {
    2
}

fn default_max_attempts() -> usize {
    1000
}

fn default_password_length() -> usize {
    15
}

fn default_password_classes() -> Vec<CharClass> {
    vec![
        CharClass::Lower,
        CharClass::Upper,
        CharClass::Digit,
        CharClass::Special,
    ]
}

fn default_mandatory_classes() -> Vec<CharClass> {
    vec![CharClass::Lower, CharClass::Upper, CharClass::Digit]
}

fn default_password_exclude() -> String {
    "0O1lIi|`'\"\\ ".to_string()
}

fn default_activate_new_users() -> BTreeMap<String, bool> {
    BTreeMap::from([(DEFAULT_KEY.to_string(), true)])
}

fn default_mandatory_attributes() -> Vec<String> {
    vec!["firstname".to_string(), "lastname".to_string()]
}

fn default_configuration_checks() -> Vec<String> {
    vec!["defaults".to_string()]
}

fn default_stats_columns() -> usize {
    8
}

fn default_stats_lines() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_load() {
        let config = Configuration::load(Vec::new()).unwrap();
        let settings = config.settings();
        assert_eq!(settings.input.input_type, "csv");
        assert_eq!(settings.username.counter_width, 2);
        assert_eq!(settings.username_max_length(Role::Student), 15);
        assert_eq!(settings.username_max_length(Role::Teacher), 20);
        assert_eq!(settings.configuration_checks, vec!["defaults"]);
    }

    #[test]
    fn test_layers_last_wins_per_path() {
        let config = Configuration::load(vec![
            json!({"source_uid": "A", "deletion_grace_period": {"deactivation": 5, "deletion": 30}}),
            json!({"source_uid": "B", "deletion_grace_period": {"deletion": 90}}),
        ])
        .unwrap();

        assert_eq!(config.settings().source_uid, "B");
        assert_eq!(config.settings().deletion_grace_period.deactivation, 5);
        assert_eq!(config.settings().deletion_grace_period.deletion, 90);
        assert_eq!(
            config.get_path("deletion_grace_period:deletion"),
            Some(&json!(90))
        );
    }

    #[test]
    fn test_scheme_override_keeps_default_username() {
        let config = Configuration::load(vec![json!({
            "scheme": {"username": {"student": "<lastname>[COUNTER2]"}, "email": "<username>@<maildomain>"}
        })])
        .unwrap();

        let settings = config.settings();
        assert_eq!(
            settings.username_scheme(Role::Student),
            Some("<lastname>[COUNTER2]")
        );
        assert_eq!(
            settings.username_scheme(Role::Teacher),
            Some("<:umlauts><firstname>[0]<lastname>[COUNTER2]")
        );
        assert_eq!(
            settings.scheme.attributes.get("email").map(String::as_str),
            Some("<username>@<maildomain>")
        );
    }

    #[test]
    fn test_get_path_missing() {
        let config = Configuration::load(Vec::new()).unwrap();
        assert!(config.get_path("csv:mapping:Vorname").is_none());
        assert!(!config.contains("school"));
    }

    #[test]
    fn test_malformed_layer_is_config_error() {
        let err = Configuration::load(vec![json!({"mandatory_attributes": "firstname"})])
            .unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.is_fatal());

        let err = Configuration::load(vec![json!(["not", "an", "object"])]).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_password_policy_overrides_length() {
        let config = Configuration::load(vec![json!({
            "password": {"length": 8},
            "password_policy": {"min_length": 12}
        })])
        .unwrap();
        assert_eq!(config.settings().password_length(), 12);
    }

    #[test]
    fn test_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.json");
        let user = dir.path().join("user.json");
        std::fs::write(&base, r#"{"source_uid": "BASE", "school": "gym1"}"#).unwrap();
        std::fs::write(&user, r#"{"source_uid": "USER"}"#).unwrap();

        let config = Configuration::from_files(&[&base, &user], None).unwrap();
        assert_eq!(config.settings().source_uid, "USER");
        assert_eq!(config.settings().school.as_deref(), Some("gym1"));

        let config =
            Configuration::from_files(&[&base], Some(serde_json::json!({"dry_run": true}))).unwrap();
        assert_eq!(config.settings().source_uid, "BASE");
        assert!(config.settings().dry_run);

        assert!(matches!(
            Configuration::from_files(&[dir.path().join("absent.json")], None),
            Err(crate::Error::Config(_))
        ));
    }
}
