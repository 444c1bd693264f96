//! The operator-managed, singleton [`Config`] record.
//!
//! A `Config` binds the plugin to one Kerberos realm: the realm name, the
//! KDC hosts, the service keytab, the SPN the service accepts tickets for,
//! and the knobs that govern channel binding and clock skew tolerance. It
//! is validated on every write (see [`Config::validate`]) and is otherwise
//! a flat, `serde`-friendly record.

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::keytab::Keytab;

/// Maximum allowed clock skew, in seconds.
pub const MAX_CLOCK_SKEW_SECONDS: u32 = 900;

/// Maximum allowed decoded keytab size: 1 MiB.
pub const MAX_KEYTAB_BYTES: usize = 1024 * 1024;

/// The singleton, persisted realm configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Config {
    /// Uppercase Kerberos realm, e.g. `"TEST.COM"`.
    pub realm: String,

    /// Ordered list of KDC hosts (`host` or `host:port`).
    pub kdcs: Vec<String>,

    /// Base64-encoded (standard alphabet) MIT keytab bytes.
    pub keytab_bytes: String,

    /// SPN of the form `SERVICE/fqdn[@REALM]`, uppercase `SERVICE`.
    pub spn: String,

    /// Whether logins must present a channel-binding value.
    #[serde(default)]
    pub require_channel_binding: bool,

    /// Allowed clock skew, in seconds, in `[0, 900]`.
    pub clock_skew_seconds: u32,
}

/// A safe projection of [`Config`] that omits keytab bytes, for read
/// operations.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfigSafeView {
    pub realm: String,
    pub kdcs: Vec<String>,
    pub spn: String,
    pub require_channel_binding: bool,
    pub clock_skew_seconds: u32,
}

impl From<&Config> for ConfigSafeView {
    fn from(config: &Config) -> Self {
        Self {
            realm: config.realm.clone(),
            kdcs: config.kdcs.clone(),
            spn: config.spn.clone(),
            require_channel_binding: config.require_channel_binding,
            clock_skew_seconds: config.clock_skew_seconds,
        }
    }
}

/// Parsed, uppercase SPN: `service/host[@realm]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedSpn {
    pub service: String,
    pub host: String,
    pub realm: Option<String>,
}

impl fmt::Display for ParsedSpn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.realm {
            Some(realm) => write!(f, "{}/{}@{}", self.service, self.host, realm),
            None => write!(f, "{}/{}", self.service, self.host),
        }
    }
}

impl ParsedSpn {
    /// Parse `SERVICE/host[@REALM]`. Does not validate casing or FQDN-ness;
    /// callers that need that use [`Config::validate`].
    pub fn parse(spn: &str) -> Result<Self, CoreError> {
        let (principal, realm) = match spn.split_once('@') {
            Some((p, r)) => (p, Some(r.to_string())),
            None => (spn, None),
        };
        let (service, host) = principal
            .split_once('/')
            .ok_or_else(|| CoreError::invalid_input("spn must be of the form SERVICE/host"))?;
        if service.is_empty() || host.is_empty() {
            return Err(CoreError::invalid_input(
                "spn must be of the form SERVICE/host",
            ));
        }
        Ok(Self {
            service: service.to_string(),
            host: host.to_string(),
            realm,
        })
    }
}

impl Config {
    /// Decode [`Config::keytab_bytes`] and run full validation.
    ///
    /// Returns the decoded [`Keytab`] on success so callers don't have to
    /// decode twice.
    pub fn validate(&self) -> Result<Keytab, CoreError> {
        if self.realm.is_empty() || !self.realm.chars().all(is_realm_char) {
            return Err(CoreError::invalid_input(
                "realm must be non-empty and match [A-Z0-9.-]+",
            ));
        }
        if self.realm.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(CoreError::invalid_input("realm must be uppercase"));
        }

        if self.kdcs.is_empty() {
            return Err(CoreError::invalid_input("kdcs must not be empty"));
        }
        for kdc in &self.kdcs {
            if kdc.is_empty() {
                return Err(CoreError::invalid_input("kdc entries must not be empty"));
            }
        }

        let spn = ParsedSpn::parse(&self.spn)?;
        if spn.service.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(CoreError::invalid_input("spn service must be uppercase"));
        }
        if !is_fqdn(&spn.host) {
            return Err(CoreError::invalid_input("spn host must be a FQDN"));
        }
        if let Some(spn_realm) = &spn.realm {
            if !spn_realm.eq_ignore_ascii_case(&self.realm) {
                return Err(CoreError::invalid_input(
                    "spn realm, if present, must equal config realm",
                ));
            }
        }

        if self.clock_skew_seconds > MAX_CLOCK_SKEW_SECONDS {
            return Err(CoreError::invalid_input(format!(
                "clock_skew_seconds must be in [0, {MAX_CLOCK_SKEW_SECONDS}]"
            )));
        }

        let keytab_bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.keytab_bytes)
            .map_err(|_| CoreError::invalid_input("keytab_bytes is not valid base64"))?;
        if keytab_bytes.is_empty() {
            return Err(CoreError::invalid_input("keytab must not be empty"));
        }
        if keytab_bytes.len() > MAX_KEYTAB_BYTES {
            return Err(CoreError::invalid_input(
                "keytab decoded size exceeds 1 MiB",
            ));
        }

        Keytab::decode(&keytab_bytes)
            .map_err(|e| CoreError::invalid_input(format!("invalid keytab: {e}")))
    }

    pub fn spn(&self) -> Result<ParsedSpn, CoreError> {
        ParsedSpn::parse(&self.spn)
    }
}

fn is_realm_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-'
}

/// A loose FQDN check: at least one dot, and every label is a valid DNS
/// label (alphanumeric, hyphen, not leading/trailing hyphen).
fn is_fqdn(host: &str) -> bool {
    if !host.contains('.') {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

//----------- LoggingConfig -----------------------------------------------------

/// Process-level logging configuration (ambient; not part of the
/// persisted Config/Role data model).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub target: LogTarget,
    pub trace_targets: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            target: LogTarget::Stderr,
            trace_targets: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogTarget {
    File(camino::Utf8PathBuf),
    Syslog,
    Stdout,
    Stderr,
}

impl Default for LogTarget {
    fn default() -> Self {
        Self::Stderr
    }
}

//----------- ProcessConfig -----------------------------------------------------

/// The bootstrap configuration for the ambient HTTP host binary: where to
/// keep on-disk state, where to listen, and how to log. Distinct from the
/// Kerberos [`Config`] above, which is operator data read on every login.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ProcessConfig {
    pub state_dir: camino::Utf8PathBuf,
    pub listen_addr: std::net::SocketAddr,
    pub logging: LoggingConfig,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            state_dir: camino::Utf8PathBuf::from("/var/lib/gmsa-authd"),
            listen_addr: std::net::SocketAddr::from(([127, 0, 0, 1], 8443)),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProcessConfig {
    /// Load the bootstrap TOML file at `path`. CLI flags take precedence
    /// over whatever it sets, the same way clap overrides a
    /// config file's defaults.
    pub fn load_from_file(path: &camino::Utf8Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_keytab_b64() -> String {
        base64::engine::general_purpose::STANDARD.encode(crate::keytab::tests::sample_keytab_bytes())
    }

    fn valid_config() -> Config {
        Config {
            realm: "TEST.COM".into(),
            kdcs: vec!["kdc1.test.com".into()],
            keytab_bytes: valid_keytab_b64(),
            spn: "HTTP/vault.test.com".into(),
            require_channel_binding: false,
            clock_skew_seconds: 300,
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn rejects_lowercase_realm() {
        let mut c = valid_config();
        c.realm = "test.com".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_spn_realm() {
        let mut c = valid_config();
        c.spn = "HTTP/vault.test.com@OTHER.COM".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_non_fqdn_host() {
        let mut c = valid_config();
        c.spn = "HTTP/vault".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_clock_skew_out_of_range() {
        let mut c = valid_config();
        c.clock_skew_seconds = 901;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_oversized_keytab() {
        let mut c = valid_config();
        let huge = vec![0u8; MAX_KEYTAB_BYTES + 1];
        c.keytab_bytes = base64::engine::general_purpose::STANDARD.encode(huge);
        assert!(c.validate().is_err());
    }

    #[test]
    fn safe_view_omits_keytab() {
        let c = valid_config();
        let json = serde_json::to_string(&ConfigSafeView::from(&c)).unwrap();
        assert!(!json.contains("keytab"));
    }

    #[test]
    fn process_config_loads_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gmsa-authd.toml");
        std::fs::write(
            &path,
            "state_dir = \"/tmp/gmsa-authd\"\nlisten_addr = \"127.0.0.1:9443\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(path).unwrap();

        let loaded = ProcessConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.state_dir, "/tmp/gmsa-authd");
        assert_eq!(loaded.listen_addr.port(), 9443);
        assert!(matches!(loaded.logging.level, LogLevel::Debug));
    }

    #[test]
    fn process_config_load_rejects_missing_file() {
        let path = camino::Utf8PathBuf::from("/nonexistent/gmsa-authd.toml");
        assert!(ProcessConfig::load_from_file(&path).is_err());
    }
}
