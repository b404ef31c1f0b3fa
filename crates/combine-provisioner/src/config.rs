//! Provisioning configuration.
//!
//! Every field has a default describing the stock Combine image, so an empty
//! (or absent) config file provisions the standard environment. Values can
//! be overridden from a TOML file and from the environment.

use crate::error::ConfigError;
use combine_db_bootstrap::DatabaseCredentials;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default per-command timeout (30 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Build-time parameters passed through to installers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildParams {
    /// Branch of the Combine application to check out.
    pub branch: String,

    /// Release tag of the job-submission client (Livy).
    pub livy_tag: String,

    /// Scala version the job-submission client was built against.
    pub scala_version: String,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self {
            branch: "master".to_string(),
            livy_tag: "0.8.0".to_string(),
            scala_version: "2.12".to_string(),
        }
    }
}

impl BuildParams {
    /// Reject empty parameters instead of passing them through.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("branch", &self.branch),
            ("livy_tag", &self.livy_tag),
            ("scala_version", &self.scala_version),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyBuildParameter(name));
            }
        }
        Ok(())
    }

    /// Replace `{release}`, `{scala}` and `{branch}` placeholders.
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("{release}", &self.livy_tag)
            .replace("{scala}", &self.scala_version)
            .replace("{branch}", &self.branch)
    }
}

/// Operating-system packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub packages: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            packages: [
                "default-libmysqlclient-dev",
                "default-mysql-client",
                "python3-dev",
                "vim",
                "nodejs",
                "npm",
                "git",
                "unzip",
                "curl",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Checkout of the downstream application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub enabled: bool,
    pub repository: String,
    pub install_dir: PathBuf,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repository: "https://github.com/MI-DPLA/combine.git".to_string(),
            install_dir: PathBuf::from("/opt/combine"),
        }
    }
}

/// One file copied to a fixed location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Source path, relative to `context_dir` unless absolute.
    pub source: PathBuf,
    /// Absolute destination path.
    pub destination: PathBuf,
}

impl ArtifactConfig {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Format of the language-runtime dependency manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    /// `requirements.txt`, installed with pip.
    Requirements,
    /// `Pipfile` + `Pipfile.lock`, installed with pipenv.
    Pipfile,
}

/// Language-runtime dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Staged manifest path.
    pub manifest: PathBuf,
    pub kind: ManifestKind,
    /// pip executable, also used for pip-sourced tools.
    pub pip: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("/requirements.txt"),
            kind: ManifestKind::Requirements,
            pip: "pip".to_string(),
        }
    }
}

/// Where an auxiliary tool comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSource {
    /// `pip install <spec>`; the spec may pin a VCS revision.
    Pip { spec: String },
    /// `npm install -g <package>`.
    Npm { package: String },
    /// Download `url`, then run `install` with `{archive}` replaced by the
    /// local file path.
    Archive {
        url: String,
        #[serde(default)]
        sha256: Option<String>,
        install: Vec<String>,
    },
    /// Arbitrary command.
    Command { argv: Vec<String> },
}

/// An auxiliary tool installed after the runtime dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub source: ToolSource,
    /// Command that exits zero when the tool is already installed.
    #[serde(default)]
    pub probe: Option<Vec<String>>,
}

impl ToolConfig {
    /// Copy with build placeholders substituted in every string.
    pub fn resolved(&self, build: &BuildParams) -> Self {
        let sub = |s: &String| build.substitute(s);
        let source = match &self.source {
            ToolSource::Pip { spec } => ToolSource::Pip { spec: sub(spec) },
            ToolSource::Npm { package } => ToolSource::Npm {
                package: sub(package),
            },
            ToolSource::Archive {
                url,
                sha256,
                install,
            } => ToolSource::Archive {
                url: sub(url),
                sha256: sha256.clone(),
                install: install.iter().map(sub).collect(),
            },
            ToolSource::Command { argv } => ToolSource::Command {
                argv: argv.iter().map(sub).collect(),
            },
        };
        Self {
            name: self.name.clone(),
            source,
            probe: self
                .probe
                .as_ref()
                .map(|argv| argv.iter().map(sub).collect()),
        }
    }
}

fn default_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig {
            name: "livy".to_string(),
            source: ToolSource::Archive {
                url: "https://archive.apache.org/dist/incubator/livy/{release}-incubating/apache-livy-{release}-incubating_{scala}-bin.zip".to_string(),
                sha256: None,
                install: vec![
                    "unzip".to_string(),
                    "-o".to_string(),
                    "-q".to_string(),
                    "{archive}".to_string(),
                    "-d".to_string(),
                    "/opt".to_string(),
                ],
            },
            probe: Some(vec![
                "test".to_string(),
                "-d".to_string(),
                "/opt/apache-livy-{release}-incubating_{scala}-bin".to_string(),
            ]),
        },
        ToolConfig {
            name: "elasticdump".to_string(),
            source: ToolSource::Npm {
                package: "elasticdump".to_string(),
            },
            probe: Some(vec!["elasticdump".to_string(), "--version".to_string()]),
        },
        ToolConfig {
            name: "es2csv".to_string(),
            source: ToolSource::Pip {
                spec: "git+https://github.com/MI-DPLA/es2csv.git@python3".to_string(),
            },
            probe: None,
        },
        ToolConfig {
            name: "mongodb-database-tools".to_string(),
            source: ToolSource::Archive {
                url: "https://fastdl.mongodb.org/tools/db/mongodb-database-tools-debian10-x86_64-100.3.1.deb".to_string(),
                sha256: None,
                install: vec![
                    "apt-get".to_string(),
                    "install".to_string(),
                    "-y".to_string(),
                    "{archive}".to_string(),
                ],
            },
            probe: Some(vec!["mongoexport".to_string(), "--version".to_string()]),
        },
    ]
}

/// Database bootstrap and client credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub credentials: DatabaseCredentials,

    /// Host written to the client credentials file.
    pub host: String,

    /// Administrative URL for a direct connection. When unset, the staged
    /// script is applied through `client_command` instead.
    pub admin_url: Option<String>,

    /// Client program (plus extra arguments) used when `admin_url` is
    /// unset; reads the script from stdin. Option-file isolation is added
    /// by [`DatabaseConfig::client_argv`].
    pub client_command: Vec<String>,

    /// Option file with the administrative login for the client. When
    /// unset the client runs with `--no-defaults` as `admin_user`.
    pub admin_defaults_file: Option<PathBuf>,

    /// Administrative account used without `admin_defaults_file`.
    pub admin_user: String,

    /// Where the rendered bootstrap script is staged.
    pub sql_script: PathBuf,

    /// Client option file written for automated authentication.
    pub credentials_file: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            credentials: DatabaseCredentials::default(),
            host: "localhost".to_string(),
            admin_url: None,
            client_command: vec!["mysql".to_string()],
            admin_defaults_file: None,
            admin_user: "root".to_string(),
            sql_script: PathBuf::from("/tmp/combine.sql"),
            credentials_file: PathBuf::from("/root/.my.cnf"),
        }
    }
}

impl DatabaseConfig {
    /// Full client argv for the bootstrap.
    ///
    /// The isolation option comes right after the program, where the
    /// client requires it, so neither `/etc/mysql` nor `~/.my.cnf` (the
    /// service-account file this run places) can change the login.
    pub fn client_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.client_command.len() + 2);
        let mut parts = self.client_command.iter();
        if let Some(program) = parts.next() {
            argv.push(program.clone());
        }
        match &self.admin_defaults_file {
            Some(file) => argv.push(format!("--defaults-file={}", file.display())),
            None => {
                argv.push("--no-defaults".to_string());
                argv.push(format!("--user={}", self.admin_user));
            }
        }
        argv.extend(parts.cloned());
        argv
    }
}

/// Complete provisioning configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub build: BuildParams,
    pub system: SystemConfig,
    pub application: ApplicationConfig,
    pub artifacts: Vec<ArtifactConfig>,
    pub runtime: RuntimeConfig,
    pub tools: Vec<ToolConfig>,
    pub database: DatabaseConfig,

    /// Directory relative artifact sources are resolved against.
    pub context_dir: PathBuf,

    /// Scratch directory for downloads.
    pub work_dir: PathBuf,

    /// Timeout applied to every external command (0 = none).
    pub command_timeout_secs: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            build: BuildParams::default(),
            system: SystemConfig::default(),
            application: ApplicationConfig::default(),
            artifacts: vec![
                ArtifactConfig::new("requirements.txt", "/requirements.txt"),
                ArtifactConfig::new("combine-setup.sh", "/tmp/combine-setup.sh"),
            ],
            runtime: RuntimeConfig::default(),
            tools: default_tools(),
            database: DatabaseConfig::default(),
            context_dir: PathBuf::from("."),
            work_dir: PathBuf::from("/tmp/combine-provision"),
            command_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProvisionConfig {
    /// Load from a TOML file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides
    ///
    /// Reads (all optional):
    /// - COMBINE_DB_NAME / COMBINE_DB_USER / COMBINE_DB_PASSWORD
    /// - COMBINE_DB_HOST
    /// - COMBINE_DB_ADMIN_URL
    pub fn with_env_overrides(mut self) -> Self {
        self.database.credentials = self.database.credentials.with_env_overrides();
        if let Ok(host) = std::env::var("COMBINE_DB_HOST") {
            self.database.host = host;
        }
        if let Ok(url) = std::env::var("COMBINE_DB_ADMIN_URL") {
            if !url.trim().is_empty() {
                self.database.admin_url = Some(url);
            }
        }
        self
    }

    /// Resolve an artifact source against `context_dir`.
    pub fn resolve_source(&self, source: &Path) -> PathBuf {
        if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.context_dir.join(source)
        }
    }

    /// Check everything that can be checked before touching the target.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build.validate()?;

        for artifact in &self.artifacts {
            require_absolute("artifact destination", &artifact.destination)?;
        }
        require_absolute("runtime.manifest", &self.runtime.manifest)?;
        require_absolute("database.sql_script", &self.database.sql_script)?;
        require_absolute("database.credentials_file", &self.database.credentials_file)?;
        if let Some(admin) = &self.database.admin_defaults_file {
            require_absolute("database.admin_defaults_file", admin)?;
            if admin == &self.database.credentials_file {
                return Err(ConfigError::AdminOptionFileConflict(admin.clone()));
            }
        }
        if self.database.admin_url.is_none() {
            if self.database.client_command.is_empty() {
                return Err(ConfigError::InvalidDatabaseClient(
                    "client_command is empty".to_string(),
                ));
            }
            if self.database.admin_defaults_file.is_none()
                && self.database.admin_user.trim().is_empty()
            {
                return Err(ConfigError::InvalidDatabaseClient(
                    "admin_user is empty".to_string(),
                ));
            }
        }
        if self.application.enabled {
            require_absolute("application.install_dir", &self.application.install_dir)?;
        }

        let mut names = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(ConfigError::InvalidTool("tool with empty name".to_string()));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(ConfigError::InvalidTool(format!(
                    "duplicate tool `{}`",
                    tool.name
                )));
            }
        }

        self.database.credentials.validate()?;
        Ok(())
    }
}

fn require_absolute(field: &str, path: &Path) -> Result<(), ConfigError> {
    if !path.is_absolute() {
        return Err(ConfigError::RelativePath {
            field: field.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ProvisionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tools.len(), 4);
        assert_eq!(config.runtime.manifest, PathBuf::from("/requirements.txt"));
        assert_eq!(config.database.sql_script, PathBuf::from("/tmp/combine.sql"));
    }

    #[test]
    fn test_empty_build_parameter_rejected() {
        let mut config = ProvisionConfig::default();
        config.build.livy_tag = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyBuildParameter("livy_tag"))
        ));

        let mut config = ProvisionConfig::default();
        config.build.scala_version = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyBuildParameter("scala_version"))
        ));
    }

    #[test]
    fn test_substitute_placeholders() {
        let build = BuildParams {
            branch: "dev".to_string(),
            livy_tag: "0.7.1".to_string(),
            scala_version: "2.11".to_string(),
        };
        assert_eq!(
            build.substitute("livy-{release}_{scala}@{branch}"),
            "livy-0.7.1_2.11@dev"
        );
    }

    #[test]
    fn test_tool_resolved_substitutes_everywhere() {
        let config = ProvisionConfig::default();
        let livy = config.tools[0].resolved(&config.build);
        match &livy.source {
            ToolSource::Archive { url, .. } => {
                assert!(url.ends_with("apache-livy-0.8.0-incubating_2.12-bin.zip"));
                assert!(url.contains("/0.8.0-incubating/"));
            }
            other => panic!("unexpected source {:?}", other),
        }
        let probe = livy.probe.unwrap();
        assert_eq!(probe[2], "/opt/apache-livy-0.8.0-incubating_2.12-bin");
    }

    #[test]
    fn test_client_argv_ignores_option_files_by_default() {
        let db = DatabaseConfig::default();
        assert_eq!(db.client_argv(), vec!["mysql", "--no-defaults", "--user=root"]);
    }

    #[test]
    fn test_client_argv_with_admin_option_file() {
        let db = DatabaseConfig {
            client_command: vec!["mysql".to_string(), "--protocol=socket".to_string()],
            admin_defaults_file: Some(PathBuf::from("/etc/combine/admin.cnf")),
            ..DatabaseConfig::default()
        };
        assert_eq!(
            db.client_argv(),
            vec![
                "mysql",
                "--defaults-file=/etc/combine/admin.cnf",
                "--protocol=socket"
            ]
        );
    }

    #[test]
    fn test_admin_option_file_must_differ_from_credentials_file() {
        let mut config = ProvisionConfig::default();
        config.database.admin_defaults_file = Some(config.database.credentials_file.clone());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AdminOptionFileConflict(_))
        ));

        config.database.admin_defaults_file = Some(PathBuf::from("admin.cnf"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RelativePath { .. })
        ));
    }

    #[test]
    fn test_relative_destination_rejected() {
        let mut config = ProvisionConfig::default();
        config
            .artifacts
            .push(ArtifactConfig::new("a.txt", "relative/a.txt"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RelativePath { .. })
        ));
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let mut config = ProvisionConfig::default();
        let dup = config.tools[1].clone();
        config.tools.push(dup);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTool(_))
        ));
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ProvisionConfig::from_toml(
            r#"
            command_timeout_secs = 60

            [build]
            branch = "v0.11"

            [runtime]
            kind = "pipfile"
            manifest = "/Pipfile"

            [database.credentials]
            password = "s3cret"

            [[tools]]
            name = "elasticdump"
            probe = ["elasticdump", "--version"]
            [tools.source]
            type = "npm"
            package = "elasticdump@6"
            "#,
        )
        .expect("parse failed");

        assert_eq!(config.command_timeout_secs, 60);
        assert_eq!(config.build.branch, "v0.11");
        assert_eq!(config.build.livy_tag, "0.8.0");
        assert_eq!(config.runtime.kind, ManifestKind::Pipfile);
        assert_eq!(config.runtime.pip, "pip");
        assert_eq!(config.database.credentials.password, "s3cret");
        assert_eq!(config.database.credentials.username, "combine");
        assert_eq!(config.tools.len(), 1);
        assert_eq!(
            config.tools[0].source,
            ToolSource::Npm {
                package: "elasticdump@6".to_string()
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_source() {
        let config = ProvisionConfig {
            context_dir: PathBuf::from("/build"),
            ..ProvisionConfig::default()
        };
        assert_eq!(
            config.resolve_source(Path::new("requirements.txt")),
            PathBuf::from("/build/requirements.txt")
        );
        assert_eq!(
            config.resolve_source(Path::new("/etc/hosts")),
            PathBuf::from("/etc/hosts")
        );
    }
}
