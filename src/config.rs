//! Server Configuration
//!
//! Two settings are visible to clients through `CONFIG GET`: `dir` and
//! `dbfilename`. Together they name the snapshot file. The listen address is
//! configurable too but is not exposed over the protocol.

use thiserror::Error;

/// Errors from command-line parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the snapshot file.
    pub dir: String,
    /// Snapshot file name inside `dir`.
    pub dbfilename: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            dir: ".".to_string(),
            dbfilename: "dump.rdb".to_string(),
        }
    }
}

/// What the command line asked the process to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(ServerConfig),
    Help,
    Version,
}

impl ServerConfig {
    /// Parses arguments, excluding the program name.
    pub fn from_args<I, S>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = ServerConfig::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
            };

            match arg.as_str() {
                "--dir" => config.dir = value("--dir")?,
                "--dbfilename" => config.dbfilename = value("--dbfilename")?,
                "--host" | "-h" => config.host = value("--host")?,
                "--port" | "-p" => {
                    let raw = value("--port")?;
                    config.port = raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?;
                }
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliAction::Run(config))
    }

    /// `dir/dbfilename`, joined verbatim.
    pub fn snapshot_path(&self) -> String {
        format!("{}/{}", self.dir, self.dbfilename)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
