use thiserror::Error;

use crate::config::RedisConfig;

pub const DEFAULT_ENV_PREFIX: &str = "REDIS";

#[derive(Error, Debug, PartialEq)]
pub enum CliError {
    #[error("Invalid command line flag: {0}")]
    InvalidCommandLineFlag(String),
    #[error("Missing value for command line flag: {0}")]
    MissingCommandLineFlagValue(String),
}

/// Arguments of the `mcredis` probe binary.
#[derive(Debug, PartialEq)]
pub struct ProbeArgs {
    /// Prefix of the environment variables the config is read from
    pub prefix: String,
    pub master_name: Option<String>,
    /// Comma-separated sentinel list overriding `<PREFIX>_NODES`
    pub nodes: Option<String>,
    pub ping: bool,
}

impl ProbeArgs {
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut args = ProbeArgs {
            prefix: DEFAULT_ENV_PREFIX.to_string(),
            master_name: None,
            nodes: None,
            ping: false,
        };

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--prefix" => args.prefix = flag_value(&mut iter, &arg)?,
                "--master-name" => args.master_name = Some(flag_value(&mut iter, &arg)?),
                "--nodes" => args.nodes = Some(flag_value(&mut iter, &arg)?),
                "--ping" => args.ping = true,
                _ => return Err(CliError::InvalidCommandLineFlag(arg)),
            }
        }

        Ok(args)
    }

    /// Applies the flags on top of a config loaded from the environment.
    pub fn apply(&self, mut config: RedisConfig) -> RedisConfig {
        if let Some(master_name) = &self.master_name {
            config.master_name = master_name.clone();
        }

        if let Some(nodes) = &self.nodes {
            config.nodes = RedisConfig::new(&config.master_name, nodes).nodes;
        }

        config
    }
}

fn flag_value<I: Iterator<Item = String>>(iter: &mut I, flag: &str) -> Result<String, CliError> {
    match iter.next() {
        Some(value) if !value.starts_with("--") => Ok(value),
        _ => Err(CliError::MissingCommandLineFlagValue(flag.to_string())),
    }
}
