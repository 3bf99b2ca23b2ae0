use routegen_app::config::AppConfig;

/// Environment variable pointing at the application configuration file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "ROUTEGEN";

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Failed to load application configuration: {source}")]
    Config {
        #[source]
        source: config::ConfigError,
    },
}

/// Loads the application configuration.
///
/// Reads the file named by `CONFIG_PATH` when set, then applies `ROUTEGEN__`
/// prefixed environment variables, e.g. `ROUTEGEN__ROUTES__PATH=/routes/*.yaml`.
pub fn load() -> Result<AppConfig, Error> {
    load_from(std::env::var(CONFIG_PATH_ENV).ok().as_deref(), environment())
}

/// Environment source mapping `ROUTEGEN__A__B` to the key `a.b`.
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn load_from(
    config_path: Option<&str>,
    environment: config::Environment,
) -> Result<AppConfig, Error> {
    let mut builder = config::Config::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::with_name(path));
    }
    builder
        .add_source(environment)
        .build()
        .map_err(|e| Error::Config { source: e })?
        .try_deserialize::<AppConfig>()
        .map_err(|e| Error::Config { source: e })
}
