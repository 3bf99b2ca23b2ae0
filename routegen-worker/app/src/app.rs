use crate::config::{AppConfig, RouteConfig};
use crate::route::{ActiveRoute, ConfigurationError, Route, RouteBuilder};
use config::Config;
use routegen_core::task::runner::Runner;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Errors that can occur during application execution.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Input/output operation failed.
    #[error("IO operation failed on path {path}: {source}")]
    IO {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// File system error occurred while globbing route files.
    #[error("Failed to glob route files: {source}")]
    Glob {
        #[source]
        source: glob::GlobError,
    },
    /// Invalid glob pattern provided for route discovery.
    #[error("Invalid glob pattern: {source}")]
    Pattern {
        #[source]
        source: glob::PatternError,
    },
    /// Configuration parsing or deserialization error.
    #[error("Failed to parse configuration: {source}")]
    Config {
        #[source]
        source: config::ConfigError,
    },
    /// Route directory path cannot be converted to string.
    #[error("Invalid path")]
    InvalidPath,
    /// The glob pattern matched no route file.
    #[error("No route files match {pattern}")]
    NoRoutes { pattern: String },
    /// A route could not be activated; startup is aborted.
    #[error(transparent)]
    Configuration(#[from] crate::route::ConfigurationError),
    /// A stage of an active route failed.
    #[error(transparent)]
    Route(#[from] crate::route::Error),
}

/// Parses a route file, choosing the format from its extension.
pub fn load_route_config(path: &Path) -> Result<RouteConfig, Error> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::IO {
        path: path.to_path_buf(),
        source: e,
    })?;

    let file_format = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => config::FileFormat::Yaml,
        Some("json") => config::FileFormat::Json,
        _ => config::FileFormat::Json,
    };
    parse_route_config(&contents, file_format)
}

/// Parses route file contents in the given format.
pub fn parse_route_config(
    contents: &str,
    file_format: config::FileFormat,
) -> Result<RouteConfig, Error> {
    Config::builder()
        .add_source(config::File::from_str(contents, file_format))
        .build()
        .map_err(|e| Error::Config { source: e })?
        .try_deserialize::<RouteConfig>()
        .map_err(|e| Error::Config { source: e })
}

/// Activates a set of routes, all or none.
///
/// Every route is validated before any is configured. If configuring one still
/// fails, the routes already activated are aborted before the error is returned.
pub fn activate_routes(routes: Vec<Route>) -> Result<Vec<ActiveRoute>, ConfigurationError> {
    for route in &routes {
        route.validate()?;
    }

    let mut active_routes: Vec<ActiveRoute> = Vec::with_capacity(routes.len());
    for route in routes {
        match route.configure() {
            Ok(active) => active_routes.push(active),
            Err(e) => {
                active_routes.iter().for_each(ActiveRoute::abort);
                return Err(e);
            }
        }
    }
    Ok(active_routes)
}

/// Main application that loads, activates and waits on routes.
pub struct App {
    /// Global application configuration.
    pub config: AppConfig,
}

#[async_trait::async_trait]
impl Runner for App {
    type Error = Error;
    type EventHandler = Vec<RouteConfig>;

    /// Discovers route files, or falls back to the built-in route.
    async fn init(&self) -> Result<Vec<RouteConfig>, Error> {
        let Some(path) = &self.config.routes.path else {
            info!("No route path configured, running the built-in route");
            return Ok(vec![RouteConfig::default()]);
        };
        let pattern = path.to_str().ok_or(Error::InvalidPath)?;

        let route_configs = glob::glob(pattern)
            .map_err(|e| Error::Pattern { source: e })?
            .map(|path| -> Result<RouteConfig, Error> {
                let path = path.map_err(|e| Error::Glob { source: e })?;
                info!("Loading route: {:?}", path);
                load_route_config(&path)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if route_configs.is_empty() {
            return Err(Error::NoRoutes {
                pattern: pattern.to_string(),
            });
        }
        Ok(route_configs)
    }

    /// Activates every route before waiting on any of them.
    ///
    /// A route that fails to configure aborts startup and nothing keeps running.
    #[tracing::instrument(skip(self), name = "app")]
    async fn run(self) -> Result<(), Error> {
        let route_configs = self.init().await?;
        let event_buffer_size = self
            .config
            .worker
            .as_ref()
            .and_then(|worker| worker.event_buffer_size);

        let routes = route_configs
            .into_iter()
            .map(|config| {
                let mut builder = RouteBuilder::new().config(Arc::new(config));
                if let Some(size) = event_buffer_size {
                    builder = builder.event_buffer_size(size);
                }
                builder.build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let active_routes = activate_routes(routes)?;

        let results =
            futures::future::join_all(active_routes.into_iter().map(ActiveRoute::wait)).await;
        for result in results {
            result?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteOptions, TaskType};
    use std::path::PathBuf;

    const ROUTE_YAML: &str = r#"
route:
  name: yaml-route
  tasks:
    - from:
        uri: "timer:simpleTimer?period=1000"
    - set_body:
        template: "Hello from timer at {{header.firedTime}}"
    - to:
        uri: "stream:out"
"#;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("routegen-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_route_config_yaml() {
        let config = parse_route_config(ROUTE_YAML, config::FileFormat::Yaml).unwrap();
        assert_eq!(config.route.name, "yaml-route");
        assert_eq!(config.route.tasks.len(), 3);
        assert!(matches!(&config.route.tasks[0], TaskType::from(e) if e.uri == "timer:simpleTimer?period=1000"));
        assert!(matches!(&config.route.tasks[2], TaskType::to(e) if e.uri == "stream:out"));
    }

    #[test]
    fn test_parse_route_config_json() {
        let json = r#"{"route": {"name": "json-route", "tasks": [
            {"from": {"uri": "timer:t"}},
            {"set_body": {"template": "x"}},
            {"to": {"uri": "stream:err"}}
        ]}}"#;
        let config = parse_route_config(json, config::FileFormat::Json).unwrap();
        assert_eq!(config.route.name, "json-route");
        assert!(matches!(&config.route.tasks[1], TaskType::set_body(p) if p.template == "x"));
    }

    #[test]
    fn test_parse_route_config_missing_tasks() {
        let result = parse_route_config("route:\n  name: broken\n", config::FileFormat::Yaml);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_load_route_config_missing_file() {
        let result = load_route_config(Path::new("/nonexistent/routegen/route.yaml"));
        assert!(matches!(result, Err(Error::IO { .. })));
    }

    #[tokio::test]
    async fn test_init_without_path_uses_builtin_route() {
        let app = App {
            config: AppConfig::default(),
        };
        let routes = app.init().await.unwrap();
        assert_eq!(routes, vec![RouteConfig::default()]);
    }

    #[tokio::test]
    async fn test_init_loads_matching_files() {
        let dir = temp_dir("init");
        std::fs::write(dir.join("first.yaml"), ROUTE_YAML).unwrap();
        std::fs::write(dir.join("ignored.txt"), "not a route").unwrap();

        let app = App {
            config: AppConfig {
                routes: RouteOptions {
                    path: Some(dir.join("*.yaml")),
                },
                worker: None,
            },
        };
        let routes = app.init().await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route.name, "yaml-route");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_init_without_matches_fails() {
        let dir = temp_dir("empty");
        let app = App {
            config: AppConfig {
                routes: RouteOptions {
                    path: Some(dir.join("*.yaml")),
                },
                worker: None,
            },
        };
        assert!(matches!(app.init().await, Err(Error::NoRoutes { .. })));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_run_aborts_on_configuration_error() {
        let dir = temp_dir("invalid");
        std::fs::write(
            dir.join("bad.yaml"),
            ROUTE_YAML.replace("period=1000", "period=fast"),
        )
        .unwrap();

        let app = App {
            config: AppConfig {
                routes: RouteOptions {
                    path: Some(dir.join("*.yaml")),
                },
                worker: None,
            },
        };
        assert!(matches!(app.run().await, Err(Error::Configuration(_))));
        std::fs::remove_dir_all(dir).unwrap();
    }

    fn route_with_output(yaml: &str, writer: tokio::io::DuplexStream) -> Route {
        let config = parse_route_config(yaml, config::FileFormat::Yaml).unwrap();
        RouteBuilder::new()
            .config(Arc::new(config))
            .output(Box::new(writer))
            .build()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_activate_routes_is_all_or_nothing() {
        use tokio::io::AsyncReadExt;

        let valid_yaml = ROUTE_YAML
            .replace("period=1000", "delay=0&period=1")
            .replace("Hello from timer at {{header.firedTime}}", "tick {{header.counter}}");
        let invalid_yaml = ROUTE_YAML.replace("period=1000", "period=oops");

        let (valid_writer, mut valid_reader) = tokio::io::duplex(64 * 1024);
        let (invalid_writer, _invalid_reader) = tokio::io::duplex(64);
        let routes = vec![
            route_with_output(&valid_yaml, valid_writer),
            route_with_output(&invalid_yaml, invalid_writer),
        ];

        let result = activate_routes(routes);
        assert!(matches!(
            result,
            Err(ConfigurationError::Endpoint { index: 0, .. })
        ));

        let mut output = String::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            valid_reader.read_to_string(&mut output),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(output, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_routes_starts_every_valid_route() {
        let (writer, _reader) = tokio::io::duplex(1024);
        let yaml = ROUTE_YAML.replace("period=1000", "repeatCount=1");
        let active = activate_routes(vec![route_with_output(&yaml, writer)]).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].stage_count(), 3);
        for route in active {
            route.wait().await.unwrap();
        }
    }
}
