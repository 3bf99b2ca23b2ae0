//! Endpoint descriptors for route sources and sinks.
//!
//! Parses descriptor strings of the form `scheme:[//]path[?name=value&...]` into
//! typed endpoint definitions. Only the periodic timer source and the standard
//! stream sink are known to routegen.

use std::collections::HashMap;
use std::time::Duration;

/// Scheme of the periodic timer source.
pub const TIMER_SCHEME: &str = "timer";
/// Scheme of the standard stream sink.
pub const STREAM_SCHEME: &str = "stream";
/// Default timer period in milliseconds.
pub const DEFAULT_PERIOD_MS: u64 = 1000;
/// Default delay before the first firing in milliseconds.
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Errors that can occur while parsing an endpoint descriptor.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("Endpoint descriptor is empty")]
    Empty,
    #[error("Endpoint descriptor {uri} has no scheme")]
    MissingScheme { uri: String },
    #[error("Endpoint descriptor {uri} has no path")]
    MissingPath { uri: String },
    #[error("Unknown endpoint scheme {scheme} in {uri}")]
    UnknownScheme { scheme: String, uri: String },
    #[error("Unknown stream {name}, expected one of: out, err")]
    UnknownStream { name: String },
    #[error("Unknown option {name} for {scheme} endpoint")]
    UnknownOption { scheme: String, name: String },
    #[error("Option {0} has no value")]
    MissingOptionValue(String),
    #[error("Option {0} is set more than once")]
    DuplicateOption(String),
    #[error("Invalid value {value} for option {name}: expected {expected}")]
    InvalidOptionValue {
        name: String,
        value: String,
        expected: &'static str,
    },
    #[error("Timer period must be greater than zero")]
    ZeroPeriod,
}

/// Descriptor split into its scheme, path and raw options.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Descriptor<'a> {
    scheme: &'a str,
    path: &'a str,
    options: HashMap<&'a str, &'a str>,
}

impl<'a> Descriptor<'a> {
    fn parse(uri: &'a str) -> Result<Self, Error> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(Error::Empty);
        }

        let (scheme, rest) = uri.split_once(':').ok_or_else(|| Error::MissingScheme {
            uri: uri.to_string(),
        })?;
        if scheme.is_empty() {
            return Err(Error::MissingScheme {
                uri: uri.to_string(),
            });
        }

        let rest = rest.strip_prefix("//").unwrap_or(rest);
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };
        if path.is_empty() {
            return Err(Error::MissingPath {
                uri: uri.to_string(),
            });
        }

        let mut options = HashMap::new();
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::MissingOptionValue(pair.to_string()))?;
            if options.insert(name, value).is_some() {
                return Err(Error::DuplicateOption(name.to_string()));
            }
        }

        Ok(Descriptor {
            scheme,
            path,
            options,
        })
    }

    fn take_u64(&mut self, name: &str) -> Result<Option<u64>, Error> {
        self.options
            .remove(name)
            .map(|value| {
                value.parse::<u64>().map_err(|_| Error::InvalidOptionValue {
                    name: name.to_string(),
                    value: value.to_string(),
                    expected: "a non-negative integer",
                })
            })
            .transpose()
    }

    fn take_bool(&mut self, name: &str) -> Result<Option<bool>, Error> {
        self.options
            .remove(name)
            .map(|value| match value {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(Error::InvalidOptionValue {
                    name: name.to_string(),
                    value: value.to_string(),
                    expected: "true or false",
                }),
            })
            .transpose()
    }

    /// Fails on the first option that was not consumed.
    fn finish(self) -> Result<(), Error> {
        let mut leftover: Vec<&str> = self.options.into_keys().collect();
        leftover.sort_unstable();
        match leftover.first() {
            Some(name) => Err(Error::UnknownOption {
                scheme: self.scheme.to_string(),
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Periodic timer source endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEndpoint {
    /// Timer name taken from the descriptor path.
    pub name: String,
    /// Interval between firings.
    pub period: Duration,
    /// Delay before the first firing.
    pub delay: Duration,
    /// Number of firings before the timer stops, `None` for unbounded.
    pub repeat_count: Option<u64>,
    /// Whether missed ticks are caught up instead of pushing later firings back.
    pub fixed_rate: bool,
}

impl std::str::FromStr for TimerEndpoint {
    type Err = Error;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let mut descriptor = Descriptor::parse(uri)?;
        if descriptor.scheme != TIMER_SCHEME {
            return Err(Error::UnknownScheme {
                scheme: descriptor.scheme.to_string(),
                uri: uri.to_string(),
            });
        }

        let period = descriptor.take_u64("period")?.unwrap_or(DEFAULT_PERIOD_MS);
        if period == 0 {
            return Err(Error::ZeroPeriod);
        }
        let delay = descriptor.take_u64("delay")?.unwrap_or(DEFAULT_DELAY_MS);
        let repeat_count = descriptor
            .take_u64("repeatCount")?
            .filter(|count| *count > 0);
        let fixed_rate = descriptor.take_bool("fixedRate")?.unwrap_or(false);
        let name = descriptor.path.to_string();
        descriptor.finish()?;

        Ok(TimerEndpoint {
            name,
            period: Duration::from_millis(period),
            delay: Duration::from_millis(delay),
            repeat_count,
            fixed_rate,
        })
    }
}

/// Standard stream targeted by a stream sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard output.
    Out,
    /// Standard error.
    Err,
}

/// Standard stream sink endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub kind: StreamKind,
}

impl std::str::FromStr for StreamEndpoint {
    type Err = Error;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let descriptor = Descriptor::parse(uri)?;
        if descriptor.scheme != STREAM_SCHEME {
            return Err(Error::UnknownScheme {
                scheme: descriptor.scheme.to_string(),
                uri: uri.to_string(),
            });
        }

        let kind = match descriptor.path {
            "out" => StreamKind::Out,
            "err" => StreamKind::Err,
            other => {
                return Err(Error::UnknownStream {
                    name: other.to_string(),
                })
            }
        };
        descriptor.finish()?;

        Ok(StreamEndpoint { kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_endpoint_defaults() {
        let timer: TimerEndpoint = "timer:simpleTimer".parse().unwrap();
        assert_eq!(timer.name, "simpleTimer");
        assert_eq!(timer.period, Duration::from_millis(1000));
        assert_eq!(timer.delay, Duration::from_millis(1000));
        assert!(timer.repeat_count.is_none());
        assert!(!timer.fixed_rate);
    }

    #[test]
    fn test_timer_endpoint_with_slashes_and_period() {
        let timer: TimerEndpoint = "timer://simpleTimer?period=1000".parse().unwrap();
        assert_eq!(timer.name, "simpleTimer");
        assert_eq!(timer.period, Duration::from_millis(1000));
    }

    #[test]
    fn test_timer_endpoint_all_options() {
        let timer: TimerEndpoint = "timer:tick?period=250&delay=0&repeatCount=3&fixedRate=true"
            .parse()
            .unwrap();
        assert_eq!(timer.period, Duration::from_millis(250));
        assert_eq!(timer.delay, Duration::ZERO);
        assert_eq!(timer.repeat_count, Some(3));
        assert!(timer.fixed_rate);
    }

    #[test]
    fn test_timer_endpoint_zero_repeat_count_is_unbounded() {
        let timer: TimerEndpoint = "timer:tick?repeatCount=0".parse().unwrap();
        assert!(timer.repeat_count.is_none());
    }

    #[test]
    fn test_timer_endpoint_non_numeric_period() {
        let err = "timer:tick?period=abc".parse::<TimerEndpoint>().unwrap_err();
        assert!(matches!(err, Error::InvalidOptionValue { ref name, .. } if name == "period"));
    }

    #[test]
    fn test_timer_endpoint_negative_period() {
        let err = "timer:tick?period=-5".parse::<TimerEndpoint>().unwrap_err();
        assert!(matches!(err, Error::InvalidOptionValue { .. }));
    }

    #[test]
    fn test_timer_endpoint_zero_period() {
        let err = "timer:tick?period=0".parse::<TimerEndpoint>().unwrap_err();
        assert_eq!(err, Error::ZeroPeriod);
    }

    #[test]
    fn test_timer_endpoint_unknown_option() {
        let err = "timer:tick?periodd=10".parse::<TimerEndpoint>().unwrap_err();
        assert_eq!(
            err,
            Error::UnknownOption {
                scheme: "timer".to_string(),
                name: "periodd".to_string()
            }
        );
    }

    #[test]
    fn test_timer_endpoint_duplicate_option() {
        let err = "timer:tick?period=10&period=20"
            .parse::<TimerEndpoint>()
            .unwrap_err();
        assert_eq!(err, Error::DuplicateOption("period".to_string()));
    }

    #[test]
    fn test_timer_endpoint_option_without_value() {
        let err = "timer:tick?period".parse::<TimerEndpoint>().unwrap_err();
        assert_eq!(err, Error::MissingOptionValue("period".to_string()));
    }

    #[test]
    fn test_timer_endpoint_invalid_fixed_rate() {
        let err = "timer:tick?fixedRate=yes".parse::<TimerEndpoint>().unwrap_err();
        assert!(matches!(err, Error::InvalidOptionValue { ref name, .. } if name == "fixedRate"));
    }

    #[test]
    fn test_timer_endpoint_wrong_scheme() {
        let err = "stream:out".parse::<TimerEndpoint>().unwrap_err();
        assert!(matches!(err, Error::UnknownScheme { ref scheme, .. } if scheme == "stream"));
    }

    #[test]
    fn test_timer_endpoint_missing_path() {
        let err = "timer:?period=10".parse::<TimerEndpoint>().unwrap_err();
        assert!(matches!(err, Error::MissingPath { .. }));
    }

    #[test]
    fn test_descriptor_missing_scheme() {
        assert!(matches!(
            "simpleTimer".parse::<TimerEndpoint>().unwrap_err(),
            Error::MissingScheme { .. }
        ));
        assert!(matches!(
            ":simpleTimer".parse::<TimerEndpoint>().unwrap_err(),
            Error::MissingScheme { .. }
        ));
        assert_eq!("  ".parse::<TimerEndpoint>().unwrap_err(), Error::Empty);
    }

    #[test]
    fn test_stream_endpoint_out_and_err() {
        let out: StreamEndpoint = "stream:out".parse().unwrap();
        assert_eq!(out.kind, StreamKind::Out);
        let err: StreamEndpoint = "stream://err".parse().unwrap();
        assert_eq!(err.kind, StreamKind::Err);
    }

    #[test]
    fn test_stream_endpoint_unknown_stream() {
        let err = "stream:in".parse::<StreamEndpoint>().unwrap_err();
        assert_eq!(
            err,
            Error::UnknownStream {
                name: "in".to_string()
            }
        );
    }

    #[test]
    fn test_stream_endpoint_rejects_options() {
        let err = "stream:out?encoding=utf8"
            .parse::<StreamEndpoint>()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownOption { .. }));
    }
}
