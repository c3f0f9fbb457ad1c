use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        Self::from_name(&env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()))
    }

    /// Anything other than `production`/`prod` (any case) is development.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Read `key` from the environment and parse it, falling back to `default`
/// when the variable is unset or does not parse. A value that does not parse
/// is logged.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment variable, using default");
            default
        }
    }
}
