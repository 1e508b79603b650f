//! Environment variable lookup with an injectable backing map.
//!
//! Config loading reads credentials and overrides through [`Env`] so tests
//! can supply a fixed environment instead of mutating the process one.

use std::collections::HashMap;

/// Environment variable reader.
#[derive(Clone, Debug, Default)]
pub struct Env {
    overrides: Option<HashMap<String, String>>,
}

impl Env {
    /// Read from the real process environment.
    pub fn real() -> Self {
        Self { overrides: None }
    }

    /// Read only from the given key-value pairs.
    pub fn mock(vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        Self {
            overrides: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Look up a variable. Empty values count as unset.
    pub fn var(&self, name: &str) -> Option<String> {
        let value = match &self.overrides {
            Some(map) => map.get(name).cloned(),
            None => std::env::var(name).ok(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Return the value of the first variable in `names` that is set.
    pub fn first_of(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.var(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_env_reads_cargo_manifest_dir() {
        assert!(Env::real().var("CARGO_MANIFEST_DIR").is_some());
    }

    #[test]
    fn mock_env_ignores_process_environment() {
        let env = Env::mock([("PRLENS_MODEL", "gpt-4o")]);
        assert_eq!(env.var("PRLENS_MODEL").as_deref(), Some("gpt-4o"));
        assert!(env.var("CARGO_MANIFEST_DIR").is_none());
    }

    #[test]
    fn empty_values_are_unset() {
        let env = Env::mock([("PRLENS_API_KEY", "  ")]);
        assert!(env.var("PRLENS_API_KEY").is_none());
    }

    #[test]
    fn first_of_prefers_earlier_names() {
        let env = Env::mock([("OPENAI_API_KEY", "sk-b"), ("PRLENS_API_KEY", "sk-a")]);
        assert_eq!(
            env.first_of(&["PRLENS_API_KEY", "OPENAI_API_KEY"]).as_deref(),
            Some("sk-a")
        );
        assert_eq!(env.first_of(&["MISSING", "OPENAI_API_KEY"]).as_deref(), Some("sk-b"));
        assert!(env.first_of(&["MISSING"]).is_none());
    }
}
