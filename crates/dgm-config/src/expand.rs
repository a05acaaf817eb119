//! `${VAR}` and `${VAR:-default}` expansion for configuration strings.
//!
//! A value without any `${` is returned unchanged, bare `$VAR` included. Once
//! a value contains a braced reference, every reference in it is expanded,
//! bare ones too.

use crate::ConfigError;

/// Name of the variable that failed to resolve.
struct Unset(String);

/// Expand variable references in `value`, reporting failures against `field`.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    let lookup = |name: &str| -> Result<Option<String>, Unset> {
        std::env::var(name)
            .map(Some)
            .map_err(|_| Unset(name.to_owned()))
    };

    shellexpand::env_with_context(value, lookup)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.cause.0),
        })
}

/// [`expand_env`] for optional fields.
pub(crate) fn expand_opt(value: Option<&str>, field: &str) -> Result<Option<String>, ConfigError> {
    value.map(|v| expand_env(v, field)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_value_unchanged() {
        assert_eq!(
            expand_env("http://127.0.0.1:9515", "backend.webdriver_url").unwrap(),
            "http://127.0.0.1:9515"
        );
    }

    #[test]
    fn test_bare_dollar_not_expanded() {
        assert_eq!(expand_env("$HOME/bin", "backend.driver_path").unwrap(), "$HOME/bin");
    }

    #[test]
    fn test_bare_dollar_expanded_alongside_braced() {
        // SAFETY: variable names are unique to this test
        unsafe {
            std::env::set_var("DGM_TEST_MIX_ROOT", "/opt");
            std::env::set_var("DGM_TEST_MIX_BIN", "bin");
        }
        let result = expand_env("${DGM_TEST_MIX_ROOT}/$DGM_TEST_MIX_BIN", "backend.driver_path").unwrap();
        assert_eq!(result, "/opt/bin");
    }

    #[test]
    fn test_expand_embedded_var() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("DGM_TEST_GRID_HOST", "grid.internal");
        }
        let result = expand_env("http://${DGM_TEST_GRID_HOST}:4444", "backend.webdriver_url").unwrap();
        assert_eq!(result, "http://grid.internal:4444");
        unsafe {
            std::env::remove_var("DGM_TEST_GRID_HOST");
        }
    }

    #[test]
    fn test_default_used_when_unset() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("DGM_TEST_UNSET_PORT");
        }
        let result = expand_env("http://localhost:${DGM_TEST_UNSET_PORT:-9515}", "f").unwrap();
        assert_eq!(result, "http://localhost:9515");
    }

    #[test]
    fn test_missing_var_names_field() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("DGM_TEST_MISSING_DRIVER");
        }
        let err = expand_env("${DGM_TEST_MISSING_DRIVER}", "backend.driver_path").unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let message = err.to_string();
        assert!(message.contains("backend.driver_path"));
        assert!(message.contains("${DGM_TEST_MISSING_DRIVER} not set"));
    }

    #[test]
    fn test_expand_opt() {
        assert_eq!(expand_opt(None, "f").unwrap(), None);
        assert_eq!(expand_opt(Some("x"), "f").unwrap(), Some("x".to_owned()));
    }
}
