use std::env;
use std::str::FromStr;

use crate::errors::BackendError;

/// Returns the value of the named environment variable.
pub fn get_variable(name: &str) -> Result<String, BackendError> {
    env::var(name).map_err(|_| BackendError::MissingVariable(name.to_owned()))
}

/// Returns the value of the named environment variable, if it is set
/// and not blank.
pub fn get_optional_variable(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parses the named environment variable.
pub fn parse_variable<T>(name: &str) -> Result<T, BackendError>
where
    T: FromStr,
    T::Err: ToString,
{
    parse(name, &get_variable(name)?)
}

/// Parses the named environment variable, falling back to `default`
/// when it isn’t set.
pub fn parse_variable_or<T>(name: &str, default: T) -> Result<T, BackendError>
where
    T: FromStr,
    T::Err: ToString,
{
    match get_optional_variable(name) {
        Some(value) => parse(name, &value),
        None => Ok(default),
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T, BackendError>
where
    T: FromStr,
    T::Err: ToString,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| BackendError::InvalidVariable {
            name: name.to_owned(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_only_when_unset() {
        env::remove_var("BLOODBANK_TEST_UNSET");
        assert_eq!(parse_variable_or("BLOODBANK_TEST_UNSET", 12u32).unwrap(), 12);

        env::set_var("BLOODBANK_TEST_SET", " 8 ");
        assert_eq!(parse_variable_or("BLOODBANK_TEST_SET", 12u32).unwrap(), 8);

        env::set_var("BLOODBANK_TEST_BAD", "eight");
        assert!(parse_variable::<u16>("BLOODBANK_TEST_BAD").is_err());

        assert!(get_variable("BLOODBANK_TEST_UNSET").is_err());
    }
}
