//! Port text validation.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum PortError {
    #[error("'{0}' is not a port number")]
    WrongInput(String),
    #[error("port {0} is outside 1-65535")]
    OutOfRange(i64),
}

/// Validates port text as typed by the user. Whitespace is not trimmed.
pub fn validate_port(input: &str) -> Result<u16, PortError> {
    match input.parse::<u16>() {
        Ok(0) => Err(PortError::OutOfRange(0)),
        Ok(port) => Ok(port),
        Err(_) => match input.parse::<i64>() {
            Ok(value) => Err(PortError::OutOfRange(value)),
            Err(_) => Err(PortError::WrongInput(input.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ports_in_range() {
        assert_eq!(validate_port("8080"), Ok(8080));
        assert_eq!(validate_port("1"), Ok(1));
        assert_eq!(validate_port("65535"), Ok(65535));
    }

    #[test]
    fn numeric_out_of_range() {
        assert_eq!(validate_port("70000"), Err(PortError::OutOfRange(70000)));
        assert_eq!(validate_port("0"), Err(PortError::OutOfRange(0)));
        assert_eq!(validate_port("-1"), Err(PortError::OutOfRange(-1)));
    }

    #[test]
    fn non_numeric_input() {
        assert_eq!(validate_port("abc"), Err(PortError::WrongInput("abc".into())));
        assert_eq!(validate_port(""), Err(PortError::WrongInput(String::new())));
        assert_eq!(validate_port(" 80"), Err(PortError::WrongInput(" 80".into())));
    }
}
