//! `<device><?|:|!><operation>` action strings

use std::fmt;

use crate::error::{ControlError, Result};

/// Request, answer or error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Request,
    Answer,
    Error,
}

impl Command {
    pub fn symbol(&self) -> char {
        match self {
            Command::Request => '?',
            Command::Answer => ':',
            Command::Error => '!',
        }
    }

    fn from_symbol(c: char) -> Option<Self> {
        match c {
            '?' => Some(Command::Request),
            ':' => Some(Command::Answer),
            '!' => Some(Command::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Namespace,
    Get,
    Listen,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Namespace => "namespace",
            Operation::Get => "get",
            Operation::Listen => "listen",
        }
    }
}

/// A parsed action string such as `remote?namespace`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinuitAction {
    /// Name of the sending device
    pub device: String,
    pub command: Command,
    pub operation: Operation,
}

impl MinuitAction {
    pub fn new(device: impl Into<String>, command: Command, operation: Operation) -> Self {
        Self {
            device: device.into(),
            command,
            operation,
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let malformed = || ControlError::MalformedAction(text.to_string());

        let (idx, command) = text
            .char_indices()
            .find_map(|(idx, c)| Command::from_symbol(c).map(|cmd| (idx, cmd)))
            .ok_or_else(malformed)?;

        let device = &text[..idx];
        if device.is_empty() || device.starts_with('/') {
            return Err(malformed());
        }

        let operation = match &text[idx + 1..] {
            "namespace" => Operation::Namespace,
            "get" => Operation::Get,
            "listen" => Operation::Listen,
            _ => return Err(malformed()),
        };

        Ok(Self::new(device, command, operation))
    }

    /// Same operation, answered under `device`
    pub fn answer(&self, device: &str) -> Self {
        Self::new(device, Command::Answer, self.operation)
    }

    /// Same operation, failed under `device`
    pub fn error(&self, device: &str) -> Self {
        Self::new(device, Command::Error, self.operation)
    }
}

impl fmt::Display for MinuitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.device, self.command.symbol(), self.operation.as_str())
    }
}

/// Whether an OSC address is a Minuit action rather than a parameter path
pub fn is_action(addr: &str) -> bool {
    !addr.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("remote?namespace", Command::Request, Operation::Namespace)]
    #[case("device:get", Command::Answer, Operation::Get)]
    #[case("device!listen", Command::Error, Operation::Listen)]
    fn test_parse_actions(#[case] text: &str, #[case] command: Command, #[case] operation: Operation) {
        let action = MinuitAction::parse(text).unwrap();
        assert_eq!(action.command, command);
        assert_eq!(action.operation, operation);
        assert_eq!(action.to_string(), text);
    }

    #[rstest]
    #[case::no_symbol("devicenamespace")]
    #[case::no_device("?get")]
    #[case::unknown_operation("device?set")]
    #[case::path("/a?get")]
    fn test_malformed_actions(#[case] text: &str) {
        assert!(matches!(MinuitAction::parse(text), Err(ControlError::MalformedAction(_))));
    }

    #[test]
    fn test_answer_keeps_operation() {
        let request = MinuitAction::parse("remote?get").unwrap();
        assert_eq!(request.answer("local").to_string(), "local:get");
        assert_eq!(request.error("local").to_string(), "local!get");
    }

    #[test]
    fn test_is_action() {
        assert!(is_action("remote?get"));
        assert!(!is_action("/da/da"));
    }
}
