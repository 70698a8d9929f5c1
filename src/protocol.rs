//! Control protocol spoken by the mail server plugin
//!
//! Each request is a single line: a command name, one space, then
//! tab-separated `name=value` pairs. A value is either a quoted string
//! (`"INBOX"`) or a parenthesized list of quoted strings (`("Inbox","Notes")`).
//! Quotes and commas inside values are not escaped by the plugin, so they
//! cannot be represented.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Argument value as sent by the plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    List(Vec<String>),
}

/// A decoded control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: HashMap<String, Value>,
}

impl Command {
    /// Look up a string argument
    pub fn string_arg(&self, name: &str) -> Result<&str> {
        match self.args.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(Value::List(_)) => Err(Error::WrongArgumentType {
                name: name.to_string(),
                expected: "string",
            }),
            None => Err(Error::MissingArgument(name.to_string())),
        }
    }

    /// Look up a list argument
    pub fn list_arg(&self, name: &str) -> Result<&[String]> {
        match self.args.get(name) {
            Some(Value::List(l)) => Ok(l),
            Some(Value::String(_)) => Err(Error::WrongArgumentType {
                name: name.to_string(),
                expected: "list",
            }),
            None => Err(Error::MissingArgument(name.to_string())),
        }
    }

    /// Look up a list argument that callers may omit
    pub fn optional_list_arg(&self, name: &str) -> Result<Option<&[String]>> {
        match self.list_arg(name) {
            Ok(list) => Ok(Some(list)),
            Err(Error::MissingArgument(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Response written back to the plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok { message: String },
    Error { message: String },
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Response::Ok {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok { message } if message.is_empty() => writeln!(f, "OK"),
            Response::Ok { message } => writeln!(f, "OK {}", message),
            Response::Error { message } => writeln!(f, "ERROR {}", message),
        }
    }
}

/// Parse a control command from a line of input
pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let (name, rest) = line
        .split_once(' ')
        .ok_or_else(|| Error::MalformedCommand("no command name found".to_string()))?;

    let mut args = HashMap::new();
    for pair in rest.split('\t') {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            Error::MalformedCommand(format!("no name/value pair found in {:?}", pair))
        })?;
        args.insert(key.to_string(), parse_value(raw)?);
    }

    Ok(Command {
        name: name.to_string(),
        args,
    })
}

fn parse_value(raw: &str) -> Result<Value> {
    if let Some(s) = parse_string(raw) {
        return Ok(Value::String(s.to_string()));
    }

    if let Some(inner) = raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        if inner.is_empty() {
            return Ok(Value::List(Vec::new()));
        }
        let items = inner
            .split(',')
            .map(|item| {
                parse_string(item).map(str::to_string).ok_or_else(|| {
                    Error::MalformedCommand(format!("invalid list item {:?}", item))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::List(items));
    }

    Err(Error::MalformedCommand(format!(
        "invalid value in key/value pair: {:?}",
        raw
    )))
}

fn parse_string(raw: &str) -> Option<&str> {
    if raw.len() < 2 {
        return None;
    }
    raw.strip_prefix('"').and_then(|r| r.strip_suffix('"'))
}
