//! Command client support: parsing of `dynamodb <operation> --flag value ...` lines,
//! rendering of results, and the local/remote backends the interactive loop runs against.

pub mod connectivity;
pub mod render;
pub mod session;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::authz::{ClassifyError, Operation};
use crate::error::AppError;
use crate::storage::ops::StoreRequest;
use crate::storage::Item;

pub const COMMAND_PREFIX: &str = "dynamodb";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unbalanced quotes or trailing escape in command")]
    UnbalancedQuote,
    #[error("command must start with 'dynamodb <operation>'")]
    MissingPrefix,
    #[error("missing operation after 'dynamodb'")]
    MissingOperation,
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
    #[error("flag --{0} requires a value")]
    MissingValue(String),
    #[error("unknown flag --{0}")]
    UnknownFlag(String),
    #[error("flag --{flag} expects {expected}: {detail}")]
    InvalidValue { flag: String, expected: &'static str, detail: String },
}

impl From<CommandError> for AppError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Classify(c) => c.into(),
            other => AppError::user("usage".to_string(), other.to_string()),
        }
    }
}

/// A parsed command line, ready for the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub operation: Operation,
    pub request: StoreRequest,
}

/// Split a line into words with POSIX shell quoting: single quotes are literal, double
/// quotes allow `\"` and `\\`, and a backslash outside quotes escapes the next character.
pub fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    #[derive(PartialEq)]
    enum Mode { Plain, Single, Double }
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut mode = Mode::Plain;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match mode {
            Mode::Plain => match c {
                c if c.is_whitespace() => {
                    if in_word { out.push(std::mem::take(&mut cur)); in_word = false; }
                }
                '\'' => { mode = Mode::Single; in_word = true; }
                '"' => { mode = Mode::Double; in_word = true; }
                '\\' => {
                    cur.push(chars.next().ok_or(CommandError::UnbalancedQuote)?);
                    in_word = true;
                }
                c => { cur.push(c); in_word = true; }
            },
            Mode::Single => match c {
                '\'' => mode = Mode::Plain,
                c => cur.push(c),
            },
            Mode::Double => match c {
                '"' => mode = Mode::Plain,
                '\\' => match chars.next() {
                    Some(n @ ('"' | '\\')) => cur.push(n),
                    Some(n) => { cur.push('\\'); cur.push(n); }
                    None => return Err(CommandError::UnbalancedQuote),
                },
                c => cur.push(c),
            },
        }
    }
    if mode != Mode::Plain { return Err(CommandError::UnbalancedQuote); }
    if in_word { out.push(cur); }
    Ok(out)
}

fn json_object(flag: &str, raw: &str) -> Result<Item, CommandError> {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(m)) => Ok(m),
        Ok(_) => Err(CommandError::InvalidValue { flag: flag.into(), expected: "a JSON object", detail: raw.into() }),
        Err(e) => Err(CommandError::InvalidValue { flag: flag.into(), expected: "a JSON object", detail: e.to_string() }),
    }
}

/// Parse `dynamodb <operation> [--flag value]...`. A leading `aws` is accepted.
pub fn parse_command(line: &str) -> Result<ParsedCommand, CommandError> {
    let tokens = tokenize(line)?;
    let mut it = tokens.iter().map(String::as_str).peekable();
    if it.peek().is_some_and(|t| t.eq_ignore_ascii_case("aws")) { it.next(); }
    match it.next() {
        None => return Err(CommandError::Empty),
        Some(t) if t.eq_ignore_ascii_case(COMMAND_PREFIX) => {}
        Some(_) => return Err(CommandError::MissingPrefix),
    }
    let operation = Operation::from_name(it.next().ok_or(CommandError::MissingOperation)?)?;

    let mut request = StoreRequest::default();
    while let Some(tok) = it.next() {
        let Some(flag) = tok.strip_prefix("--") else {
            return Err(CommandError::UnexpectedArgument(tok.to_string()));
        };
        let flag = flag.to_ascii_lowercase();
        let value = it.next().ok_or_else(|| CommandError::MissingValue(flag.clone()))?;
        match flag.replace('_', "-").as_str() {
            "table-name" => request.table_name = Some(value.to_string()),
            "key" => request.key = Some(json_object(&flag, value)?),
            "item" => request.item = Some(json_object(&flag, value)?),
            "attributes" | "attribute-updates" => request.attributes = Some(json_object(&flag, value)?),
            "key-condition" | "key-conditions" => request.key_condition = Some(json_object(&flag, value)?),
            "request-items" => request.request_items = Some(JsonValue::Object(json_object(&flag, value)?)),
            "limit" => {
                let n = value.parse::<usize>().map_err(|e| CommandError::InvalidValue {
                    flag: flag.clone(),
                    expected: "a non-negative integer",
                    detail: e.to_string(),
                })?;
                request.limit = Some(n);
            }
            "key-attribute" => request.key_attribute = Some(value.to_string()),
            "description" => request.description = Some(value.to_string()),
            _ => return Err(CommandError::UnknownFlag(flag)),
        }
    }
    Ok(ParsedCommand { operation, request })
}

pub fn usage() -> &'static str {
    "Commands:\n  dynamodb <operation> [--table-name T] [--key JSON] [--item JSON] [--attributes JSON]\n           [--key-condition JSON] [--limit N] [--request-items JSON]\n           [--key-attribute NAME] [--description TEXT]\n  whoami                             show the signed-in user and role\n  help                               show this help\n  exit | quit                        leave the client\n\nOperations:\n  get-item put-item update-item delete-item query scan batch-get-item batch-write-item\n  create-table describe-table list-tables update-table delete-table"
}
