//! Plain-text rendering of operation results and errors for the command client.

use serde_json::Value as JsonValue;

use crate::authz::Operation;
use crate::error::AppError;

fn compact(v: &JsonValue) -> String { serde_json::to_string(v).unwrap_or_else(|_| v.to_string()) }

fn items_of(v: &JsonValue) -> &[JsonValue] {
    v.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn table_line(t: &JsonValue) -> String {
    let name = t.get("name").and_then(|v| v.as_str()).unwrap_or("?");
    let key = t.get("key_attribute").and_then(|v| v.as_str()).unwrap_or("?");
    let count = t.get("item_count").and_then(|v| v.as_u64()).unwrap_or(0);
    match t.get("description").and_then(|v| v.as_str()) {
        Some(d) => format!("table {} (key: {}, items: {}) {}", name, key, count, d),
        None => format!("table {} (key: {}, items: {})", name, key, count),
    }
}

/// Lines to print for a successful operation.
pub fn render_result(op: Operation, out: &JsonValue) -> Vec<String> {
    match op {
        Operation::GetItem => match out.get("item") {
            Some(item) if !item.is_null() => vec![compact(item)],
            _ => vec!["item not found".to_string()],
        },
        Operation::Query | Operation::Scan => {
            let items = items_of(&out["items"]);
            let mut lines: Vec<String> = items.iter().map(compact).collect();
            lines.push(format!("({} item{})", items.len(), if items.len() == 1 { "" } else { "s" }));
            lines
        }
        Operation::BatchGetItem => {
            let mut lines = Vec::new();
            if let Some(tables) = out.get("responses").and_then(|r| r.as_object()) {
                for (table, items) in tables {
                    for item in items_of(items) { lines.push(format!("{}: {}", table, compact(item))); }
                }
            }
            if lines.is_empty() { lines.push("no items found".to_string()); }
            lines
        }
        Operation::PutItem | Operation::UpdateItem => vec![format!("operation '{}' completed", op)],
        Operation::DeleteItem => {
            if out.get("deleted").and_then(|d| d.as_bool()).unwrap_or(false) {
                vec![format!("operation '{}' completed", op)]
            } else {
                vec![format!("operation '{}' completed (no matching item)", op)]
            }
        }
        Operation::BatchWriteItem => {
            let n = out.get("processed").and_then(|v| v.as_u64()).unwrap_or(0);
            vec![format!("operation '{}' completed: {} request(s) processed", op, n)]
        }
        Operation::ListTables => {
            let tables = items_of(&out["tables"]);
            if tables.is_empty() { return vec!["no tables".to_string()]; }
            tables.iter().map(|t| t.as_str().map(str::to_string).unwrap_or_else(|| compact(t))).collect()
        }
        Operation::CreateTable | Operation::DescribeTable | Operation::UpdateTable => vec![table_line(&out["table"])],
        Operation::DeleteTable => vec![format!("deleted {}", table_line(&out["table"]))],
    }
}

/// One line for a failed command. Denials carry the gate's reason unchanged.
pub fn render_error(err: &AppError) -> String {
    match err {
        AppError::Forbidden { message, .. } => format!("access denied: {}", message),
        AppError::UserInput { message, .. } => format!("usage error: {}", message),
        AppError::Unavailable { code, message } | AppError::Internal { code, message } if code.starts_with("authorization") => {
            format!("authorization error: {} ({})", message, code)
        }
        AppError::Auth { message, .. } => format!("authentication error: {}", message),
        other => format!("error: {}", other.message()),
    }
}
