//! Maps a requested store operation to the permission it requires.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::permission::{Action, Permission};

/// Resource name used for table-metadata operations when no target is supplied.
pub const TABLE_RESOURCE: &str = "table";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
    #[error("operation '{0}' requires a target table")]
    MissingTarget(Operation),
}

/// Every store operation the front-ends may forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    GetItem,
    Query,
    Scan,
    BatchGetItem,
    PutItem,
    BatchWriteItem,
    UpdateItem,
    DeleteItem,
    CreateTable,
    DescribeTable,
    ListTables,
    UpdateTable,
    DeleteTable,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::GetItem,
        Operation::Query,
        Operation::Scan,
        Operation::BatchGetItem,
        Operation::PutItem,
        Operation::BatchWriteItem,
        Operation::UpdateItem,
        Operation::DeleteItem,
        Operation::CreateTable,
        Operation::DescribeTable,
        Operation::ListTables,
        Operation::UpdateTable,
        Operation::DeleteTable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetItem => "get-item",
            Operation::Query => "query",
            Operation::Scan => "scan",
            Operation::BatchGetItem => "batch-get-item",
            Operation::PutItem => "put-item",
            Operation::BatchWriteItem => "batch-write-item",
            Operation::UpdateItem => "update-item",
            Operation::DeleteItem => "delete-item",
            Operation::CreateTable => "create-table",
            Operation::DescribeTable => "describe-table",
            Operation::ListTables => "list-tables",
            Operation::UpdateTable => "update-table",
            Operation::DeleteTable => "delete-table",
        }
    }

    /// Case-insensitive lookup. Underscores are accepted in place of dashes.
    pub fn from_name(name: &str) -> Result<Operation, ClassifyError> {
        let norm = name.trim().to_ascii_lowercase().replace('_', "-");
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == norm)
            .ok_or_else(|| ClassifyError::UnknownOperation(name.to_string()))
    }

    /// Action required on the data resource (or on the explicit target for admin ops).
    pub fn action(&self) -> Action {
        match self {
            Operation::GetItem | Operation::Query | Operation::Scan | Operation::BatchGetItem => Action::Read,
            Operation::PutItem | Operation::BatchWriteItem => Action::Write,
            Operation::UpdateItem => Action::Update,
            Operation::DeleteItem => Action::Delete,
            Operation::CreateTable => Action::Create,
            Operation::DescribeTable => Action::Describe,
            Operation::ListTables => Action::List,
            Operation::UpdateTable => Action::UpdateMeta,
            Operation::DeleteTable => Action::DeleteTable,
        }
    }

    /// Action used under the shared `table` resource. Only delete-table differs: it is
    /// `table:delete` rather than `table:delete_table`.
    fn table_alias_action(&self) -> Action {
        match self {
            Operation::DeleteTable => Action::Delete,
            other => other.action(),
        }
    }

    /// True for operations on table metadata rather than item data.
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            Operation::CreateTable | Operation::DescribeTable | Operation::ListTables | Operation::UpdateTable | Operation::DeleteTable
        )
    }

    pub fn is_batch(&self) -> bool { matches!(self, Operation::BatchGetItem | Operation::BatchWriteItem) }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Operation {
    type Err = ClassifyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Operation::from_name(s) }
}

fn normalize_target(target: Option<&str>) -> Option<String> {
    target.map(|t| t.trim().to_ascii_lowercase()).filter(|t| !t.is_empty())
}

/// Required permission for an already-parsed operation.
pub fn required_permission(op: Operation, target: Option<&str>) -> Result<Permission, ClassifyError> {
    let target = normalize_target(target);
    if op.is_administrative() {
        return Ok(match target {
            Some(t) => Permission::exact(&t, op.action()),
            None => Permission::exact(TABLE_RESOURCE, op.table_alias_action()),
        });
    }
    match target {
        Some(t) => Ok(Permission::exact(&t, op.action())),
        None => Err(ClassifyError::MissingTarget(op)),
    }
}

/// Map `(operation name, target resource)` to the permission it requires.
pub fn classify(operation_name: &str, target: Option<&str>) -> Result<Permission, ClassifyError> {
    let op = Operation::from_name(operation_name)?;
    required_permission(op, target)
}
