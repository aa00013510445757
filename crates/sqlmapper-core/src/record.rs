//! Record metadata and member access.
//!
//! `#[derive(Record)]` implements [`Record`] for a struct with named fields:
//! a static member table plus indexed accessors. The descriptor registry and
//! the row deserializer work exclusively through this trait, so no runtime
//! reflection is needed.

use crate::Result;
use crate::types::FieldKind;
use crate::value::Value;
use std::any::TypeId;

/// Static description of one struct field.
#[derive(Debug, Clone, Copy)]
pub struct MemberInfo {
    /// Member name used for column matching and parameter names.
    pub name: &'static str,
    /// Full Rust type name of the field.
    pub type_name: fn() -> &'static str,
    pub kind: FieldKind,
    /// `Option<_>` member.
    pub nullable: bool,
    /// Record description of a nested member.
    pub nested: Option<fn() -> &'static RecordInfo>,
    /// Marked `#[sqlmapper(identity)]`.
    pub identity: bool,
    /// Identity generated by the database.
    pub auto_increment: bool,
    /// Excluded from generated entity SQL.
    pub ignore: bool,
}

impl MemberInfo {
    /// A plain member with no entity flags.
    pub const fn new(
        name: &'static str,
        type_name: fn() -> &'static str,
        kind: FieldKind,
        nullable: bool,
        nested: Option<fn() -> &'static RecordInfo>,
    ) -> Self {
        Self {
            name,
            type_name,
            kind,
            nullable,
            nested,
            identity: false,
            auto_increment: false,
            ignore: false,
        }
    }
}

/// Static description of a record type.
#[derive(Debug)]
pub struct RecordInfo {
    /// Struct name.
    pub name: &'static str,
    /// Table name from `#[sqlmapper(table = "...")]`.
    pub table: Option<&'static str>,
    pub type_id: fn() -> TypeId,
    /// Members in declaration order.
    pub members: &'static [MemberInfo],
}

impl RecordInfo {
    /// Table name, defaulting to the struct name.
    pub fn table_name(&self) -> &'static str {
        self.table.unwrap_or(self.name)
    }

    /// Find a direct member by exact name.
    pub fn member(&self, name: &str) -> Option<(usize, &'static MemberInfo)> {
        self.members.iter().enumerate().find(|(_, m)| m.name == name)
    }

    /// The member flagged as identity, if any.
    pub fn identity(&self) -> Option<(usize, &'static MemberInfo)> {
        self.members.iter().enumerate().find(|(_, m)| m.identity)
    }
}

/// A struct whose members can be enumerated and accessed by index.
pub trait Record: 'static {
    /// Static description of this record type.
    fn record_info() -> &'static RecordInfo
    where
        Self: Sized;

    /// Static description, callable on trait objects.
    fn info(&self) -> &'static RecordInfo;

    /// Read member `index` as a provider value.
    fn get(&self, index: usize) -> Value;

    /// Convert `value` and store it in member `index`.
    #[allow(clippy::result_large_err)]
    fn set(&mut self, index: usize, value: &Value) -> Result<()>;

    /// Borrow nested member `index` as a record, default-constructing it
    /// first when it is an empty `Option`.
    fn nested_mut(&mut self, index: usize) -> Option<&mut dyn Record>;
}

/// Error for an index outside the member table.
pub fn no_such_member(info: &RecordInfo, index: usize) -> crate::Error {
    crate::Error::config(format!("{} has no member at index {}", info.name, index))
}

