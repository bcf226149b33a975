//! Query result shapes.
use crate::{postgres::Oid, value::Value};

/// Description of a single result column, from a `RowDescription` message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescription {
    /// The field name.
    pub field_name: String,
    /// The object ID of the field's data type.
    pub type_oid: Oid,
    /// The data type size (see `pg_type.typlen`).
    ///
    /// Note that negative values denote variable-width types.
    pub field_size: i16,
    /// The type modifier (see `pg_attribute.atttypmod`).
    ///
    /// The meaning of the modifier is type-specific.
    pub type_mod: i32,
    /// The format code being used for the field.
    ///
    /// Currently will be zero (text) or one (binary).
    pub format: i16,
    /// If the field can be identified as a column of a specific table,
    /// the object ID of the table; otherwise zero.
    pub table_oid: u32,
    /// If the field can be identified as a column of a specific table,
    /// the attribute number of the column; otherwise zero.
    pub col_num: i16,
}

/// Result of a single completed statement.
///
/// One operation yields one result per SQL statement: several for a
/// multi-statement simple query, usually one for an extended query.
/// `fields` and `data` are `None` for statements that return no row set.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Column layout of the rows, when the statement returned any.
    pub fields: Option<Vec<FieldDescription>>,
    /// The decoded rows, in arrival order.
    pub data: Option<Vec<Vec<Value>>>,
    /// The command tag, e.g. `SELECT 7` or `INSERT 0 1`.
    pub tag: String,
}
