//! Structured queries over stored documents.
//!
//! Backends receive a [`Query`]: an optional filter expression plus
//! projection, sorting, and pagination settings. Filter expressions are
//! built with the [`Filter`] helpers and walked by backends through the
//! [`QueryVisitor`] trait, which keeps the translation to each store's
//! native predicate language in one place.
//!
//! ```ignore
//! let query = Query::builder()
//!     .filter(Filter::eq("last_name", "Dent").and(Filter::gt("age", 30)))
//!     .sort("last_name", SortDirection::Asc)
//!     .limit(10)
//!     .build();
//! ```

use bson::Bson;

use crate::error::MapperError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// One sort key: the field to sort by and its direction.
#[derive(Debug, Clone)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String or array contains the value.
    Contains,
    /// Array field contains any of the given values.
    AnyOf,
    /// Array field contains none of the given values.
    NoneOf,
}

/// A filter expression tree.
///
/// Leaves compare a single field; inner nodes combine sub-expressions with
/// logical operators.
#[derive(Debug, Clone)]
pub enum Expr {
    /// All sub-expressions must match.
    And(Vec<Expr>),
    /// Any sub-expression may match.
    Or(Vec<Expr>),
    /// Inverts the sub-expression.
    Not(Box<Expr>),
    /// Matches on field presence (or absence when `false`).
    Exists(String, bool),
    /// Field comparison leaf.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// An existing AND list is extended in place rather than nested.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// A structured query: filter, projection, sort keys, and pagination.
///
/// Use [`Query::builder`] for fluent construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Fields to include in returned documents. Empty means the full
    /// document; the identifier field is always included.
    pub projection: Vec<String>,
    /// Sort keys, applied in order (later keys break ties).
    pub sort: Vec<Sort>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of matching documents to skip first.
    pub offset: Option<usize>,
}

impl Query {
    /// Creates a new empty query matching every document.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Static constructors for filter expressions.
///
/// All methods accept field names as `Into<String>` and values as
/// `Into<Bson>`.
pub struct Filter;

impl Filter {
    /// Field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// String or array field contains the value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Array field contains any of the given values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Array field contains none of the given values.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    /// Field exists on the document.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Field is missing from the document.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// All of the given expressions must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any of the given expressions may match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Restricts returned documents to the given fields.
    pub fn project(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.query
            .projection
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Caps the number of returned documents.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Skips the first `offset` matching documents.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Builds the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks a filter expression tree, producing a backend-native predicate.
pub trait QueryVisitor {
    type Output;
    type Error: Into<MapperError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_chaining_extends_existing_list() {
        let expr = Filter::eq("a", 1)
            .and(Filter::eq("b", 2))
            .and(Filter::eq("c", 3));
        match expr {
            Expr::And(list) => assert_eq!(list.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn builder_collects_all_parts() {
        let query = Query::builder()
            .filter(Filter::gt("age", 21))
            .project(["first_name", "last_name"])
            .sort("last_name", SortDirection::Asc)
            .sort("first_name", SortDirection::Desc)
            .limit(5)
            .offset(10)
            .build();

        assert!(query.filter.is_some());
        assert_eq!(query.projection, vec!["first_name", "last_name"]);
        assert_eq!(query.sort.len(), 2);
        assert_eq!(query.sort[1].direction, SortDirection::Desc);
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(10));
    }
}
