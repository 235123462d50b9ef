//! Translation from filter expressions to MongoDB query documents.

use bson::{Bson, Document, doc};

use docmap_core::{
    error::MapperError,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Walks a filter expression and emits MongoDB's native predicate syntax.
pub(crate) struct MongoQueryTranslator;

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = MapperError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // The server only accepts `$not` at field level; `$nor` with a
        // single branch is the top-level form of negation.
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": format!(".*{}.*", s), "$options": "i" },
                    Bson::Array(arr) => doc! { "$all": arr },
                    _ => return Err(MapperError::Backend(
                        "Contains operator requires a string or array value".to_string(),
                    )),
                },
                FieldOp::AnyOf => doc! { "$in": value },
                FieldOp::NoneOf => doc! { "$nin": value },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_core::query::Filter;

    fn translate(expr: &Expr) -> Document {
        MongoQueryTranslator.visit_expr(expr).unwrap()
    }

    #[test]
    fn comparison_leaves() {
        assert_eq!(
            translate(&Filter::eq("name", "Arthur")),
            doc! { "name": { "$eq": "Arthur" } }
        );
        assert_eq!(
            translate(&Filter::gt("age", 30)),
            doc! { "age": { "$gt": 30 } }
        );
    }

    #[test]
    fn logical_nodes_nest() {
        let expr = Filter::eq("name", "Arthur").and(Filter::lt("age", 50));
        assert_eq!(
            translate(&expr),
            doc! { "$and": [
                { "name": { "$eq": "Arthur" } },
                { "age": { "$lt": 50 } },
            ] }
        );
    }

    #[test]
    fn negation_maps_to_top_level_nor() {
        let expr = Filter::eq("name", "Arthur").not();
        assert_eq!(
            translate(&expr),
            doc! { "$nor": [ { "name": { "$eq": "Arthur" } } ] }
        );
    }

    #[test]
    fn membership_maps_to_in_and_nin() {
        let candidates = Bson::Array(vec![Bson::from(1), Bson::from(2)]);
        assert_eq!(
            translate(&Filter::any_of("age", candidates.clone())),
            doc! { "age": { "$in": [1, 2] } }
        );
        assert_eq!(
            translate(&Filter::none_of("age", candidates)),
            doc! { "age": { "$nin": [1, 2] } }
        );
    }

    #[test]
    fn contains_rejects_scalar_values() {
        let err = MongoQueryTranslator
            .visit_expr(&Filter::contains("age", 7))
            .unwrap_err();
        assert!(matches!(err, MapperError::Backend(_)));
    }
}
