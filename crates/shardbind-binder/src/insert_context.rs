//! INSERT statement context
//!
//! Values are matched to columns by position. Every VALUES row routes on its
//! own, so each row contributes one AND group of `Equal` conditions built
//! straight from its sharding column values.
//!
//! When an explicit column list leaves out the generated key column, a key
//! is generated per row at binding time and appended to every row. Keys are
//! only drawn once every parameter is bound, so preparing a statement never
//! consumes any.

use crate::column_scope::{ColumnScope, ScopeTable};
use crate::condition::{AndCondition, Condition, OrCondition};
use crate::expression_binder::{bind_expression, parameter_indexes};
use crate::select_context::{QueryLevel, SelectBase, SelectBinding, SelectStatementContext};
use crate::statement_binder::StatementBinder;
use crate::subquery::SubqueryType;
use crate::tables_context::{object_name_parts, simple_table, SimpleTable, TablesContext};
use crate::token::SqlToken;
use crate::{BoundExpression, ColumnAssignment, ColumnRef};
use shardbind_common::{Error, Result, Value};
use shardbind_rule::ShardingRule;
use sqlparser::ast as sql;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// The generated key column of the target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKeyColumn {
    pub name: String,
    /// Position among the insert columns, `None` when the statement leaves it out
    pub position: Option<usize>,
}

/// One VALUES row as written
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub values: Vec<BoundExpression>,
    /// Parameter indexes the row consumes, in text order
    pub parameter_indexes: Vec<usize>,
}

/// Parameter-independent part of an insert
#[derive(Debug, Clone)]
pub struct InsertBase {
    pub table: SimpleTable,
    pub tables: TablesContext,
    /// Columns written in the statement
    pub insert_columns: Vec<String>,
    /// Columns the values line up with: the written ones, or the visible
    /// columns of the table when none are written
    pub columns: Vec<String>,
    pub generated_key: Option<GeneratedKeyColumn>,
    pub rows: Vec<InsertRow>,
    /// Positions in `columns` holding sharding columns
    pub sharding_positions: Vec<usize>,
    pub on_duplicate: Vec<ColumnAssignment>,
    pub on_duplicate_parameter_indexes: Vec<usize>,
    pub insert_select: Option<Arc<SelectBase>>,
    pub tokens: Vec<SqlToken>,
    pub parameter_count: usize,
}

impl InsertBase {
    /// Whether keys are generated because the column list leaves the key out
    pub fn generates_key(&self) -> bool {
        !self.insert_columns.is_empty()
            && self
                .generated_key
                .as_ref()
                .is_some_and(|key| key.position.is_none())
    }

    fn column_ref(&self, column: &str) -> ColumnRef {
        ColumnRef::new(column, None, Some(self.table.name.clone()))
    }
}

/// Values of one row once parameters are known
#[derive(Debug, Clone, PartialEq)]
pub struct InsertValueContext {
    /// Row values, with a generated key appended when one was generated
    pub values: Vec<BoundExpression>,
    /// The row's own parameters, in the order it consumes them
    pub parameters: Vec<Value>,
    pub parameter_indexes: Vec<usize>,
    /// Index of the row's first parameter in the statement's parameter list
    pub parameter_offset: usize,
}

impl InsertValueContext {
    pub fn parameter_count(&self) -> usize {
        self.parameter_indexes.len()
    }

    /// The value at `index`: a literal, or the bound parameter it names
    pub fn literal_value(&self, index: usize) -> Option<Value> {
        match self.values.get(index)? {
            BoundExpression::Literal(value) => Some(value.clone()),
            BoundExpression::Parameter(parameter) => {
                let position = self.parameter_indexes.iter().position(|p| p == parameter)?;
                self.parameters.get(position).cloned()
            }
            _ => None,
        }
    }
}

/// Keys generated for a column the statement left out
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKeyContext {
    pub column: String,
    /// One per row
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnDuplicateUpdateContext {
    pub assignments: Vec<ColumnAssignment>,
    pub parameters: Vec<Value>,
    pub parameter_offset: usize,
}

/// Parameter-dependent part of an insert
#[derive(Debug, Clone)]
pub struct InsertBinding {
    pub parameters: Vec<Value>,
    pub value_contexts: Vec<InsertValueContext>,
    pub generated_key: Option<GeneratedKeyContext>,
    pub sharding_conditions: OrCondition,
    pub on_duplicate: Option<OnDuplicateUpdateContext>,
    pub insert_select: Option<Arc<SelectBinding>>,
}

impl InsertBinding {
    fn new(base: &InsertBase, parameters: &[Value], rule: &dyn ShardingRule) -> Result<Self> {
        let complete = parameters.len() >= base.parameter_count;
        let generated_key = if base.generates_key() && complete {
            match &base.generated_key {
                Some(key) => {
                    let values = base
                        .rows
                        .iter()
                        .map(|_| rule.generate_id(&base.table.name, &key.name))
                        .collect::<Result<Vec<_>>>()?;
                    Some(GeneratedKeyContext {
                        column: key.name.clone(),
                        values,
                    })
                }
                None => None,
            }
        } else {
            None
        };

        let mut value_contexts = Vec::with_capacity(base.rows.len());
        let mut offset = 0;
        for (i, row) in base.rows.iter().enumerate() {
            let mut values = row.values.clone();
            if let Some(generated) = &generated_key {
                if let Some(value) = generated.values.get(i) {
                    values.push(BoundExpression::Literal(value.clone()));
                }
            }
            let parameter_offset = row.parameter_indexes.first().copied().unwrap_or(offset);
            offset = parameter_offset + row.parameter_indexes.len();
            value_contexts.push(InsertValueContext {
                values,
                parameters: grouped_parameters(&row.parameter_indexes, parameters)?,
                parameter_indexes: row.parameter_indexes.clone(),
                parameter_offset,
            });
        }

        let insert_select = match &base.insert_select {
            Some(select) => Some(Arc::new(SelectBinding::new(select, parameters)?)),
            None => None,
        };

        let sharding_conditions = match &base.insert_select {
            Some(select) => select.sharding_conditions.clone(),
            None => row_conditions(base, &value_contexts, generated_key.as_ref(), parameters, rule)?,
        };

        let on_duplicate = if base.on_duplicate.is_empty() {
            None
        } else {
            Some(OnDuplicateUpdateContext {
                assignments: base.on_duplicate.clone(),
                parameters: grouped_parameters(&base.on_duplicate_parameter_indexes, parameters)?,
                parameter_offset: base
                    .on_duplicate_parameter_indexes
                    .first()
                    .copied()
                    .unwrap_or(offset),
            })
        };

        Ok(InsertBinding {
            parameters: parameters.to_vec(),
            value_contexts,
            generated_key,
            sharding_conditions,
            on_duplicate,
            insert_select,
        })
    }
}

fn grouped_parameters(indexes: &[usize], parameters: &[Value]) -> Result<Vec<Value>> {
    if parameters.is_empty() {
        return Ok(Vec::new());
    }
    indexes
        .iter()
        .map(|index| {
            parameters.get(*index).cloned().ok_or(Error::ParameterOutOfRange {
                index: *index,
                count: parameters.len(),
            })
        })
        .collect()
}

/// One AND group per row from its sharding column values
fn row_conditions(
    base: &InsertBase,
    value_contexts: &[InsertValueContext],
    generated_key: Option<&GeneratedKeyContext>,
    parameters: &[Value],
    rule: &dyn ShardingRule,
) -> Result<OrCondition> {
    let key_is_sharding = generated_key
        .is_some_and(|key| rule.is_sharding_column(&key.column, &base.table.name));
    let mut groups = Vec::with_capacity(value_contexts.len());
    for (row, context) in value_contexts.iter().enumerate() {
        let mut conditions = Vec::new();
        for position in &base.sharding_positions {
            let column = &base.columns[*position];
            let value = &context.values[*position];
            if let BoundExpression::Parameter(index) = value {
                if parameters.get(*index).is_some_and(|v| matches!(v, Value::Null)) {
                    return Err(Error::UnsupportedExpression(format!(
                        "sharding column {} can't be NULL (row {})",
                        column,
                        row + 1
                    )));
                }
            }
            conditions.push(Condition::Equal {
                column: base.column_ref(column),
                value: value.clone(),
            });
        }
        if let (true, Some(key)) = (key_is_sharding, generated_key) {
            if let Some(value) = key.values.get(row) {
                conditions.push(Condition::Equal {
                    column: base.column_ref(&key.column),
                    value: BoundExpression::Literal(value.clone()),
                });
            }
        }
        if !conditions.is_empty() {
            groups.push(AndCondition::new(conditions));
        }
    }
    Ok(OrCondition::new(groups))
}

/// Hands out keys for rebinding
#[derive(Clone)]
struct KeySource(Arc<dyn ShardingRule>);

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySource")
    }
}

#[derive(Debug, Clone)]
pub struct InsertStatementContext {
    base: Arc<InsertBase>,
    binding: Arc<InsertBinding>,
    keys: KeySource,
}

impl InsertStatementContext {
    pub(crate) fn new(base: InsertBase, rule: Arc<dyn ShardingRule>) -> Result<Self> {
        let binding = InsertBinding::new(&base, &[], rule.as_ref())?;
        Ok(InsertStatementContext {
            base: Arc::new(base),
            binding: Arc::new(binding),
            keys: KeySource(rule),
        })
    }

    pub fn base(&self) -> &InsertBase {
        &self.base
    }

    pub fn binding(&self) -> &InsertBinding {
        &self.binding
    }

    pub fn table(&self) -> &SimpleTable {
        &self.base.table
    }

    pub fn tables(&self) -> &TablesContext {
        &self.base.tables
    }

    pub fn contains_insert_columns(&self) -> bool {
        !self.base.insert_columns.is_empty()
    }

    pub fn insert_column_names(&self) -> &[String] {
        &self.base.insert_columns
    }

    /// Columns every value context lines up with, generated key included
    pub fn column_names(&self) -> Vec<String> {
        let mut columns = self.base.columns.clone();
        if let (true, Some(key)) = (self.base.generates_key(), &self.base.generated_key) {
            columns.push(key.name.clone());
        }
        columns
    }

    pub fn value_list_count(&self) -> usize {
        self.base.rows.len()
    }

    pub fn value_contexts(&self) -> &[InsertValueContext] {
        &self.binding.value_contexts
    }

    pub fn generated_key_column(&self) -> Option<&GeneratedKeyColumn> {
        self.base.generated_key.as_ref()
    }

    pub fn generated_key_context(&self) -> Option<&GeneratedKeyContext> {
        self.binding.generated_key.as_ref()
    }

    pub fn sharding_conditions(&self) -> &OrCondition {
        &self.binding.sharding_conditions
    }

    pub fn on_duplicate_update(&self) -> Option<&OnDuplicateUpdateContext> {
        self.binding.on_duplicate.as_ref()
    }

    pub fn insert_select(&self) -> Option<SelectStatementContext> {
        let base = self.base.insert_select.as_ref()?;
        let binding = self.binding.insert_select.as_ref()?;
        Some(SelectStatementContext::from_parts(base.clone(), binding.clone()))
    }

    pub fn tokens(&self) -> &[SqlToken] {
        &self.base.tokens
    }

    pub fn parameters(&self) -> &[Value] {
        &self.binding.parameters
    }

    /// Rebind against new parameters; an empty list keeps the current binding
    pub fn bind(&self, parameters: &[Value]) -> Result<Self> {
        if parameters.is_empty() {
            return Ok(self.clone());
        }
        if parameters.len() < self.base.parameter_count {
            return Err(Error::ParameterOutOfRange {
                index: self.base.parameter_count - 1,
                count: parameters.len(),
            });
        }
        let binding = InsertBinding::new(&self.base, parameters, self.keys.0.as_ref())?;
        Ok(InsertStatementContext {
            base: self.base.clone(),
            binding: Arc::new(binding),
            keys: self.keys.clone(),
        })
    }
}

impl StatementBinder<'_> {
    pub(crate) fn build_insert(&self, insert: &sql::Insert) -> Result<InsertBase> {
        // INSERT ... SET and DEFAULT VALUES carry no source query
        if insert.source.is_none() {
            return Err(Error::NotImplemented(format!(
                "INSERT into {} without VALUES or SELECT",
                insert.table_name
            )));
        }
        let mut table = simple_table(&insert.table_name, None, &self.source);
        table.alias = insert.table_alias.as_ref().map(|a| a.value.clone());
        let rule = self.binder.rule();

        let insert_columns: Vec<String> = insert.columns.iter().map(|c| c.value.clone()).collect();
        let columns = if insert_columns.is_empty() {
            match self.binder.required_table_metadata(&table)? {
                Some(metadata) => metadata.visible_column_names(),
                None => {
                    warn!(table = %table.name, "no metadata for INSERT without a column list");
                    Vec::new()
                }
            }
        } else {
            insert_columns.clone()
        };
        let generated_key = match rule.generated_key_column(&table.name) {
            Some(name) if !columns.is_empty() => Some(GeneratedKeyColumn {
                position: columns.iter().position(|c| c.eq_ignore_ascii_case(&name)),
                name,
            }),
            _ => None,
        };
        let sharding_positions: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| rule.is_sharding_column(c, &table.name))
            .map(|(i, _)| i)
            .collect();

        let scope = ColumnScope::new(vec![ScopeTable::physical(table.clone(), None)]);
        let mut rows = Vec::new();
        let mut insert_select = None;
        if let Some(source) = &insert.source {
            match source.body.as_ref() {
                sql::SetExpr::Values(values) => {
                    for (i, row) in values.rows.iter().enumerate() {
                        rows.push(self.build_row(i, row, &columns, &sharding_positions, &scope)?);
                    }
                }
                _ => {
                    let outer = ColumnScope::default();
                    let level = QueryLevel {
                        depth: 1,
                        subquery_type: Some(SubqueryType::InsertSelect),
                        ..QueryLevel::root(&outer)
                    };
                    insert_select = Some(Arc::new(self.build_query(source, level)?));
                }
            }
        }

        let mut on_duplicate = Vec::new();
        let mut on_duplicate_parameter_indexes = Vec::new();
        if let Some(sql::OnInsert::DuplicateKeyUpdate(assignments)) = &insert.on {
            for assignment in assignments {
                let column = match &assignment.target {
                    sql::AssignmentTarget::ColumnName(name) => object_name_parts(name).1,
                    sql::AssignmentTarget::Tuple(_) => {
                        return Err(Error::NotImplemented(format!(
                            "tuple assignment in ON DUPLICATE KEY UPDATE: {}",
                            assignment
                        )))
                    }
                };
                on_duplicate_parameter_indexes.extend(parameter_indexes(&assignment.value));
                on_duplicate.push(ColumnAssignment {
                    column: ColumnRef::new(column, None, Some(table.name.clone())),
                    value: bind_expression(&assignment.value, &scope, &self.source),
                });
            }
        }

        let select_tables = insert_select
            .as_ref()
            .map(|select| select.tables.tables().to_vec())
            .unwrap_or_default();
        Ok(InsertBase {
            tables: TablesContext::new(std::iter::once(table.clone()).chain(select_tables)),
            table,
            insert_columns,
            columns,
            generated_key,
            rows,
            sharding_positions,
            on_duplicate,
            on_duplicate_parameter_indexes,
            insert_select,
            tokens: Vec::new(),
            parameter_count: 0,
        })
    }

    fn build_row(
        &self,
        index: usize,
        row: &[sql::Expr],
        columns: &[String],
        sharding_positions: &[usize],
        scope: &ColumnScope,
    ) -> Result<InsertRow> {
        if !columns.is_empty() && row.len() != columns.len() {
            return Err(Error::InsertValueCountMismatch {
                row: index + 1,
                expected: columns.len(),
                actual: row.len(),
            });
        }
        let values: Vec<BoundExpression> = row
            .iter()
            .map(|e| bind_expression(e, scope, &self.source))
            .collect();
        for position in sharding_positions {
            match &values[*position] {
                BoundExpression::Literal(Value::Null) => {
                    return Err(Error::UnsupportedExpression(format!(
                        "sharding column {} can't be NULL (row {})",
                        columns[*position],
                        index + 1
                    )))
                }
                BoundExpression::Literal(_) | BoundExpression::Parameter(_) => {}
                other => {
                    return Err(Error::UnsupportedExpression(format!(
                        "sharding column {} must be a literal or parameter, got {}",
                        columns[*position], other
                    )))
                }
            }
        }
        let mut parameter_indexes_of_row = Vec::new();
        for expr in row {
            parameter_indexes_of_row.extend(parameter_indexes(expr));
        }
        Ok(InsertRow {
            values,
            parameter_indexes: parameter_indexes_of_row,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bind, catalog, DATABASE};
    use crate::Binder;
    use shardbind_parser::{parse_statement, DatabaseType};
    use shardbind_rule::{KeyGenerateStrategy, KeyGeneratorConfig, ShardingRuleConfig, ShardingRuleSet};

    fn insert(sql: &str) -> InsertStatementContext {
        bind(sql).unwrap().as_insert().unwrap().clone()
    }

    #[test]
    fn test_insert_set_is_rejected() {
        assert!(matches!(
            bind("INSERT INTO t_order SET user_id = 1, status = 'a'"),
            Err(Error::NotImplemented(_)) | Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_value_count_mismatch() {
        match bind("INSERT INTO t_order (user_id, status) VALUES (1, 'a'), (2)") {
            Err(Error::InsertValueCountMismatch {
                row,
                expected,
                actual,
            }) => {
                assert_eq!(row, 2);
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_sharding_value_must_be_simple() {
        assert!(matches!(
            bind("INSERT INTO t_order (user_id, status) VALUES (NULL, 'a')"),
            Err(Error::UnsupportedExpression(_))
        ));
        assert!(matches!(
            bind("INSERT INTO t_order (user_id, status) VALUES (1 + 1, 'a')"),
            Err(Error::UnsupportedExpression(_))
        ));
        // non-sharding columns take anything
        assert!(bind("INSERT INTO t_order (user_id, status) VALUES (1, UPPER('a'))").is_ok());
    }

    #[test]
    fn test_rows_group_their_parameters() {
        let context = insert("INSERT INTO t_order (user_id, status) VALUES (?, ?), (?, ?)");
        assert_eq!(context.value_list_count(), 2);
        let rows = context.value_contexts();
        assert_eq!(rows[0].parameter_offset, 0);
        assert_eq!(rows[1].parameter_offset, 2);
        assert_eq!(rows[1].parameter_indexes, vec![2, 3]);
        assert_eq!(rows[1].literal_value(0), None);
        assert_eq!(
            context.sharding_conditions().to_string(),
            "[[Equal(user_id@t_order, $1)], [Equal(user_id@t_order, $3)]]"
        );
        // no keys until the parameters are known
        assert!(context.generated_key_context().is_none());
        assert_eq!(rows[1].values.len(), 2);

        let parameters = [
            Value::Integer(1),
            Value::Varchar("a".to_string()),
            Value::Integer(3),
            Value::Varchar("b".to_string()),
        ];
        let bound = context.bind(&parameters).unwrap();
        let rows = bound.value_contexts();
        assert_eq!(rows[1].parameters, vec![Value::Integer(3), Value::Varchar("b".to_string())]);
        assert_eq!(rows[1].literal_value(0), Some(Value::Integer(3)));
        assert_eq!(rows[1].literal_value(2), Some(Value::BigInt(2)));
        assert_eq!(
            bound.generated_key_context().unwrap().values,
            vec![Value::BigInt(1), Value::BigInt(2)]
        );
        assert!(context.generated_key_context().is_none());
    }

    #[test]
    fn test_prepared_inserts_draw_keys_without_gaps() {
        let context = insert("INSERT INTO t_order (user_id, status) VALUES (?, ?)");
        let mut keys = Vec::new();
        for user in 1..=3 {
            let bound = context
                .bind(&[Value::Integer(user), Value::Varchar("a".to_string())])
                .unwrap();
            keys.extend(bound.generated_key_context().unwrap().values.clone());
        }
        assert_eq!(keys, vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]);

        // a literal insert is complete at prepare time
        let literal = insert("INSERT INTO t_order (user_id, status) VALUES (9, 'z')");
        assert_eq!(
            literal.generated_key_context().unwrap().values,
            vec![Value::BigInt(1)]
        );
    }

    #[test]
    fn test_null_sharding_parameter() {
        let context = insert("INSERT INTO t_order (user_id, status) VALUES (?, ?)");
        let result = context.bind(&[Value::Null, Value::Varchar("a".to_string())]);
        assert!(matches!(result, Err(Error::UnsupportedExpression(_))));
    }

    #[test]
    fn test_on_duplicate_key_update() {
        let context = insert(
            "INSERT INTO t_order (order_id, user_id, status) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE status = ?",
        );
        assert_eq!(
            context.generated_key_column(),
            Some(&GeneratedKeyColumn {
                name: "order_id".to_string(),
                position: Some(0),
            })
        );
        assert!(context.generated_key_context().is_none());

        let update = context.on_duplicate_update().unwrap();
        assert_eq!(update.assignments.len(), 1);
        assert_eq!(update.parameter_offset, 3);

        let parameters = [
            Value::Integer(10),
            Value::Integer(1),
            Value::Varchar("a".to_string()),
            Value::Varchar("b".to_string()),
        ];
        let bound = context.bind(&parameters).unwrap();
        assert_eq!(
            bound.on_duplicate_update().unwrap().parameters,
            vec![Value::Varchar("b".to_string())]
        );
    }

    #[test]
    fn test_insert_select() {
        let context = insert(
            "INSERT INTO t_order (user_id, status) \
             SELECT user_id, 'copied' FROM t_order_item WHERE user_id = 9",
        );
        assert_eq!(context.value_list_count(), 0);
        assert_eq!(context.tables().table_names(), vec!["t_order", "t_order_item"]);
        let select = context.insert_select().unwrap();
        assert_eq!(select.subquery_type(), Some(SubqueryType::InsertSelect));
        assert_eq!(context.sharding_conditions(), select.sharding_conditions());
        assert_eq!(
            context.sharding_conditions().to_string(),
            "[[Equal(user_id@t_order_item, 9)]]"
        );
    }

    #[test]
    fn test_generated_sharding_key_adds_condition() {
        let config = ShardingRuleConfig::default().with_table(
            "t_order",
            &["order_id"],
            Some(KeyGeneratorConfig::new("order_id", KeyGenerateStrategy::Sequence)),
        );
        let rule: Arc<dyn ShardingRule> = Arc::new(ShardingRuleSet::new(&config).unwrap());
        let binder = Binder::new(catalog(), rule).with_database(DATABASE);
        let parsed = parse_statement(
            "INSERT INTO t_order (user_id, status) VALUES (1, 'a'), (2, 'b')",
            DatabaseType::MySql,
        )
        .unwrap();
        let context = binder.bind(&parsed).unwrap();
        assert_eq!(
            context.sharding_conditions().to_string(),
            "[[Equal(order_id@t_order, 1)], [Equal(order_id@t_order, 2)]]"
        );
    }
}
