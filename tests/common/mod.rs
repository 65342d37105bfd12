//! Common test utilities for dsql-rs integration tests.
//!
//! The statement core never talks to a real database; these tests drive it
//! against [`FakeEngine`], a deterministic in-memory compiler/executor with
//! a handful of tables and a trivial keyword-based SQL reader.
//!
//! | Table | Columns                              | Rows |
//! |-------|--------------------------------------|------|
//! | `T`   | `ID INTEGER`, `NAME VARCHAR(20)` null | 3    |
//! | `U`   | `CODE BIGINT`                        | 5    |
//!
//! Every call is recorded so tests can check that plans and implicit
//! transactions are released.

#![allow(dead_code)]

use dsql_rs::engine::{
    AttachmentId, CompiledStatement, Dialect, Engine, Execution, FetchDirection, PlanRef,
    RowSource, TransactionId,
};
use dsql_rs::{Descriptor, EngineError, Field, FieldType, StatementKind, Value};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The only attachment the fake engine accepts.
pub const ATTACHMENT: AttachmentId = AttachmentId(1);

#[derive(Clone)]
struct Table {
    descriptor: Descriptor,
    rows: Vec<Vec<Value>>,
}

struct Plan {
    kind: StatementKind,
    table: Option<String>,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    plans: HashMap<u64, Plan>,
    next_plan: u64,
    next_transaction: u64,
    active: HashSet<TransactionId>,
    rolled_back: Vec<TransactionId>,
    fail_next_execute: bool,
}

/// Deterministic in-memory engine.
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let mut state = State {
            next_plan: 1,
            next_transaction: 100,
            ..State::default()
        };
        state.tables.insert(
            "T".to_string(),
            Table {
                descriptor: t_descriptor(),
                rows: vec![
                    vec![Value::Integer(1), Value::Text("alpha".into())],
                    vec![Value::Integer(2), Value::Null],
                    vec![Value::Integer(3), Value::Text("gamma".into())],
                ],
            },
        );
        state.tables.insert(
            "U".to_string(),
            Table {
                descriptor: Descriptor::new(vec![Field::new(FieldType::BigInt)
                    .with_name("CODE")
                    .with_relation("U")]),
                rows: (1..=5).map(|i| vec![Value::BigInt(i * 1000)]).collect(),
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a table with a single `INTEGER` column holding `0..rows`.
    pub fn with_numbers(self, name: &str, rows: usize) -> Self {
        self.state.lock().tables.insert(
            name.to_string(),
            Table {
                descriptor: Descriptor::new(vec![Field::new(FieldType::Integer).with_name("N")]),
                rows: (0..rows).map(|i| vec![Value::Integer(i as i32)]).collect(),
            },
        );
        self
    }

    /// Make the next execute fail with an execution error.
    pub fn fail_next_execute(&self) {
        self.state.lock().fail_next_execute = true;
    }

    /// Transaction ids this engine has started and not yet ended.
    pub fn active_transactions(&self) -> Vec<TransactionId> {
        self.state.lock().active.iter().copied().collect()
    }

    pub fn rolled_back(&self) -> Vec<TransactionId> {
        self.state.lock().rolled_back.clone()
    }

    /// Number of compiled plans not yet released.
    pub fn live_plans(&self) -> usize {
        self.state.lock().plans.len()
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.state.lock().tables.get(table).map(|t| t.rows.len())
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().tables.contains_key(table)
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor of table `T`.
pub fn t_descriptor() -> Descriptor {
    Descriptor::new(vec![
        Field::new(FieldType::Integer)
            .with_name("ID")
            .with_relation("T"),
        Field::new(FieldType::VarChar { max_length: 20 })
            .nullable(true)
            .with_name("NAME")
            .with_relation("T"),
    ])
}

/// Word following `keyword` in upper-cased SQL, without punctuation.
fn word_after(sql: &str, keyword: &str) -> Option<String> {
    let mut words = sql.split_whitespace();
    words.find(|w| *w == keyword)?;
    let word = words.next()?;
    let name: String = word
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

impl Engine for FakeEngine {
    fn attachment_valid(&self, attachment: AttachmentId) -> bool {
        attachment == ATTACHMENT
    }

    fn compile(
        &self,
        _attachment: AttachmentId,
        _transaction: Option<TransactionId>,
        _dialect: Dialect,
        sql: &str,
    ) -> Result<CompiledStatement, EngineError> {
        let kind = StatementKind::from_sql(sql);
        let upper = sql.to_uppercase();
        let mut state = self.state.lock();

        let (table, input, output) = match kind {
            StatementKind::Select | StatementKind::SelectForUpdate => {
                let name = word_after(&upper, "FROM").ok_or_else(|| EngineError::Parse {
                    position: upper.len(),
                    message: "Expected table name".to_string(),
                })?;
                let table = state
                    .tables
                    .get(&name)
                    .ok_or_else(|| EngineError::Plan(format!("Table unknown: {}", name)))?;
                let output = table.descriptor.clone();
                (Some(name), Descriptor::empty(), Some(output))
            }
            StatementKind::Insert => {
                let name = word_after(&upper, "INTO").ok_or_else(|| EngineError::Parse {
                    position: upper.len(),
                    message: "Expected table name".to_string(),
                })?;
                let table = state
                    .tables
                    .get(&name)
                    .ok_or_else(|| EngineError::Plan(format!("Table unknown: {}", name)))?;
                let input = table.descriptor.clone();
                (Some(name), input, None)
            }
            StatementKind::Delete => {
                let name = word_after(&upper, "FROM").ok_or_else(|| EngineError::Parse {
                    position: upper.len(),
                    message: "Expected table name".to_string(),
                })?;
                if !state.tables.contains_key(&name) {
                    return Err(EngineError::Plan(format!("Table unknown: {}", name)));
                }
                (Some(name), Descriptor::empty(), None)
            }
            StatementKind::Ddl => {
                let name = word_after(&upper, "TABLE").ok_or_else(|| EngineError::Parse {
                    position: upper.len(),
                    message: "Expected table name".to_string(),
                })?;
                (Some(name), Descriptor::empty(), None)
            }
            StatementKind::StartTransaction | StatementKind::Commit | StatementKind::Rollback => {
                (None, Descriptor::empty(), None)
            }
            _ => {
                return Err(EngineError::Parse {
                    position: 1,
                    message: format!("Token unknown: {}", upper.split_whitespace().next().unwrap_or("")),
                })
            }
        };

        let plan = state.next_plan;
        state.next_plan += 1;
        state.plans.insert(
            plan,
            Plan {
                kind,
                table: table.clone(),
            },
        );

        Ok(CompiledStatement {
            plan: PlanRef(plan),
            kind,
            input,
            output,
            scrollable: kind.is_row_producing(),
            plan_text: table.map(|t| format!("PLAN ({} NATURAL)", t)),
        })
    }

    fn execute(
        &self,
        _attachment: AttachmentId,
        transaction: Option<TransactionId>,
        plan: PlanRef,
        inputs: &[Value],
    ) -> Result<Execution, EngineError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_execute) {
            return Err(EngineError::Execution("Injected failure".to_string()));
        }
        let (kind, table) = {
            let plan = state
                .plans
                .get(&plan.0)
                .ok_or_else(|| EngineError::Execution(format!("Plan {} released", plan.0)))?;
            (plan.kind, plan.table.clone())
        };

        match kind {
            StatementKind::Select | StatementKind::SelectForUpdate => {
                let name = table.unwrap_or_default();
                let rows = state
                    .tables
                    .get(&name)
                    .map(|t| t.rows.clone())
                    .ok_or_else(|| EngineError::Execution(format!("Table dropped: {}", name)))?;
                Ok(Execution::Rows(Box::new(VecRowSource::new(rows))))
            }
            StatementKind::Insert => {
                let name = table.unwrap_or_default();
                let target = state
                    .tables
                    .get_mut(&name)
                    .ok_or_else(|| EngineError::Execution(format!("Table dropped: {}", name)))?;
                target.rows.push(inputs.to_vec());
                Ok(Execution::Affected(1))
            }
            StatementKind::Delete => {
                let name = table.unwrap_or_default();
                let count = state
                    .tables
                    .get_mut(&name)
                    .map(|t| std::mem::take(&mut t.rows).len())
                    .unwrap_or(0);
                Ok(Execution::Affected(count as u64))
            }
            StatementKind::Ddl => {
                let name = table.unwrap_or_default();
                if state.tables.contains_key(&name) {
                    return Err(EngineError::Execution(format!(
                        "Table {} already exists",
                        name
                    )));
                }
                state.tables.insert(
                    name,
                    Table {
                        descriptor: Descriptor::new(vec![
                            Field::new(FieldType::Integer).with_name("ID")
                        ]),
                        rows: Vec::new(),
                    },
                );
                Ok(Execution::Affected(0))
            }
            StatementKind::StartTransaction => {
                let id = TransactionId(state.next_transaction);
                state.next_transaction += 1;
                state.active.insert(id);
                Ok(Execution::TransactionStarted(id))
            }
            StatementKind::Commit | StatementKind::Rollback => {
                let id = transaction
                    .ok_or_else(|| EngineError::Transaction("No transaction to end".to_string()))?;
                state.active.remove(&id);
                Ok(Execution::TransactionEnded(id))
            }
            _ => Ok(Execution::Affected(0)),
        }
    }

    fn start_transaction(&self, _attachment: AttachmentId) -> Result<TransactionId, EngineError> {
        let mut state = self.state.lock();
        let id = TransactionId(state.next_transaction);
        state.next_transaction += 1;
        state.active.insert(id);
        Ok(id)
    }

    fn rollback_transaction(&self, transaction: TransactionId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.active.remove(&transaction) {
            return Err(EngineError::Transaction(format!(
                "Transaction {} is not active",
                transaction.0
            )));
        }
        state.rolled_back.push(transaction);
        Ok(())
    }

    fn release_plan(&self, plan: PlanRef) {
        self.state.lock().plans.remove(&plan.0);
    }
}

/// Scrollable row stream over a snapshot of a table.
pub struct VecRowSource {
    rows: Vec<Vec<Value>>,
    /// 0 is before the first row, `len + 1` after the last
    position: i64,
}

impl VecRowSource {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self { rows, position: 0 }
    }
}

impl RowSource for VecRowSource {
    fn fetch(&mut self, direction: FetchDirection) -> Result<Option<Vec<Value>>, EngineError> {
        let len = self.rows.len() as i64;
        let target = match direction {
            FetchDirection::Next => self.position + 1,
            FetchDirection::Prior => self.position - 1,
            FetchDirection::First => 1,
            FetchDirection::Last => len,
            FetchDirection::Absolute(n) if n >= 0 => n,
            FetchDirection::Absolute(n) => len + 1 + n,
            FetchDirection::Relative(n) => self.position + n,
        };
        if (1..=len).contains(&target) {
            self.position = target;
            Ok(Some(self.rows[(target - 1) as usize].clone()))
        } else {
            self.position = if target < 1 { 0 } else { len + 1 };
            Ok(None)
        }
    }

    fn position(&self) -> Option<u64> {
        (1..=self.rows.len() as i64)
            .contains(&self.position)
            .then_some(self.position as u64)
    }
}
