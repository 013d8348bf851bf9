//! A database session: one open connection and everything scoped to it.

use crate::db::connection::{ConnectionAdapter, Executed, NativeError, connection_suggestion};
use crate::db::mssql::MssqlAdapter;
use crate::db::mysql::MySqlAdapter;
use crate::db::postgres::PostgresAdapter;
use crate::db::result::{ResultCollection, ResultSet};
use crate::db::sqlite::SqliteAdapter;
use crate::db::transaction::TransactionManager;
use crate::error::{DbError, DbResult};
use crate::models::{
    CallShape, ConnectionConfig, Engine, Param, RoutineSignature, SessionOptions, Value,
};
use crate::routine::{self, RoutineCache, RoutineCall};
use tracing::{debug, info, warn};

/// Target for statement logs when `log_calls` is on.
pub const CALL_LOG_TARGET: &str = "dbentity::calls";

/// Create the adapter for `config.engine`. The connection is not opened.
pub fn create_adapter(config: ConnectionConfig) -> Box<dyn ConnectionAdapter> {
    match config.engine {
        Engine::PostgreSQL => Box::new(PostgresAdapter::new(config)),
        Engine::MySQL => Box::new(MySqlAdapter::new(config)),
        Engine::SqlServer => Box::new(MssqlAdapter::new(config)),
        Engine::SQLite => Box::new(SqliteAdapter::new(config)),
    }
}

pub struct Database {
    adapter: Box<dyn ConnectionAdapter>,
    transactions: TransactionManager,
    options: SessionOptions,
    routines: RoutineCache,
}

impl Database {
    /// Open a session for `config`.
    pub async fn connect(config: ConnectionConfig) -> DbResult<Self> {
        let options = config.options;
        Self::open(create_adapter(config), options).await
    }

    /// Open a session over an existing adapter.
    ///
    /// In unique-transaction mode the outer transaction starts here and ends
    /// in [`Database::close`].
    pub async fn open(
        mut adapter: Box<dyn ConnectionAdapter>,
        options: SessionOptions,
    ) -> DbResult<Self> {
        let engine = adapter.engine();
        if !adapter.open().await {
            let message = adapter
                .error()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| format!("Could not open {} connection", engine));
            let suggestion = connection_suggestion(engine, &message);
            return Err(DbError::connection(message, suggestion));
        }

        let mut db = Self {
            adapter,
            transactions: TransactionManager::new(options.unique_transaction),
            options,
            routines: RoutineCache::new(),
        };
        if options.unique_transaction {
            db.trans_begin().await?;
        }
        Ok(db)
    }

    pub fn engine(&self) -> Engine {
        self.adapter.engine()
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn is_open(&self) -> bool {
        self.adapter.is_open()
    }

    /// Last native error of the underlying connection.
    pub fn error(&self) -> Option<&NativeError> {
        self.adapter.error()
    }

    pub fn escape(&self, value: &Value) -> String {
        self.adapter.escape(value)
    }

    pub fn escape_identifier(&self, name: &str) -> String {
        self.adapter.escape_identifier(name)
    }

    /// Run a statement and return everything it produced.
    ///
    /// A failure inside a transaction marks the transaction dirty.
    pub async fn execute(&mut self, sql: &str, binds: &[Value]) -> DbResult<Executed> {
        self.log_statement(sql, binds);
        let result = self.adapter.execute(sql, binds).await;
        self.after_statement(sql, &result);
        result
    }

    /// Run a statement for its affected-row count.
    pub async fn execute_write(&mut self, sql: &str, binds: &[Value]) -> DbResult<u64> {
        self.log_statement(sql, binds);
        let result = self.adapter.execute_write(sql, binds).await;
        self.after_statement(sql, &result);
        Ok(result?.rows_affected)
    }

    /// Run a query and wrap its first result.
    pub async fn query(&mut self, sql: &str, binds: &[Value]) -> DbResult<ResultSet> {
        let executed = self.execute(sql, binds).await?;
        Ok(ResultSet::new(executed.into_first()))
    }

    /// Run a batch and wrap every result it produced.
    pub async fn query_all(&mut self, sql: &str, binds: &[Value]) -> DbResult<ResultCollection> {
        let executed = self.execute(sql, binds).await?;
        let sets = executed.result_sets.into_iter().map(ResultSet::new).collect();
        Ok(ResultCollection::new(sets, None))
    }

    fn log_statement(&self, sql: &str, binds: &[Value]) {
        if self.options.log_calls {
            info!(target: CALL_LOG_TARGET, sql = %sql, binds = binds.len(), "Executing statement");
        } else {
            debug!(sql = %sql, binds = binds.len(), "Executing statement");
        }
    }

    fn after_statement(&mut self, sql: &str, result: &DbResult<Executed>) {
        match result {
            Ok(done) => debug!(
                rows_affected = done.rows_affected,
                result_sets = done.result_sets.len(),
                "Statement finished"
            ),
            Err(e) => {
                self.transactions.mark_dirty();
                warn!(sql = %sql, error = %e, "Statement failed");
            }
        }
    }

    // Transactions

    pub async fn trans_begin(&mut self) -> DbResult<()> {
        self.transactions.begin(self.adapter.as_mut()).await
    }

    pub async fn trans_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.transactions.savepoint(self.adapter.as_mut(), name).await
    }

    /// Clear the dirty flag so `trans_complete` commits.
    pub fn trans_mark_clean(&mut self) {
        self.transactions.mark_clean();
    }

    pub async fn trans_rollback(&mut self, savepoint: Option<&str>) -> DbResult<()> {
        self.transactions
            .rollback(self.adapter.as_mut(), savepoint)
            .await
    }

    pub async fn trans_commit(&mut self) -> DbResult<()> {
        self.transactions.commit(self.adapter.as_mut()).await
    }

    /// Commit if clean, roll back if dirty. Returns `false` when rolled back.
    pub async fn trans_complete(&mut self) -> DbResult<bool> {
        self.transactions.complete(self.adapter.as_mut()).await
    }

    /// `false` once a statement failed in the current transaction.
    pub fn trans_status(&self) -> bool {
        self.transactions.status()
    }

    pub fn in_transaction(&self) -> bool {
        self.transactions.in_transaction()
    }

    pub fn trans_depth(&self) -> usize {
        self.transactions.depth()
    }

    // Stored routines

    /// Preload a signature so calls skip catalog introspection.
    pub fn register_routine(&mut self, signature: RoutineSignature) {
        let name = signature.qualified_name();
        self.routines.insert(&name, signature);
    }

    pub fn routine_cache(&self) -> &RoutineCache {
        &self.routines
    }

    /// Declared signature of `name`, from the cache or the catalog.
    pub async fn routine_signature(&mut self, name: &str) -> DbResult<RoutineSignature> {
        if let Some(signature) = self.routines.get(name) {
            return Ok(signature.clone());
        }
        let sql = routine::catalog::signature_query(self.engine(), name)?;
        let executed = self.execute(&sql, &[]).await?;
        let signature = routine::catalog::parse_signature(&executed.into_first())
            .ok_or_else(|| DbError::call_mismatch(name, "routine not found"))?;
        debug!(routine = %name, params = signature.params.len(), "Routine signature loaded");
        self.routines.insert(name, signature.clone());
        Ok(signature)
    }

    /// Call a routine with positional parameters.
    pub async fn execute_stored_procedure(
        &mut self,
        name: &str,
        shape: CallShape,
        params: Vec<Param>,
    ) -> DbResult<ResultCollection> {
        self.require_routines(name)?;
        let signature = self.routine_signature(name).await?;
        self.invoke(&signature, shape, params).await
    }

    /// Call a routine with parameters matched to declared names.
    ///
    /// Names are case-insensitive and a leading `@` is ignored. Every
    /// declared parameter must be supplied exactly once.
    pub async fn execute_callable(
        &mut self,
        name: &str,
        shape: CallShape,
        params: Vec<(String, Param)>,
    ) -> DbResult<ResultCollection> {
        self.require_routines(name)?;
        let signature = self.routine_signature(name).await?;

        let mut positional: Vec<Option<Param>> = vec![None; signature.params.len()];
        for (param_name, param) in params {
            let position = signature.position_of(&param_name).ok_or_else(|| {
                DbError::call_mismatch(name, format!("unknown parameter '{}'", param_name))
            })?;
            if positional[position].replace(param).is_some() {
                return Err(DbError::call_mismatch(
                    name,
                    format!("parameter '{}' supplied more than once", param_name),
                ));
            }
        }
        let params = positional
            .into_iter()
            .zip(&signature.params)
            .map(|(param, declared)| {
                param.ok_or_else(|| {
                    DbError::call_mismatch(name, format!("missing parameter '{}'", declared.name))
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        self.invoke(&signature, shape, params).await
    }

    /// Call a scalar function and return its single result.
    pub async fn execute_function(
        &mut self,
        name: &str,
        params: Vec<Param>,
    ) -> DbResult<ResultSet> {
        let collection = self
            .execute_stored_procedure(name, CallShape::Scalar, params)
            .await?;
        Ok(collection.into_first())
    }

    fn require_routines(&self, name: &str) -> DbResult<()> {
        if self.engine().supports_routines() {
            Ok(())
        } else {
            Err(DbError::call_mismatch(
                name,
                format!("{} has no stored routines", self.engine()),
            ))
        }
    }

    async fn invoke(
        &mut self,
        signature: &RoutineSignature,
        shape: CallShape,
        params: Vec<Param>,
    ) -> DbResult<ResultCollection> {
        let call = RoutineCall::bind(self.engine(), signature, shape, params)?;
        let plan = call.plan()?;
        let routine = signature.qualified_name();
        if self.options.log_calls {
            info!(target: CALL_LOG_TARGET, routine = %routine, shape = ?shape, "Calling routine");
        } else {
            debug!(routine = %routine, shape = ?shape, "Calling routine");
        }
        routine::run_plan(self, &routine, &plan, shape).await
    }

    /// End the session.
    ///
    /// The unique-mode outer transaction is completed; any other open
    /// transaction is rolled back.
    pub async fn close(mut self) -> DbResult<()> {
        let mut outcome = Ok(());
        if self.transactions.is_unique() {
            while self.in_transaction() {
                if let Err(e) = self.trans_complete().await {
                    outcome = Err(e);
                    break;
                }
            }
        } else if self.in_transaction() {
            warn!(depth = self.trans_depth(), "Closing with an open transaction; rolling back");
            while self.in_transaction() {
                if let Err(e) = self.trans_rollback(None).await {
                    outcome = Err(e);
                    break;
                }
            }
        }
        self.adapter.close().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::scripted::{ScriptedAdapter, cursor};
    use crate::models::{DeclaredParam, Direction, RoutineKind};

    async fn session(adapter: ScriptedAdapter, options: SessionOptions) -> Database {
        Database::open(Box::new(adapter), options).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_failure_is_connection_error() {
        let adapter = ScriptedAdapter::new(Engine::MySQL).refuse_open();
        let err = Database::open(Box::new(adapter), SessionOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), crate::error::OperationStatus::ConnectionError);
    }

    #[tokio::test]
    async fn test_failed_statement_marks_transaction_dirty() {
        let adapter = ScriptedAdapter::new(Engine::PostgreSQL)
            .fail("INSERT", DbError::server(Some("23502".into()), "null value"));
        let log = adapter.log();
        let mut db = session(adapter, SessionOptions::default()).await;

        db.trans_begin().await.unwrap();
        assert!(db.execute("INSERT INTO t VALUES (1)", &[]).await.is_err());
        assert!(!db.trans_status());
        assert!(!db.trans_complete().await.unwrap());
        assert_eq!(log.sql().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn test_failure_outside_transaction_leaves_status_clean() {
        let adapter = ScriptedAdapter::new(Engine::PostgreSQL).fail("SELECT", DbError::server(None, "x"));
        let mut db = session(adapter, SessionOptions::default()).await;
        assert!(db.query("SELECT 1", &[]).await.is_err());
        assert!(db.trans_status());
    }

    #[tokio::test]
    async fn test_unique_transaction_spans_session() {
        let adapter = ScriptedAdapter::new(Engine::MySQL);
        let log = adapter.log();
        let options = SessionOptions {
            log_calls: false,
            unique_transaction: true,
        };
        let mut db = session(adapter, options).await;
        assert!(db.in_transaction());

        db.trans_begin().await.unwrap();
        db.execute("UPDATE t SET a = 1", &[]).await.unwrap();
        assert!(db.trans_complete().await.unwrap());
        assert!(db.in_transaction());

        db.close().await.unwrap();
        assert_eq!(
            log.sql(),
            vec!["START TRANSACTION", "UPDATE t SET a = 1", "COMMIT"]
        );
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transaction() {
        let adapter = ScriptedAdapter::new(Engine::SQLite);
        let log = adapter.log();
        let mut db = session(adapter, SessionOptions::default()).await;
        db.trans_begin().await.unwrap();
        db.close().await.unwrap();
        assert_eq!(log.sql(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_callable_maps_names_to_positions() {
        let adapter = ScriptedAdapter::new(Engine::SqlServer)
            .respond_sets("EXEC", vec![cursor(&["total"], vec![vec![Value::Int(12)]])]);
        let log = adapter.log();
        let mut db = session(adapter, SessionOptions::default()).await;
        db.register_routine(RoutineSignature::new(
            "dbo.order_total",
            RoutineKind::Procedure,
            vec![
                DeclaredParam::new("@order_id", "int", Direction::In, 1),
                DeclaredParam::new("@total", "int", Direction::InOut, 2),
            ],
        ));

        let mut result = db
            .execute_callable(
                "dbo.order_total",
                CallShape::SingleResultSet,
                vec![
                    ("TOTAL".to_string(), Param::output()),
                    ("@order_id".to_string(), Param::input(7)),
                ],
            )
            .await
            .unwrap();

        let sql = &log.sql()[0];
        assert!(sql.contains("EXEC dbo.order_total @order_id = 7, @total = @out2 OUTPUT;"));
        assert_eq!(result.outputs().unwrap().get("total"), Some(&Value::Int(12)));
        // Output row is not a result set of its own
        assert_eq!(result.len(), 1);
        assert_eq!(result.get_mut(0).unwrap().num_rows(), 0);
    }

    #[tokio::test]
    async fn test_callable_rejects_unknown_and_missing_names() {
        let adapter = ScriptedAdapter::new(Engine::MySQL);
        let log = adapter.log();
        let mut db = session(adapter, SessionOptions::default()).await;
        db.register_routine(RoutineSignature::new(
            "p",
            RoutineKind::Procedure,
            vec![
                DeclaredParam::new("a", "int", Direction::In, 1),
                DeclaredParam::new("b", "int", Direction::In, 2),
            ],
        ));

        let unknown = db
            .execute_callable(
                "p",
                CallShape::SingleResultSet,
                vec![("c".to_string(), Param::input(1))],
            )
            .await
            .unwrap_err();
        assert!(unknown.to_string().contains("unknown parameter 'c'"));

        let missing = db
            .execute_callable(
                "p",
                CallShape::SingleResultSet,
                vec![("a".to_string(), Param::input(1))],
            )
            .await
            .unwrap_err();
        assert!(missing.to_string().contains("missing parameter 'b'"));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_has_no_routines() {
        let mut db = session(ScriptedAdapter::new(Engine::SQLite), SessionOptions::default()).await;
        let err = db.execute_function("f", vec![]).await.unwrap_err();
        assert_eq!(err.status(), crate::error::OperationStatus::CallMismatch);
    }
}
