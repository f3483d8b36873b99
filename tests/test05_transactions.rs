use std::sync::Arc;

use sqlite_dual::prelude::*;

fn backends() -> Vec<BackendType> {
    let mut backends = Vec::new();
    if cfg!(feature = "sqlite") {
        backends.push(BackendType::Native);
    }
    if cfg!(feature = "turso") {
        backends.push(BackendType::Portable);
    }
    backends
}

async fn open(backend: BackendType, options: DatabaseOptions) -> Result<Database, SqliteDualError> {
    let registry = BackendRegistry::new();
    let mut db = Database::open(&registry, options.with_backend(backend)).await?;
    db.exec_sql("CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)")?;
    Ok(db)
}

fn ids(db: &mut Database) -> Result<Vec<i64>, SqliteDualError> {
    let rows = db.query("SELECT id FROM ledger ORDER BY id", ())?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("id").and_then(RowValues::as_int).copied())
        .collect())
}

fn insert(db: &mut Database, id: i64) -> Result<usize, SqliteDualError> {
    db.run(
        "INSERT INTO ledger (id, amount) VALUES (?, ?)",
        vec![RowValues::Int(id), RowValues::Int(id * 100)],
    )
}

#[tokio::test]
async fn nested_transactions_commit_together() -> Result<(), Box<dyn std::error::Error>> {
    for backend in backends() {
        let mut db = open(backend, DatabaseOptions::default()).await?;

        let depths = db.transaction(|db| -> Result<Vec<usize>, SqliteDualError> {
            insert(db, 1)?;
            let outer = db.transaction_depth();
            let inner = db.transaction(|db| {
                insert(db, 2)?;
                Ok::<_, SqliteDualError>(db.transaction_depth())
            })?;
            Ok(vec![outer, inner])
        })?;

        assert_eq!(depths, vec![1, 2]);
        assert_eq!(db.transaction_depth(), 0);
        assert_eq!(ids(&mut db)?, vec![1, 2], "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn failed_outer_transaction_rolls_back_everything() -> Result<(), Box<dyn std::error::Error>> {
    for backend in backends() {
        let mut db = open(backend, DatabaseOptions::default()).await?;
        insert(&mut db, 1)?;

        let result: Result<(), SqliteDualError> = db.transaction(|db| {
            insert(db, 2)?;
            db.transaction(|db| insert(db, 3).map(|_| ()))?;
            insert(db, 1).map(|_| ())
        });

        assert!(result.unwrap_err().is_constraint_violation());
        assert_eq!(db.transaction_depth(), 0);
        assert_eq!(ids(&mut db)?, vec![1], "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn inner_failure_caught_by_outer_keeps_outer_work() -> Result<(), Box<dyn std::error::Error>> {
    for backend in backends() {
        let mut db = open(backend, DatabaseOptions::default()).await?;

        db.transaction(|db| -> Result<(), SqliteDualError> {
            insert(db, 10)?;
            let inner: Result<(), SqliteDualError> = db.transaction(|db| {
                insert(db, 11)?;
                // Collides with the outer insert.
                insert(db, 10).map(|_| ())
            });
            assert!(inner.unwrap_err().is_constraint_violation());
            assert_eq!(db.transaction_depth(), 1);
            insert(db, 12)?;
            Ok(())
        })?;

        assert_eq!(ids(&mut db)?, vec![10, 12], "{backend}");
    }
    Ok(())
}

#[derive(Debug)]
enum AppError {
    Db(SqliteDualError),
    Rejected(&'static str),
}

impl From<SqliteDualError> for AppError {
    fn from(err: SqliteDualError) -> Self {
        AppError::Db(err)
    }
}

#[tokio::test]
async fn caller_errors_pass_through_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    for backend in backends() {
        let mut db = open(backend, DatabaseOptions::default()).await?;

        let result: Result<(), AppError> = db.transaction(|db| {
            insert(db, 5)?;
            Err(AppError::Rejected("business rule"))
        });

        assert!(matches!(result, Err(AppError::Rejected("business rule"))));
        assert!(ids(&mut db)?.is_empty(), "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn savepoint_names_stay_unique_across_transactions() -> Result<(), Box<dyn std::error::Error>> {
    for backend in backends() {
        let mut db = open(backend, DatabaseOptions::default()).await?;

        for round in 0..3 {
            db.transaction(|db| {
                db.transaction(|db| insert(db, round * 2))?;
                db.transaction(|db| insert(db, round * 2 + 1))
            })?;
        }
        assert_eq!(ids(&mut db)?, (0..6).collect::<Vec<_>>(), "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn bulk_insert_inside_transaction_uses_a_savepoint() -> Result<(), Box<dyn std::error::Error>> {
    for backend in backends() {
        let mut db = open(backend, DatabaseOptions::default()).await?;
        let rows: Vec<Vec<RowValues>> = (1..=3)
            .map(|i| vec![RowValues::Int(i), RowValues::Int(i)])
            .collect();

        let result: Result<(), SqliteDualError> = db.transaction(|db| {
            db.bulk_insert("INSERT INTO ledger (id, amount) VALUES (?, ?)", &rows)?;
            Err(SqliteDualError::ExecutionError("abort".into()))
        });
        assert!(result.is_err());
        assert!(ids(&mut db)?.is_empty(), "{backend}");
    }
    Ok(())
}

#[tokio::test]
async fn cached_statements_expire_after_idle_ttl() -> Result<(), Box<dyn std::error::Error>> {
    for backend in backends() {
        let clock = ManualClock::new(0);
        let options = DatabaseOptionsBuilder::new().cache_ttl_ms(1_000).finish();
        let mut db = open(backend, options).await?.with_cache_clock(Arc::new(clock.clone()));

        let first = db.prepare("SELECT id FROM ledger")?;
        clock.advance(900);
        assert_eq!(db.prepare("SELECT id FROM ledger")?, first);
        clock.advance(900);
        assert_eq!(db.prepare("SELECT id FROM ledger")?, first, "access refreshes the idle timer");

        db.prepare("SELECT amount FROM ledger")?;
        clock.advance(1_500);
        assert_eq!(db.purge_expired_statements()?, 2);

        let stats = db.get_cache_stats()?;
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 0);

        // The old handle no longer resolves.
        assert!(db.statement(first).unwrap_err().is_freed());
        let again = db.prepare("SELECT id FROM ledger")?;
        assert_ne!(again, first);
    }
    Ok(())
}

#[tokio::test]
async fn small_cache_evicts_least_recently_used() -> Result<(), Box<dyn std::error::Error>> {
    for backend in backends() {
        let clock = ManualClock::new(0);
        let options = DatabaseOptionsBuilder::new().cache_size(2).finish();
        let mut db = open(backend, options).await?.with_cache_clock(Arc::new(clock.clone()));

        let a = db.prepare("SELECT 1")?;
        clock.advance(1);
        db.prepare("SELECT 2")?;
        clock.advance(1);
        db.prepare("SELECT 1")?;
        clock.advance(1);
        db.prepare("SELECT 3")?;

        let stats = db.get_cache_stats()?;
        assert_eq!(stats.size, 2);
        assert_eq!(stats.evictions, 1);
        assert!(db.statement(a).is_ok(), "recently used entry survives");
    }
    Ok(())
}
