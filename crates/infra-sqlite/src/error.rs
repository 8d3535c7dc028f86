// sqlx::Error -> AppError::Queue

use restful_metrics_core::error::AppError;

/// Convert sqlx::Error to AppError with structured information
///
/// Every store failure is a queue error: the runner cannot continue safely
/// without the store, whatever the cause.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "5" | "517" => {
                        // SQLITE_BUSY - database is locked by another writer
                        AppError::Queue(format!(
                            "Database locked (SQLITE_BUSY): {}",
                            db_err.message()
                        ))
                    }
                    "13" => {
                        // SQLITE_FULL - database or disk is full
                        AppError::Queue(format!("Database full: {}", db_err.message()))
                    }
                    _ => AppError::Queue(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Queue(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            AppError::Queue(format!("Job store unavailable: {}", err))
        }
        sqlx::Error::ColumnNotFound(col) => AppError::Queue(format!("Column not found: {}", col)),
        _ => {
            // Connection, IO, protocol errors
            AppError::Queue(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_queue() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Queue(ref msg) if msg.contains("unavailable")));
    }
}
