pub mod db;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod repo;
pub mod validate;

#[cfg(test)]
mod tests {
    use super::error::AppError;

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new("DB_TEST", "db failed").with_retryable(false);
        assert_eq!(err.code, "DB_TEST");
        assert_eq!(err.message, "db failed");
        assert_eq!(err.retryable, false);
    }
}
