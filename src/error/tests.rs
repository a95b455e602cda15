//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("cache_size cannot be 0");
        assert_eq!(err.to_string(), "configuration error: cache_size cannot be 0");
    }

    #[test]
    fn test_storage_error_not_found() {
        let err = StorageError::not_found("visit", "123");
        assert_eq!(err.to_string(), "not found: visit with id '123'");
    }

    #[test]
    fn test_storage_error_conversion() {
        let storage_err = StorageError::Database("disk I/O error".to_string());
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_too_new_display() {
        let err = StorageError::TooNew {
            found: 30,
            current: 28,
        };
        assert_eq!(
            err.to_string(),
            "history database version 30 is newer than supported version 28"
        );
    }

    #[test]
    fn test_too_old_display() {
        let err = StorageError::TooOld {
            found: 9,
            oldest: 15,
        };
        assert!(err.to_string().contains("too old"));
        assert!(err.to_string().contains("15"));
    }

    #[test]
    fn test_init_status_classification() {
        let too_new: Error = StorageError::TooNew {
            found: 30,
            current: 28,
        }
        .into();
        let too_old: Error = StorageError::TooOld {
            found: 9,
            oldest: 15,
        }
        .into();
        let migration: Error = StorageError::Migration("step 24 failed".to_string()).into();
        let io: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro").into();

        assert_eq!(too_new.init_status(), InitStatus::TooNew);
        assert_eq!(too_old.init_status(), InitStatus::TooOld);
        assert_eq!(migration.init_status(), InitStatus::Failure);
        assert_eq!(io.init_status(), InitStatus::Failure);
    }

    #[test]
    fn test_raze_error_display() {
        let err = StorageError::Raze("transaction open".to_string());
        assert_eq!(err.to_string(), "raze failed: transaction open");
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("history thread exited");
        assert_eq!(err.to_string(), "internal error: history thread exited");
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(StorageError::Migration("inner error".to_string()).into())
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert_eq!(
            result.unwrap_err().to_string(),
            "storage error: migration error: inner error"
        );
    }
}
