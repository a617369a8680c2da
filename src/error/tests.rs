use crate::error::*;
use crate::locking::cancellation::CancelReason;

#[test]
fn test_error_context_acquire_mentions_backend_switch() {
    let error = LockError::Acquire {
        identity: "pathmutex_tmp_cache.lock".to_string(),
        details: "File name too long".to_string(),
    };
    let context = ErrorContext::new(&error);

    assert!(context.suggestion.unwrap().contains("--mode advisory"));
    assert!(
        context
            .details
            .unwrap()
            .contains("pathmutex_tmp_cache.lock")
    );
}

#[test]
fn test_error_context_deadline_suggests_purge() {
    let error = LockError::DeadlineExceeded {
        identity: "pathmutex_x".to_string(),
        waited_secs: 3.0,
        deadline: LockTimeoutValue::from_secs(3),
        deadline_source: LockTimeoutSource::Cli,
    };
    let context = ErrorContext::new(&error);

    let suggestion = context.suggestion.unwrap();
    assert!(suggestion.contains("--deadline"));
    assert!(suggestion.contains("pathmutex purge"));
}

#[test]
fn test_deadline_message_includes_source() {
    let error = LockError::DeadlineExceeded {
        identity: "pathmutex_x".to_string(),
        waited_secs: 3.0,
        deadline: LockTimeoutValue::from_secs(3),
        deadline_source: LockTimeoutSource::Environment,
    };

    assert_eq!(
        error.to_string(),
        "Lock 'pathmutex_x' was not acquired within 3s (environment variable); waited 3.0s"
    );
}

#[test]
fn test_exit_codes() {
    assert_eq!(
        get_exit_code(&LockError::InvalidConfig("bad".to_string())),
        2
    );
    assert_eq!(
        get_exit_code(&LockError::Cancelled {
            identity: "pathmutex_x".to_string(),
            waited_secs: 0.5,
            reason: CancelReason::Requested,
        }),
        130
    );
    assert_eq!(
        get_exit_code(&LockError::Cancelled {
            identity: "pathmutex_x".to_string(),
            waited_secs: 0.5,
            reason: CancelReason::Signal(15),
        }),
        143
    );
    assert_eq!(
        get_exit_code(&LockError::DeadlineExceeded {
            identity: "pathmutex_x".to_string(),
            waited_secs: 1.0,
            deadline: LockTimeoutValue::from_secs(1),
            deadline_source: LockTimeoutSource::Default,
        }),
        124
    );
    assert_eq!(
        get_exit_code(&LockError::Unexpected {
            identity: "pathmutex_x".to_string(),
        }),
        1
    );
}

#[test]
fn test_format_error_includes_details_and_suggestion() {
    let error = LockError::UnsupportedBackend("semaphore".to_string());
    let formatted = format_error_with_color(&error, false);

    assert!(formatted.starts_with("Error: Locking backend 'semaphore'"));
    assert!(formatted.contains("\nBackend 'semaphore' requested.\n"));
    assert!(formatted.contains("Suggestion: Use --mode auto"));
}

#[test]
fn test_cancelled_message_names_signal() {
    let error = LockError::Cancelled {
        identity: "pathmutex_x".to_string(),
        waited_secs: 1.5,
        reason: CancelReason::Signal(2),
    };

    assert_eq!(
        error.to_string(),
        "Waiting for lock 'pathmutex_x' was interrupted by signal 2 after 1.5s"
    );
}

#[test]
fn test_format_error_with_color() {
    let error = LockError::ConfigError("unreadable".to_string());

    let plain = format_error_with_color(&error, false);
    assert!(!plain.contains("\x1b["));
    assert!(plain.contains("Error: Configuration error: unreadable"));

    let colored = format_error_with_color(&error, true);
    assert!(colored.contains("\x1b[31m"));
    assert!(colored.ends_with("\x1b[0m"));
}

#[test]
fn test_io_error_is_transparent() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing lock dir");
    let error: LockError = io.into();

    assert_eq!(error.to_string(), "missing lock dir");
    let context = ErrorContext::new(&error);
    assert!(context.suggestion.unwrap().contains("path is correct"));
}
