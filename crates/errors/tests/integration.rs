//! Integration tests for error types

#[cfg(test)]
mod tests {
    use kiln_errors::*;

    #[test]
    fn test_error_conversion() {
        let net_err = NetworkError::Timeout {
            url: "https://dl.example.org".into(),
        };
        let err: Error = net_err.into();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_install_failures_wrap_their_source() {
        let source: Error = NetworkError::Timeout {
            url: "https://dl.example.org/main/x86_64/zlib-1.3.1-r0.apk".into(),
        }
        .into();
        let err: Error = InstallError::ExpansionFailed {
            package: "zlib-1.3.1-r0".into(),
            source: Box::new(source),
        }
        .into();
        let text = err.to_string();
        assert!(text.contains("expansion of zlib-1.3.1-r0 failed"), "{text}");
        assert!(text.contains("dl.example.org"), "{text}");
        match err {
            Error::Install(InstallError::ExpansionFailed { source, .. }) => {
                assert!(matches!(*source, Error::Network(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::DiskFull {
            path: "/var/cache/apk".into(),
        };
        assert_eq!(err.to_string(), "disk full: /var/cache/apk");
    }

    #[test]
    fn test_error_clone() {
        let err = PackageError::DataHashMismatch {
            declared: "aa".into(),
            actual: "bb".into(),
        };
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_cancellation_keeps_its_cause() {
        let cause = Error::from(InstallError::Conflict {
            package: "sudo".into(),
        });
        let err = Error::cancelled().with_cause(Some(&cause));
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("sudo"));
        assert_eq!(err.user_code(), Some("error.cancelled"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let storage_err = StorageError::from_io_with_path(&io_err, std::path::Path::new("/x"));
        assert!(matches!(storage_err, StorageError::PermissionDenied { .. }));
    }
}
