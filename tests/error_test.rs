use huginn::{HuginnError, Result};

#[test]
fn test_error_display() {
    let err = HuginnError::UnsupportedExtension {
        extension: "bmp".to_string(),
        expected: ".jpg or .png",
    };
    let message = err.to_string();
    assert!(message.contains("bmp"));
    assert!(message.contains(".jpg or .png"));
}

#[test]
fn test_no_compatible_format() {
    let err = HuginnError::NoCompatibleFormat;
    assert_eq!(err.to_string(), "no compatible formats available");
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(HuginnError::NoDeviceAvailable("ConceptTagger".into()))
    }
    assert!(returns_error().is_err());
}

#[test]
fn test_io_error_converts() {
    fn open() -> Result<String> {
        Ok(std::fs::read_to_string("/nonexistent/huginn/file")?)
    }
    assert!(matches!(open(), Err(HuginnError::Io(_))));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(HuginnError::Capture("device busy".into()).is_transient());
}

#[test]
fn permanent_errors() {
    assert!(!HuginnError::NoCompatibleFormat.is_transient());
    assert!(!HuginnError::NoDeviceAvailable("FaceSentimentAnalyzer".into()).is_transient());
    assert!(!HuginnError::InvalidInput("empty frame".into()).is_transient());
    assert!(!HuginnError::Model("bad tensor".into()).is_transient());
    assert!(
        !HuginnError::BindingMismatch {
            expected: "ConceptTagger".into(),
            found: "ObjectDetector".into(),
        }
        .is_transient()
    );
    assert!(!HuginnError::OutputsUnavailable { state: "bound" }.is_transient());
}

// ============================================================================
// Exit codes
// ============================================================================

#[test]
fn exit_codes_group_by_category() {
    assert_eq!(HuginnError::InvalidInput("x".into()).exit_code(), 2);
    assert_eq!(
        HuginnError::UnsupportedExtension {
            extension: "gif".into(),
            expected: ".jpg or .png",
        }
        .exit_code(),
        2
    );
    assert_eq!(
        HuginnError::Io(std::io::Error::other("disk")).exit_code(),
        3
    );
    assert_eq!(HuginnError::NoDeviceAvailable("x".into()).exit_code(), 4);
    assert_eq!(
        HuginnError::UnsupportedDevice {
            skill: "x".into(),
            device: "GPU".into(),
        }
        .exit_code(),
        4
    );
    assert_eq!(HuginnError::Model("x".into()).exit_code(), 5);
    assert_eq!(HuginnError::Capture("x".into()).exit_code(), 6);
    assert_eq!(HuginnError::NoCompatibleFormat.exit_code(), 6);
    assert_eq!(HuginnError::Runtime("x".into()).exit_code(), 1);
}

#[test]
fn exit_codes_are_never_success() {
    let errors = [
        HuginnError::NotImplemented("pose backend"),
        HuginnError::FeatureNotFound("x".into()),
        HuginnError::Configuration("x".into()),
    ];
    for err in errors {
        assert_ne!(err.exit_code(), 0, "{err}");
    }
}
