#[cfg(test)]
mod error_tests {
    use crabrecord::errors::RecorderError;
    use std::error::Error;

    #[test]
    fn test_recorder_error_encode() {
        let error = RecorderError::Encode("No space left on device".to_string());
        assert_eq!(error.to_string(), "Encode error: No space left on device");
    }

    #[test]
    fn test_recorder_error_not_found() {
        let error = RecorderError::NotFound("clip.mp4".to_string());
        assert!(error.to_string().contains("Not found"));
        assert!(error.to_string().contains("clip.mp4"));
    }

    #[test]
    fn test_recorder_error_invalid_request() {
        let error = RecorderError::InvalidRequest("No video file uploaded".to_string());
        assert_eq!(error.to_string(), "Invalid request: No video file uploaded");
    }

    #[test]
    fn test_recorder_error_debug_format() {
        let error = RecorderError::AlreadyActive("1700000000.mp4".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("AlreadyActive"));
        assert!(debug_str.contains("1700000000.mp4"));
    }

    #[test]
    fn test_recorder_error_implements_error_trait() {
        let error = RecorderError::Device("Error trait test".to_string());
        let _error_trait: &dyn Error = &error;
        assert!(error.source().is_none());
    }

    #[test]
    fn test_recorder_error_is_cloneable() {
        let error = RecorderError::Device("disconnected".to_string());
        let copy = error.clone();
        assert_eq!(error, copy);
    }

    #[test]
    fn test_kinds_are_distinct() {
        let errors = [
            RecorderError::Device(String::new()),
            RecorderError::Encode(String::new()),
            RecorderError::AlreadyActive(String::new()),
            RecorderError::NotFound(String::new()),
            RecorderError::InvalidRequest(String::new()),
            RecorderError::Config(String::new()),
            RecorderError::Io(String::new()),
        ];
        let mut kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_anyhow_interop() {
        fn fails() -> anyhow::Result<()> {
            Err(RecorderError::Config("fps must be positive".to_string()))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(err.to_string().contains("fps must be positive"));
        assert!(err.downcast_ref::<RecorderError>().is_some());
    }
}
