use std::io;
use std::path::PathBuf;

use crate::engine::error::{Error, OperationFailure};
use crate::storage::error::StorageSystemError;
use crate::store::error::StoreError;

#[test]
fn test_io_helper_keeps_context() {
    let err = Error::io(
        io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        "write",
        PathBuf::from("/cfg/other.xml"),
    );
    match &err {
        Error::StorageSystem(StorageSystemError::Io { path, operation, .. }) => {
            assert_eq!(path, &PathBuf::from("/cfg/other.xml"));
            assert_eq!(operation, "write");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("/cfg/other.xml"));
}

#[test]
fn test_read_only_detection() {
    assert!(Error::from(StoreError::ReadOnlyFiles(vec![PathBuf::from("a.xml")])).is_read_only());
    assert!(Error::from(StorageSystemError::ReadOnly(PathBuf::from("a.xml"))).is_read_only());
    assert!(!Error::from(StoreError::NotLoaded).is_read_only());
    assert!(!Error::from("plain").is_read_only());
}

#[test]
fn test_save_failure_lists_every_target() {
    let err = Error::SaveFailed {
        failures: vec![
            OperationFailure::new("misc.xml", StorageSystemError::ReadOnly(PathBuf::from("misc.xml"))),
            OperationFailure::new("Editor", "cannot encode"),
        ],
    };
    let message = err.to_string();
    assert!(message.starts_with("Save failed for 2 target(s)"), "{message}");
    assert!(message.contains("misc.xml ("));
    assert!(message.contains("Editor (Error: cannot encode)"));
}

#[test]
fn test_project_save_failure_wraps_cause() {
    let err = Error::from(StoreError::ProjectSaveFailed {
        error: Box::new(StoreError::ReadOnlyFiles(vec![PathBuf::from("demo.ipr")]).into()),
        modules: Default::default(),
    });
    let message = err.to_string();
    assert!(message.contains("Project save failed"));
    assert!(message.contains("demo.ipr"));
}
