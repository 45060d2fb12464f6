use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::tempdir;

use crate::engine::config::EngineConfig;
use crate::engine::error::{Error, Result};
use crate::serialization::SerdeState;
use crate::serialization::error::SerializationError;
use crate::storage::local::LocalStorageProvider;
use crate::storage::provider::StorageProvider;
use crate::storage::spec::StorageSpec;
use crate::store::collaborators::{AcceptMigration, ClearReadonlyFlag, ReportReadonly};
use crate::store::component::{PersistentStateComponent, SerdeComponent};
use crate::store::component_store::{ComponentStore, StoreState};
use crate::store::error::StoreError;
use crate::store::scope::ApplicationScope;
use crate::tests::common::{CountingProvider, init_logging, read_string};
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct EditorSettings {
    font_size: u32,
    theme: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            font_size: 12,
            theme: "light".to_string(),
        }
    }
}

impl SerdeState for EditorSettings {}

const EDITOR_DOCUMENT: &str = "<application>\n  <component name=\"Editor\">\n    <option name=\"font_size\" value=\"14\" />\n  </component>\n</application>";

fn config_for(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config
        .macros
        .insert("APP_CONFIG".to_string(), dir.display().to_string());
    config
}

fn app_store(dir: &Path, provider: Arc<dyn StorageProvider>) -> ComponentStore<ApplicationScope> {
    ComponentStore::new(ApplicationScope, provider, config_for(dir))
}

fn editor() -> SerdeComponent<EditorSettings> {
    SerdeComponent::new("Editor", Vec::new())
}

#[test]
fn test_load_applies_stored_state() -> Result<()> {
    init_logging();
    let dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(dir.path().join("other.xml"), EDITOR_DOCUMENT).expect("fixture should be written");

    let mut store = app_store(dir.path(), Arc::new(LocalStorageProvider::unrooted()));
    let editor = store.register(editor())?;
    assert_eq!(store.state(), StoreState::Unloaded);

    let failures = store.load(&AcceptMigration)?;
    assert!(failures.is_empty());
    assert_eq!(store.state(), StoreState::Loaded);
    assert_eq!(editor.lock().expect("component lock").state().font_size, 14);
    Ok(())
}

#[test]
fn test_save_writes_non_default_fields_once() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let provider = CountingProvider::new();
    let mut store = app_store(dir.path(), provider.clone());
    store.load(&AcceptMigration)?;

    let editor = store.register(editor())?;
    editor.lock().expect("component lock").update(|s| s.font_size = 14);

    let saved = store.save(&ReportReadonly)?.into_result()?;
    assert_eq!(saved, vec![dir.path().join("other.xml")]);
    assert_eq!(read_string(&dir.path().join("other.xml")), EDITOR_DOCUMENT);

    let saved_again = store.save(&ReportReadonly)?.into_result()?;
    assert!(saved_again.is_empty());
    assert_eq!(provider.writes(), 1);
    Ok(())
}

#[test]
fn test_unmodified_components_keep_their_stored_state() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(dir.path().join("other.xml"), EDITOR_DOCUMENT).expect("fixture should be written");

    let provider = CountingProvider::new();
    let mut store = app_store(dir.path(), provider.clone());
    store.register(editor())?;
    store.load(&AcceptMigration)?;

    assert!(store.save(&ReportReadonly)?.into_result()?.is_empty());
    assert_eq!(provider.mutations(), 0);
    assert_eq!(read_string(&dir.path().join("other.xml")), EDITOR_DOCUMENT);
    Ok(())
}

#[test]
fn test_unknown_fragments_survive_a_save() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(
        dir.path().join("other.xml"),
        r#"<application><component name="Plugin"><opt v="1"/></component></application>"#,
    )
    .expect("fixture should be written");

    let mut store = app_store(dir.path(), Arc::new(LocalStorageProvider::unrooted()));
    store.load(&AcceptMigration)?;
    let editor = store.register(editor())?;
    editor.lock().expect("component lock").update(|s| s.theme = "dark".to_string());
    store.save(&ReportReadonly)?.into_result()?;

    let content = read_string(&dir.path().join("other.xml"));
    assert!(content.contains("<component name=\"Plugin\">"));
    assert!(content.contains("<option name=\"theme\" value=\"dark\" />"));
    Ok(())
}

#[test]
fn test_rejected_state_is_reported_and_preserved() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let broken = r#"<application><component name="Editor"><option name="font_size" value="huge"/></component></application>"#;
    std::fs::write(dir.path().join("other.xml"), broken).expect("fixture should be written");

    let mut store = app_store(dir.path(), Arc::new(LocalStorageProvider::unrooted()));
    let editor = store.register(editor())?;
    let failures = store.load(&AcceptMigration)?;

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].target, "Editor");
    assert!(matches!(failures[0].error, Error::Serialization(_)));
    assert_eq!(editor.lock().expect("component lock").state(), &EditorSettings::default());

    store.save(&ReportReadonly)?.into_result()?;
    let content = read_string(&dir.path().join("other.xml"));
    assert!(content.contains("value=\"huge\""), "stored state must not be lost: {content}");
    Ok(())
}

#[derive(Debug)]
struct FailingComponent;

impl PersistentStateComponent for FailingComponent {
    fn component_name(&self) -> &str {
        "Failing"
    }

    fn get_state(&self) -> std::result::Result<Option<Element>, SerializationError> {
        Err(SerializationError::component("Failing", "cannot encode"))
    }

    fn load_state(&mut self, _state: Element) -> std::result::Result<(), SerializationError> {
        Ok(())
    }
}

#[test]
fn test_externalization_failure_is_isolated() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(
        dir.path().join("other.xml"),
        r#"<application><component name="Failing"><kept /></component></application>"#,
    )
    .expect("fixture should be written");

    let mut store = app_store(dir.path(), Arc::new(LocalStorageProvider::unrooted()));
    store.register(FailingComponent)?;
    let editor = store.register(editor())?;
    store.load(&AcceptMigration)?;
    editor.lock().expect("component lock").update(|s| s.font_size = 14);

    let outcome = store.save(&ReportReadonly)?;
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].target, "Failing");
    assert_eq!(outcome.saved_files, vec![dir.path().join("other.xml")]);

    let content = read_string(&dir.path().join("other.xml"));
    assert!(content.contains("<kept />"));
    assert!(content.contains("value=\"14\""));
    Ok(())
}

#[test]
fn test_readonly_files_abort_before_writing() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let file = dir.path().join("other.xml");
    std::fs::write(&file, EDITOR_DOCUMENT).expect("fixture should be written");

    let provider = Arc::new(LocalStorageProvider::unrooted());
    let mut store = app_store(dir.path(), provider.clone());
    let editor = store.register(editor())?;
    store.load(&AcceptMigration)?;
    provider.set_readonly(&file, true)?;

    editor.lock().expect("component lock").update(|s| s.font_size = 20);
    let err = store.save(&ReportReadonly).expect_err("read-only file should abort");
    assert!(err.is_read_only());
    assert!(matches!(err, Error::Store(StoreError::ReadOnlyFiles(ref files)) if files == &vec![file.clone()]));
    assert_eq!(read_string(&file), EDITOR_DOCUMENT);

    let saved = store.save(&ClearReadonlyFlag)?.into_result()?;
    assert_eq!(saved, vec![file.clone()]);
    assert!(read_string(&file).contains("value=\"20\""));
    Ok(())
}

#[test]
fn test_legacy_storage_fallback() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(dir.path().join("other.xml"), EDITOR_DOCUMENT).expect("fixture should be written");

    let mut store = app_store(dir.path(), Arc::new(LocalStorageProvider::unrooted()));
    let editor = store.register(SerdeComponent::<EditorSettings>::new(
        "Editor",
        vec![StorageSpec::new("$APP_CONFIG$/editor.xml")],
    ))?;
    store.load(&AcceptMigration)?;
    assert_eq!(editor.lock().expect("component lock").state().font_size, 14);

    store.save(&ReportReadonly)?.into_result()?;
    assert!(read_string(&dir.path().join("editor.xml")).contains("value=\"14\""));
    Ok(())
}

#[test]
fn test_deprecated_storage_moves_to_new_location() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(
        dir.path().join("old.xml"),
        EDITOR_DOCUMENT,
    )
    .expect("fixture should be written");

    let mut store = app_store(dir.path(), Arc::new(LocalStorageProvider::unrooted()));
    let editor = store.register(SerdeComponent::<EditorSettings>::new(
        "Editor",
        vec![
            StorageSpec::new("$APP_CONFIG$/editor.xml"),
            StorageSpec::new("$APP_CONFIG$/old.xml").deprecated(),
        ],
    ))?;
    store.load(&AcceptMigration)?;
    assert_eq!(editor.lock().expect("component lock").state().font_size, 14);

    store.save(&ReportReadonly)?.into_result()?;
    assert!(!dir.path().join("old.xml").exists());
    assert!(read_string(&dir.path().join("editor.xml")).contains("value=\"14\""));
    Ok(())
}

#[test]
fn test_reload_picks_up_external_changes() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let file = dir.path().join("other.xml");
    std::fs::write(&file, EDITOR_DOCUMENT).expect("fixture should be written");

    let mut store = app_store(dir.path(), Arc::new(LocalStorageProvider::unrooted()));
    let editor = store.register(editor())?;
    store.load(&AcceptMigration)?;

    std::fs::write(&file, EDITOR_DOCUMENT.replace("14", "18")).expect("fixture should be written");
    assert!(store.reload()?.is_empty());
    assert_eq!(editor.lock().expect("component lock").state().font_size, 18);
    Ok(())
}

#[test]
fn test_lifecycle_errors() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let mut store = app_store(dir.path(), Arc::new(LocalStorageProvider::unrooted()));

    assert!(matches!(store.save(&ReportReadonly), Err(Error::Store(StoreError::NotLoaded))));

    store.register(editor())?;
    assert!(matches!(
        store.register(editor()),
        Err(Error::Store(StoreError::DuplicateComponent(ref name))) if name == "Editor"
    ));

    store.load(&AcceptMigration)?;
    assert_eq!(store.component_names(), vec!["Editor"]);
    assert_eq!(store.all_files()?, vec![dir.path().join("other.xml")]);

    store.dispose();
    assert_eq!(store.state(), StoreState::Disposed);
    assert!(matches!(store.load(&AcceptMigration), Err(Error::Store(StoreError::Disposed))));
    assert!(matches!(store.save(&ReportReadonly), Err(Error::Store(StoreError::Disposed))));
    Ok(())
}
