use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;

use crate::engine::error::{Error, Result};
use crate::storage::error::StorageSystemError;
use crate::storage::file_based::FileBasedStorage;
use crate::storage::local::LocalStorageProvider;
use crate::storage::macros::MacroTable;
use crate::storage::manager::StateStorageManager;
use crate::storage::spec::StorageSpec;
use crate::storage::splitter::ChildNameSplitter;
use crate::storage::state_storage::{lock_storage, share};
use crate::xml::Element;

fn manager_for(config_dir: &Path) -> StateStorageManager {
    let config_dir = config_dir.display().to_string();
    StateStorageManager::new(
        "application",
        Arc::new(LocalStorageProvider::unrooted()),
        MacroTable::from_pairs([("APP_CONFIG", config_dir.as_str())]),
    )
}

#[test]
fn test_resolution_is_cached_per_template() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let manager = manager_for(dir.path());
    let spec = StorageSpec::new("$APP_CONFIG$/editor.xml");

    let first = manager.resolve_storage(&spec)?.expect("storage should resolve");
    let second = manager.resolve_storage(&spec)?.expect("storage should resolve");
    assert!(Arc::ptr_eq(&first, &second));

    let expected = dir.path().join("editor.xml").display().to_string();
    assert_eq!(lock_storage(&first)?.file_spec(), expected);
    Ok(())
}

#[test]
fn test_unresolved_macro_yields_absent_storage() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let manager = manager_for(dir.path());
    let spec = StorageSpec::new("$PROJECT_CONFIG_DIR$/misc.xml");

    assert!(manager.resolve_storage(&spec)?.is_none());
    assert!(manager.resolve_storage(&spec)?.is_none());
    assert!(manager.cached_storages()?.is_empty());

    let err = manager
        .expand_macros(&spec.file)
        .expect_err("expansion should fail");
    assert!(matches!(
        err,
        Error::StorageSystem(StorageSystemError::PathResolutionFailed { ref unresolved, .. })
            if unresolved == &vec!["$PROJECT_CONFIG_DIR$".to_string()]
    ));

    // Binding the macro invalidates the cached absence
    let project_dir = dir.path().join("proj").display().to_string();
    manager.add_macro("PROJECT_CONFIG_DIR", &project_dir)?;
    assert!(manager.resolve_storage(&spec)?.is_some());
    Ok(())
}

#[test]
fn test_rebinding_macro_drops_dependent_storages_only() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let manager = manager_for(&dir.path().join("one"));
    manager.add_macro("USER_HOME", &dir.path().display().to_string())?;

    let app_spec = StorageSpec::new("$APP_CONFIG$/editor.xml");
    let home_spec = StorageSpec::new("$USER_HOME$/home.xml");
    let app_before = manager.resolve_storage(&app_spec)?.expect("storage should resolve");
    let home_before = manager.resolve_storage(&home_spec)?.expect("storage should resolve");

    // Same value: nothing changes
    manager.add_macro("APP_CONFIG", &dir.path().join("one").display().to_string())?;
    let app_same = manager.resolve_storage(&app_spec)?.expect("storage should resolve");
    assert!(Arc::ptr_eq(&app_before, &app_same));

    manager.add_macro("APP_CONFIG", &dir.path().join("two").display().to_string())?;
    let app_after = manager.resolve_storage(&app_spec)?.expect("storage should resolve");
    let home_after = manager.resolve_storage(&home_spec)?.expect("storage should resolve");

    assert!(!Arc::ptr_eq(&app_before, &app_after));
    assert!(Arc::ptr_eq(&home_before, &home_after));
    assert_eq!(
        lock_storage(&app_after)?.file_spec(),
        dir.path().join("two").join("editor.xml").display().to_string()
    );
    Ok(())
}

#[test]
fn test_splitter_selects_directory_storage() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let manager = manager_for(dir.path());
    let spec = StorageSpec::new("$APP_CONFIG$/templates").with_splitter(Arc::new(ChildNameSplitter::new("name")));
    assert!(spec.is_directory());

    let storage = manager.resolve_storage(&spec)?.expect("storage should resolve");
    let mut storage = lock_storage(&storage)?;
    storage.set_element(
        "Templates",
        Element::new("state").with_child(Element::new("template").with_attribute("name", "main")),
    )?;
    storage.save()?;

    assert!(dir.path().join("templates").join("main.xml").is_file());
    Ok(())
}

#[test]
fn test_custom_storage_class() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let manager = manager_for(dir.path());
    manager.register_storage_class("workspace", |_spec, context| {
        Ok(share(FileBasedStorage::new(
            context.path.with_extension("ws"),
            "workspace",
            context.provider.clone(),
            context.macros.clone(),
        )))
    })?;

    let spec = StorageSpec::new("$APP_CONFIG$/workspace.xml").with_storage_class("workspace");
    assert_eq!(spec.cache_key(), "workspace");

    let storage = manager.resolve_storage(&spec)?.expect("storage should resolve");
    {
        let mut storage = lock_storage(&storage)?;
        storage.set_element("Layout", Element::new("state").with_attribute("panels", "3"))?;
        storage.save()?;
    }
    assert!(dir.path().join("workspace.ws").is_file());

    assert!(manager.clear_cached_storage("workspace")?);
    assert!(!manager.clear_cached_storage("workspace")?);
    Ok(())
}

#[test]
fn test_unknown_storage_class_is_an_error() {
    let dir = tempdir().expect("Failed to create temp directory");
    let manager = manager_for(dir.path());
    let spec = StorageSpec::new("$APP_CONFIG$/x.xml").with_storage_class("missing");

    let err = manager.resolve_storage(&spec).expect_err("unknown class should fail");
    assert!(matches!(
        err,
        Error::StorageSystem(StorageSystemError::UnknownStorageClass(ref class)) if class == "missing"
    ));
}

#[test]
fn test_list_files_and_lookup_by_file() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let manager = manager_for(dir.path());
    let editor = manager
        .resolve_storage(&StorageSpec::new("$APP_CONFIG$/editor.xml"))?
        .expect("storage should resolve");
    manager.resolve_storage(&StorageSpec::new("$APP_CONFIG$/ui.xml"))?;

    assert_eq!(
        manager.list_all_files()?,
        vec![dir.path().join("editor.xml"), dir.path().join("ui.xml")]
    );

    let found = manager
        .storage_for_file(&dir.path().join("editor.xml"))?
        .expect("owner should be found");
    assert!(Arc::ptr_eq(&found, &editor));
    assert!(manager.storage_for_file(&dir.path().join("nope.xml"))?.is_none());
    Ok(())
}

#[test]
fn test_reload_storages_rereads_disk() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(
        dir.path().join("other.xml"),
        r#"<application><component name="Foo" /></application>"#,
    )
    .expect("fixture should be written");

    let manager = manager_for(dir.path());
    let storage = manager
        .resolve_storage(&StorageSpec::new("$APP_CONFIG$/other.xml"))?
        .expect("storage should resolve");

    assert!(lock_storage(&storage)?.get_element("Foo")?.is_some());
    assert!(lock_storage(&storage)?.get_element("Foo")?.is_none());

    manager.reload_storages()?;
    assert!(lock_storage(&storage)?.get_element("Foo")?.is_some());
    Ok(())
}

#[test]
fn test_collapse_through_manager() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp directory");
    let manager = manager_for(dir.path());
    let path = dir.path().join("keymaps").display().to_string();

    assert_eq!(manager.collapse_macros(&path)?, "$APP_CONFIG$/keymaps");
    assert_eq!(manager.expand_macros("$APP_CONFIG$/keymaps")?, path);
    Ok(())
}
