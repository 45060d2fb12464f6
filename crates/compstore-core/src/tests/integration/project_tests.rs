//! Project stores in both on-disk layouts, with modules attached.
use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::tempdir;

use crate::engine::config::EngineConfig;
use crate::engine::error::{Error, Result};
use crate::storage::local::LocalStorageProvider;
use crate::storage::provider::StorageProvider;
use crate::storage::spec::StorageSpec;
use crate::store::collaborators::{AcceptMigration, DeclineMigration, ReportReadonly};
use crate::store::component::ElementComponent;
use crate::store::component_store::ComponentStore;
use crate::store::error::StoreError;
use crate::store::project::ProjectStore;
use crate::store::scope::{ModuleScope, ProjectFormat, ProjectScope};
use crate::tests::common::{file_names, init_logging, read_string};
use crate::xml::Element;

fn config_with(macros: &[(&str, &Path)]) -> EngineConfig {
    let mut config = EngineConfig::default();
    for (name, path) in macros {
        config.macros.insert(name.to_string(), path.display().to_string());
    }
    config
}

fn directory_project(root: &Path, provider: Arc<dyn StorageProvider>) -> Result<ProjectStore> {
    let config_dir = root.join(".config");
    let project = ComponentStore::new(
        ProjectScope::new(ProjectFormat::Directory),
        provider.clone(),
        config_with(&[("PROJECT_CONFIG_DIR", config_dir.as_path()), ("PROJECT_DIR", root)]),
    );
    let mut store = ProjectStore::new(project);

    let module_dir = root.join("core");
    let module_file = module_dir.join("core.iml");
    store.add_module(
        "core",
        ComponentStore::new(
            ModuleScope,
            provider,
            config_with(&[("MODULE_FILE", module_file.as_path()), ("MODULE_DIR", module_dir.as_path())]),
        ),
    )?;
    Ok(store)
}

fn register_components(store: &mut ProjectStore) -> Result<(Arc<Mutex<ElementComponent>>, Arc<Mutex<ElementComponent>>)> {
    let vcs = store.project_mut().register(ElementComponent::new(
        "Vcs",
        vec![StorageSpec::new("$PROJECT_CONFIG_DIR$/vcs.xml")],
    ))?;
    let roots = store
        .module_mut("core")
        .expect("module should be attached")
        .register(ElementComponent::new("Roots", Vec::new()))?;
    Ok((vcs, roots))
}

#[test]
fn test_directory_project_round_trip() -> Result<()> {
    init_logging();
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let root = temp_dir.path();

    {
        let mut store = directory_project(root, Arc::new(LocalStorageProvider::unrooted()))?;
        let (vcs, roots) = register_components(&mut store)?;
        store.load(&DeclineMigration)?;

        vcs.lock().expect("component lock").set_state(Some(
            Element::new("state").with_child(
                Element::new("mapping")
                    .with_attribute("directory", root.join("core").display().to_string())
                    .with_attribute("vcs", "Git"),
            ),
        ));
        roots.lock().expect("component lock").set_state(Some(
            Element::new("state").with_child(
                Element::new("content").with_attribute("url", root.join("core").join("src").display().to_string()),
            ),
        ));
        store.save(&ReportReadonly)?.into_result()?;
        store.dispose();
    }

    assert_eq!(file_names(&root.join(".config")), vec!["misc.xml", "vcs.xml"]);
    assert_eq!(read_string(&root.join(".config").join("misc.xml")), "<project version=\"4\" />");
    assert!(read_string(&root.join(".config").join("vcs.xml")).contains("directory=\"$PROJECT_DIR$/core\""));
    assert!(read_string(&root.join("core").join("core.iml")).contains("url=\"$MODULE_DIR$/src\""));

    // Current format: reopening needs no migration
    let mut store = directory_project(root, Arc::new(LocalStorageProvider::unrooted()))?;
    let (vcs, roots) = register_components(&mut store)?;
    assert!(store.load(&DeclineMigration)?.is_empty());

    let vcs = vcs.lock().expect("component lock");
    let mapping = vcs
        .state()
        .and_then(|state| state.child("mapping"))
        .expect("mapping should be loaded");
    assert_eq!(
        mapping.attribute("directory").map(str::to_string),
        Some(root.join("core").display().to_string())
    );
    assert!(roots.lock().expect("component lock").state().is_some());
    Ok(())
}

#[test]
fn test_old_module_blocks_project_load_until_confirmed() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let root = temp_dir.path();
    let module_file = root.join("core").join("core.iml");
    std::fs::create_dir_all(root.join("core")).expect("Failed to create module directory");
    std::fs::write(&module_file, "<module version=\"2\" />").expect("Failed to write module file");

    let mut store = directory_project(root, Arc::new(LocalStorageProvider::unrooted()))?;
    let err = store.load(&DeclineMigration).expect_err("old module should need confirmation");
    assert!(matches!(
        err,
        Error::Store(StoreError::MigrationDeclined { from: 2, to: 4, .. })
    ));
    assert_eq!(read_string(&module_file), "<module version=\"2\" />");

    let mut store = directory_project(root, Arc::new(LocalStorageProvider::unrooted()))?;
    store.load(&AcceptMigration)?;
    store.save(&ReportReadonly)?.into_result()?;

    assert_eq!(read_string(&module_file), "<module version=\"4\" />");
    let backups: Vec<String> = file_names(&root.join("core"))
        .into_iter()
        .filter(|name| name.starts_with("core.iml.") && name.ends_with(".bak"))
        .collect();
    assert_eq!(backups.len(), 1);
    Ok(())
}
