//! End-to-end save and reopen cycles of an application store.
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::tempdir;

use crate::engine::config::EngineConfig;
use crate::engine::error::Result;
use crate::serialization::SerdeState;
use crate::storage::local::LocalStorageProvider;
use crate::storage::provider::StorageProvider;
use crate::storage::spec::StorageSpec;
use crate::storage::splitter::ChildNameSplitter;
use crate::store::collaborators::{AcceptMigration, ReportReadonly};
use crate::store::component::{ElementComponent, SerdeComponent};
use crate::store::component_store::ComponentStore;
use crate::store::scope::ApplicationScope;
use crate::tests::common::{CountingProvider, file_names, init_logging, read_string};
use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Appearance {
    theme_file: String,
    font_size: u32,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            theme_file: String::new(),
            font_size: 12,
        }
    }
}

impl SerdeState for Appearance {}

/// Engine config written the way an embedding application would ship it
fn write_engine_config(dir: &Path) -> std::path::PathBuf {
    let config_path = dir.join("engine.json");
    let config_dir = dir.join("config");
    let json = serde_json::json!({ "macros": { "APP_CONFIG": config_dir.display().to_string() } });
    std::fs::write(&config_path, json.to_string()).expect("Failed to write engine config");
    config_path
}

fn open_store(
    config_path: &Path,
    provider: Arc<dyn StorageProvider>,
) -> Result<ComponentStore<ApplicationScope>> {
    let config = EngineConfig::load(provider.as_ref(), config_path)?;
    Ok(ComponentStore::new(ApplicationScope, provider, config))
}

fn appearance() -> SerdeComponent<Appearance> {
    SerdeComponent::new("Appearance", vec![StorageSpec::new("$APP_CONFIG$/appearance.xml")])
}

fn keymaps() -> ElementComponent {
    ElementComponent::new(
        "Keymaps",
        vec![StorageSpec::new("$APP_CONFIG$/keymaps").with_splitter(Arc::new(ChildNameSplitter::new("name")))],
    )
}

fn keymap_state(names: &[&str]) -> Element {
    names.iter().fold(Element::new("state"), |state, name| {
        state.with_child(
            Element::new("keymap")
                .with_attribute("name", *name)
                .with_child(Element::new("action").with_attribute("id", "Save")),
        )
    })
}

fn keymap_names(state: Option<&Element>) -> Vec<String> {
    state
        .map(|state| {
            state
                .children()
                .iter()
                .filter_map(|child| child.attribute("name").map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn test_full_cycle_survives_reopen() -> Result<()> {
    init_logging();
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_path = write_engine_config(temp_dir.path());
    let config_dir = temp_dir.path().join("config");
    let theme = config_dir.join("themes").join("dark.xml").display().to_string();

    {
        let mut store = open_store(&config_path, Arc::new(LocalStorageProvider::unrooted()))?;
        let appearance = store.register(appearance())?;
        let keymaps = store.register(keymaps())?;
        assert!(store.load(&AcceptMigration)?.is_empty());

        appearance.lock().expect("component lock").update(|a| a.theme_file = theme.clone());
        keymaps
            .lock()
            .expect("component lock")
            .set_state(Some(keymap_state(&["Default", "Mac"])));

        store.save(&ReportReadonly)?.into_result()?;
        store.dispose();
    }

    // Paths under a macro are stored in their portable form
    let appearance_file = read_string(&config_dir.join("appearance.xml"));
    assert!(
        appearance_file.contains("value=\"$APP_CONFIG$/themes/dark.xml\""),
        "{appearance_file}"
    );
    assert_eq!(file_names(&config_dir.join("keymaps")), vec!["Default.xml", "Mac.xml"]);

    let mut store = open_store(&config_path, Arc::new(LocalStorageProvider::unrooted()))?;
    let appearance = store.register(appearance())?;
    let keymaps = store.register(keymaps())?;
    store.load(&AcceptMigration)?;

    assert_eq!(appearance.lock().expect("component lock").state().theme_file, theme);
    assert_eq!(
        keymap_names(keymaps.lock().expect("component lock").state()),
        vec!["Default", "Mac"]
    );
    Ok(())
}

#[test]
fn test_directory_follows_component_state() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_path = write_engine_config(temp_dir.path());
    let keymap_dir = temp_dir.path().join("config").join("keymaps");

    let mut store = open_store(&config_path, Arc::new(LocalStorageProvider::unrooted()))?;
    let keymaps = store.register(keymaps())?;
    store.load(&AcceptMigration)?;

    keymaps
        .lock()
        .expect("component lock")
        .set_state(Some(keymap_state(&["Default", "Emacs"])));
    store.save(&ReportReadonly)?.into_result()?;
    assert_eq!(file_names(&keymap_dir), vec!["Default.xml", "Emacs.xml"]);

    // A file the engine does not own stays put
    std::fs::write(keymap_dir.join("README.txt"), "user notes").expect("Failed to write foreign file");

    keymaps
        .lock()
        .expect("component lock")
        .set_state(Some(keymap_state(&["Default", "Vim"])));
    store.save(&ReportReadonly)?.into_result()?;
    assert_eq!(file_names(&keymap_dir), vec!["Default.xml", "README.txt", "Vim.xml"]);

    keymaps.lock().expect("component lock").set_state(None);
    store.save(&ReportReadonly)?.into_result()?;
    assert_eq!(file_names(&keymap_dir), vec!["README.txt"]);
    Ok(())
}

#[test]
fn test_steady_state_performs_no_io() -> Result<()> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config_path = write_engine_config(temp_dir.path());

    let provider = CountingProvider::new();
    let mut store = open_store(&config_path, provider.clone())?;
    let appearance = store.register(appearance())?;
    let keymaps = store.register(keymaps())?;
    store.load(&AcceptMigration)?;

    appearance.lock().expect("component lock").update(|a| a.font_size = 15);
    keymaps
        .lock()
        .expect("component lock")
        .set_state(Some(keymap_state(&["Default"])));
    store.save(&ReportReadonly)?.into_result()?;
    let after_first_save = provider.mutations();
    assert_eq!(after_first_save, 2);

    for _ in 0..3 {
        assert!(store.save(&ReportReadonly)?.into_result()?.is_empty());
    }
    assert_eq!(provider.mutations(), after_first_save);
    Ok(())
}
