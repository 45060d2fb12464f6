/// Tag of a component fragment inside a storage root
pub const COMPONENT_TAG: &str = "component";

/// Attribute carrying the component registration key
pub const NAME_ATTR: &str = "name";

/// Root attribute carrying the on-disk format version
pub const VERSION_ATTR: &str = "version";

/// Root attribute written by older project formats
pub const RELATIVE_PATHS_ATTR: &str = "relativePaths";

/// Root tag of application-level storage files
pub const APPLICATION_ROOT: &str = "application";

/// Root tag of project-level storage files
pub const PROJECT_ROOT: &str = "project";

/// Root tag of module-level storage files
pub const MODULE_ROOT: &str = "module";

/// Current project/module format version
pub const CURRENT_FORMAT_VERSION: u32 = 4;

/// Extension of every file a directory-based storage owns
pub const STATE_FILE_EXTENSION: &str = "xml";

/// Suffix appended to migration backups
pub const BACKUP_EXTENSION: &str = "bak";

/// Application configuration directory
pub const APP_CONFIG_MACRO: &str = "$APP_CONFIG$";

/// Project configuration directory (directory-based project format)
pub const PROJECT_CONFIG_DIR_MACRO: &str = "$PROJECT_CONFIG_DIR$";

/// Project file (file-based project format)
pub const PROJECT_FILE_MACRO: &str = "$PROJECT_FILE$";

/// Project base directory
pub const PROJECT_DIR_MACRO: &str = "$PROJECT_DIR$";

/// Module file
pub const MODULE_FILE_MACRO: &str = "$MODULE_FILE$";

/// Module base directory
pub const MODULE_DIR_MACRO: &str = "$MODULE_DIR$";

/// User home directory
pub const USER_HOME_MACRO: &str = "$USER_HOME$";

/// Legacy combined file for application components without a storage spec
pub const DEFAULT_APP_STORAGE: &str = "$APP_CONFIG$/other.xml";
