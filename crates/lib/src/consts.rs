/// Application name used for data directories and store paths.
pub const APP_NAME: &str = "fanout";

/// Length of the truncated hash used for store directory names.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Marker file written into a store entry once it is complete.
pub const COMPLETE_MARKER: &str = ".fanout-complete";

/// Project configuration file name, looked up at the source root.
pub const CONFIG_FILENAME: &str = "fanout.toml";

/// Ignore file read by the source fingerprinter.
pub const IGNORE_FILENAME: &str = ".fanoutignore";

/// Value of `SOURCE_DATE_EPOCH` for builds (1980-01-01, the ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";
