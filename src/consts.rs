use const_format::concatcp;

pub const REPO_NAMASTE_FILE: &str = "0=ocfl_1.0";
pub const REPO_NAMASTE_CONTENT: &str = "ocfl_1.0\n";
pub const OBJECT_NAMASTE_FILE: &str = "0=ocfl_object_1.0";
pub const OBJECT_NAMASTE_CONTENT: &str = "ocfl_object_1.0\n";
pub const INVENTORY_FILE: &str = "inventory.json";
pub const OCFL_LAYOUT_FILE: &str = "ocfl_layout.json";
pub const EXTENSIONS_DIR: &str = "extensions";
pub const EXTENSIONS_CONFIG_FILE: &str = "config.json";
pub const INVENTORY_TYPE: &str = "https://ocfl.io/1.0/spec/#inventory";

pub const DEFAULT_CONTENT_DIR: &str = "content";

pub const MUTABLE_HEAD_EXTENSION: &str = "0005-mutable-head";
pub const MUTABLE_HEAD_EXT_DIR: &str = concatcp!(EXTENSIONS_DIR, "/", MUTABLE_HEAD_EXTENSION);
pub const MUTABLE_HEAD_DIR: &str = concatcp!(MUTABLE_HEAD_EXT_DIR, "/head");
pub const MUTABLE_HEAD_INVENTORY_FILE: &str = concatcp!(MUTABLE_HEAD_DIR, "/", INVENTORY_FILE);
pub const MUTABLE_HEAD_REVISIONS_DIR: &str = concatcp!(MUTABLE_HEAD_EXT_DIR, "/revisions");
/// Prefix of the root sidecar snapshot stored inside the mutable HEAD extension
pub const ROOT_SIDECAR_SNAPSHOT_PREFIX: &str = "root-";

pub const FLAT_LAYOUT_EXTENSION: &str = "0006-flat-layout";
pub const FLAT_OMIT_PREFIX_LAYOUT_EXTENSION: &str = "0006-flat-omit-prefix-storage-layout";
pub const HASHED_NTUPLE_LAYOUT_EXTENSION: &str = "0003-hashed-n-tuple-trees";
pub const NTUPLE_OMIT_PREFIX_LAYOUT_EXTENSION: &str = "0007-n-tuple-omit-prefix-storage-layout";

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    FLAT_LAYOUT_EXTENSION,
    FLAT_OMIT_PREFIX_LAYOUT_EXTENSION,
    HASHED_NTUPLE_LAYOUT_EXTENSION,
    NTUPLE_OMIT_PREFIX_LAYOUT_EXTENSION,
    MUTABLE_HEAD_EXTENSION,
];
