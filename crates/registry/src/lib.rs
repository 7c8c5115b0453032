//! Plugin index client: release lookup, version specifier matching, and
//! archive download.

pub mod client;
pub mod version;

pub use {
    client::{DEFAULT_INDEX_URL, IndexError, PackageIndex, Release, ReleaseSet},
    version::{CmpOp, PluginRequest, Version, VersionSpecifier},
};
