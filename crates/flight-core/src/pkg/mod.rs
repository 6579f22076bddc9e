//! Package management: manifest, registry, download, extraction and the
//! install/uninstall orchestration built on them.

pub mod error;
pub mod fetch;
pub mod install;
pub mod manifest;
pub mod registry;
pub mod spec;
pub mod tarball;
pub mod uninstall;

pub use error::{codes as pkg_codes, PkgError};
pub use fetch::{fetch_archive, StagedArchive, MAX_TARBALL_SIZE};
pub use install::{InstallOutcome, InstallReport, InstallStatus, Installer};
pub use manifest::{Manifest, MANIFEST_NAME};
pub use registry::{
    Packument, RegistryClient, ResolvedPackage, DEFAULT_REGISTRY, DEFAULT_TAG, MAX_PACKUMENT_SIZE,
    REGISTRY_ENV,
};
pub use spec::{PackageSpec, VersionHint};
pub use tarball::{install_archive, PlacementGate};
pub use uninstall::{uninstall_one, UninstallOutcome};
