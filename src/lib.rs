//! Artifact Patcher: in-place patching of downloaded client archives
//!
//! Rewrites constants inside compiled, opaque archive contents so a client
//! artifact talks to a different trust anchor and server: the embedded RSA
//! modulus, a hard-coded loopback check, the server port, and whole files.
//!
//! # Architecture
//!
//! [`ArtifactPatcher`] extracts an archive into a scratch directory, runs
//! every applicable [`Strategy`] in order, repackages, re-signs archives that
//! were signed, and atomically replaces the original. Strategies locate their
//! targets with plain byte search and rewrite them with two framing
//! primitives: length-prefixed strings and fixed-width values.
//!
//! # Safety
//!
//! - The original artifact is only replaced by a final same-directory rename
//! - Any strategy failure aborts the run before that rename
//! - Scratch deletion never follows symbolic links
//! - Whole-file replacements are guarded by a baseline copy
//! - Re-running on a patched artifact reports already-applied patches
//!
//! # Example
//!
//! ```no_run
//! use artifact_patcher::{Artifact, ArtifactPatcher, KeystoreSigner, ResourceLayout, Strategy, ZipCodec};
//!
//! let layout = ResourceLayout::new("/var/lib/patcher/resources");
//! let patcher = ArtifactPatcher::new(
//!     "/var/lib/patcher/repository",
//!     "/var/lib/patcher/temp",
//!     Strategy::standard_set(&layout, 43594),
//!     ZipCodec,
//!     KeystoreSigner::new(layout.keystore("signing-keystore.pem"), "123456", "test"),
//! );
//!
//! match patcher.patch(&Artifact::new("injected-client-1.10.3.jar", "")) {
//!     Ok(outcome) => println!("{}", outcome),
//!     Err(e) => eprintln!("patch failed: {}", e),
//! }
//! ```

pub mod archive;
pub mod bytes;
pub mod config;
pub mod edit;
pub mod key;
pub mod launcher;
pub mod patcher;
pub mod safety;
pub mod signing;
pub mod staging;
pub mod strategy;
pub mod telemetry;

// Re-exports
pub use archive::{ArchiveCodec, ArchiveError, ArchiveMetadata, TextEncoding, ZipCodec};
pub use bytes::{index_of, index_of_from, FramingError};
pub use config::{load_from_path, load_from_str, ConfigError, PatcherConfig, ResolvedPaths};
pub use edit::{EditError, EditResult, FileEdit};
pub use launcher::{Bootstrap, LaunchError, Plan, RunContext, RunOptions, Selection};
pub use patcher::{Artifact, ArtifactError, ArtifactPatcher, PatchOutcome};
pub use safety::{SafetyError, ScratchDir};
pub use signing::{ArchiveSigner, KeystoreSigner, SignOutcome, SigningError};
pub use staging::{stage_resources, ResourceLayout, StagingError, StagingReport};
pub use strategy::{PatchError, PatchResult, Strategy};
