//! bnd core library: naming grammar, domain types, configuration, storage.
//!
//! Public API surface:
//! - [`naming`]: pure name formatting / parsing
//! - [`types`]: newtypes, manifests and conventions
//! - [`config`]: load / save / init of `~/.bnd/config.yaml`
//! - [`storage`]: the [`Storage`] abstraction and [`LocalStorage`]
//! - [`error`]: [`NamingError`], [`StorageError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod naming;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, NamingError, StorageError};
pub use storage::{contents_equal, copy_with_metadata, Entry, FileStamp, LocalStorage, Storage};
pub use types::{
    BehaviorConventions, BehaviorFileRule, Conventions, DataKind, ExtraFileRules, FileManifest,
    ProcessingLevel, SessionName, SubjectName, VideoConventions,
};
