//! Named data repository backed by `.dat` files.

pub mod datafile;
pub mod error;
pub mod repository;
pub mod settings;

pub use datafile::{Datafile, DatafileEntry};
pub use error::{SettingsError, StoreError};
pub use repository::{DataRepository, RepositoryConfig};
pub use settings::{load_settings, load_settings_from_path, PdashSettings};
