mod available;
mod error;
mod required;

pub use available::AvailablePackages;
pub use error::ResolveError;
pub use required::{ManifestEntry, RequiredPackages};
