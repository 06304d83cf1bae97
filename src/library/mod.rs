pub mod manifest;
pub mod package;
pub mod remote;
pub mod store;

pub use manifest::LibraryManifest;
pub use package::ShapeLibrary;
pub use remote::{RemoteLibraries, ServiceHealth};
pub use store::{default_store_dir, sanitize_name, LibraryStore, LibrarySummary};
