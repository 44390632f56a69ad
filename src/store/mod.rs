pub mod manager;
pub mod persist;
pub mod watcher;

pub use manager::{SessionStoreHandle, StoreError};
pub use persist::{PersistenceError, SessionPersistence};
pub use watcher::SessionDirWatcher;
