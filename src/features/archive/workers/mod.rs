mod archive_watcher;

pub use archive_watcher::ArchiveWatcher;
