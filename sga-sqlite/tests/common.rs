use sga_core::models::UserId;
use sga_sqlite::{Database, Storage};

/// Open a fresh named in-memory database (the memdb VFS shares one store
/// across both pools of a single test without touching disk).
pub fn open_db() -> Database {
    let name = format!("test-{}", UserId::generate());
    Database::open_storage(Storage::Memory(name)).expect("database should open")
}
