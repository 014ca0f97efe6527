#![no_main]

use libfuzzer_sys::fuzz_target;
use retro_party_client::session::{MemoryStorage, SessionStorage, SessionStore, SESSION_KEY};

fuzz_target!(|data: &[u8]| {
    let storage = MemoryStorage::new();
    storage.set_item(SESSION_KEY, String::from_utf8_lossy(data).into_owned());
    let store = SessionStore::new(storage);

    // A stored record is either a full session or nothing; never a panic.
    if let Some(session) = store.get() {
        store.save(&session);
        assert_eq!(store.get(), Some(session));
    }
});
