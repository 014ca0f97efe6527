#![no_main]

use libfuzzer_sys::fuzz_target;
use retro_party_client::protocol::{GameStateResponse, ServerEvent};

fuzz_target!(|data: &[u8]| {
    // Raw bytes exercise serde_json's own UTF-8 validation.
    let _ = serde_json::from_slice::<ServerEvent>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(event) = serde_json::from_str::<ServerEvent>(s) {
            // Whatever decodes must encode again.
            let _ = serde_json::to_string(&event);
        }
        let _ = serde_json::from_str::<GameStateResponse>(s);
    }
});
