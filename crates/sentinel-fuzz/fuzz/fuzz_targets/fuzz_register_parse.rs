#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_oauth_wrapper::server::oauth::handlers::RegisterRequest;

fuzz_target!(|data: &[u8]| {
    // Should never panic, only return Ok or Err
    let _ = serde_json::from_slice::<RegisterRequest>(data);
});
