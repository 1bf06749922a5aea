#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_oauth_wrapper::server::oauth::handlers::with_code_params;
use url::Url;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // First line is the redirect target, the rest is the state value.
    let (target, state) = input.split_once('\n').unwrap_or((input, ""));
    let Ok(target) = Url::parse(target) else {
        return;
    };

    let state = (!state.is_empty()).then_some(state);
    let merged = with_code_params(target.clone(), "fuzzcode", state);

    assert_eq!(merged.scheme(), target.scheme());
    assert_eq!(merged.host_str(), target.host_str());
    assert!(merged.query_pairs().any(|(k, v)| k == "code" && v == "fuzzcode"));
});
