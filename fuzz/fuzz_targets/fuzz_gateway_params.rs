#![no_main]

use libfuzzer_sys::fuzz_target;

use snmp_gateway::config::{GatewayConfig, parse_properties};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut params = parse_properties(text);
    // Keep the resolver out of the loop
    params.remove("host");
    let _ = GatewayConfig::from_params(&params);
});
