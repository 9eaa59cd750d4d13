#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use snmp_gateway::ber::Decoder;
use snmp_gateway::message::{CommunityMessage, Message, V3Message};
use snmp_gateway::pdu::Pdu;
use snmp_gateway::v3::UsmSecurityParams;

fuzz_target!(|data: &[u8]| {
    let bytes = Bytes::copy_from_slice(data);

    // Unified decoder, as the agent's receive loop uses it
    let _ = Message::decode(bytes.clone());

    let _ = CommunityMessage::decode(bytes.clone());

    let mut decoder = Decoder::new(bytes.clone());
    let _ = V3Message::decode(&mut decoder);

    let mut decoder = Decoder::new(bytes.clone());
    let _ = UsmSecurityParams::decode(&mut decoder);

    let mut decoder = Decoder::new(bytes);
    let _ = Pdu::decode(&mut decoder);
});
