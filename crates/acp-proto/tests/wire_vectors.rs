//! Wire-format vectors captured from a live base station.
//!
//! These pin the exact byte layout of the framing layer: keystream,
//! obfuscated header key, packed headers, and a complete get-property
//! exchange frame.

use acp_proto::{
    Command, Message, adler32, generate_header_key, keystream,
    property::{ParsedElement, PropName, Property, compose_element, parse_element},
};

#[test]
fn keystream_vector() {
    assert_eq!(hex::encode(keystream(20)), "0e39f805c401554f0cac857d868ab5173e09c835");
}

#[test]
fn header_key_vector() {
    assert_eq!(
        hex::encode(generate_header_key("testing")),
        "7a5c8b71ad6f324f0cac857d868ab5173e09c835f431657f3c9cb56d969aa507"
    );
}

#[test]
fn get_property_frame_vector() {
    let payload = compose_element(0, &Property::request(PropName::new("dbug").unwrap()));
    assert_eq!(hex::encode(&payload), "64627567000000000000000400000000");

    let message = Message::get_property(Some("testing"), 4, payload.clone());
    let wire = message.compose();

    assert_eq!(wire.len(), 144);
    assert_eq!(
        hex::encode(&wire[..32]),
        "61637070000300011bef117b17c301a700000010000000040000000000000014"
    );
    assert_eq!(hex::encode(&wire[48..80]), hex::encode(generate_header_key("testing")));
    assert_eq!(&wire[128..], payload.as_slice());

    let parsed = Message::parse(&wire).expect("vector frame parses");
    assert_eq!(parsed.version, 196_609);
    assert_eq!(parsed.flags, 4);
    assert_eq!(parsed.command, Command::GetProperty);
    assert_eq!(parsed.body_size(), 16);
    assert_eq!(parsed.body_checksum(), 398_655_911);
    assert_eq!(parsed, message);
}

#[test]
fn element_with_numeric_value_vector() {
    let wire = hex::decode("64627567000000000000000400003000").unwrap();
    let (parsed, rest) = parse_element(&wire).expect("element parses");
    assert!(rest.is_empty());

    let ParsedElement::Element(element) = parsed else {
        panic!("expected an element, got the sentinel");
    };
    assert_eq!(element.name, PropName::new("dbug").unwrap());

    let mut value = [0u8; 4];
    value.copy_from_slice(&element.value);
    assert_eq!(u32::from_be_bytes(value), 0x3000);
}

#[test]
fn header_checksum_is_adler_over_zeroed_field() {
    let wire = Message::get_features().compose();

    let mut zeroed = wire.clone();
    zeroed[8..12].fill(0);

    let mut stored = [0u8; 4];
    stored.copy_from_slice(&wire[8..12]);
    assert_eq!(u32::from_be_bytes(stored), adler32(&zeroed));
}
