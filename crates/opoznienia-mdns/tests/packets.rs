//! Decoding packets laid out the way other mDNS responders send them.

use std::net::Ipv4Addr;

use opoznienia_mdns::{
    Answer, DomainName, Message, QType, RecordData, ResourceRecord, Response, WireError,
};

/// Response with a compressed PTR target and a compressed A owner name,
/// the A record carrying the cache-flush bit in its class.
fn compressed_announcement() -> Vec<u8> {
    let mut buf = vec![
        0, 0, 0x84, 0, // id, QR|AA
        0, 0, 0, 2, 0, 0, 0, 0, // 0 questions, 2 answers
    ];
    // offset 12: _opoznienia._udp.local.
    buf.push(11);
    buf.extend_from_slice(b"_opoznienia");
    buf.push(4);
    buf.extend_from_slice(b"_udp");
    buf.push(5);
    buf.extend_from_slice(b"local");
    buf.push(0);
    buf.extend_from_slice(&[0, 12, 0, 1, 0, 0, 0, 120, 0, 6]);
    // offset 46: box + pointer to 12
    buf.push(3);
    buf.extend_from_slice(b"box");
    buf.extend_from_slice(&[0xC0, 12]);
    // A record owned by the name at 46
    buf.extend_from_slice(&[0xC0, 46, 0, 1, 0x80, 0x01, 0, 0, 0, 120, 0, 4]);
    buf.extend_from_slice(&[192, 168, 1, 7]);
    buf
}

#[test]
fn compressed_announcement_decodes() {
    let response = Response::decode(&compressed_announcement()).unwrap();
    assert_eq!(response.answers.len(), 2);

    let instance: DomainName = "box._opoznienia._udp.local.".parse().unwrap();
    let ptr = &response.answers[0];
    assert_eq!(ptr.name.to_string(), "_opoznienia._udp.local.");
    assert_eq!(ptr.record.ttl(), 120);
    assert_eq!(ptr.record.data(), &RecordData::Ptr(instance.clone()));

    let a = &response.answers[1];
    assert_eq!(a.name, instance);
    assert_eq!(a.record.class(), 0x8001);
    assert_eq!(
        a.record.data(),
        &RecordData::A(Ipv4Addr::new(192, 168, 1, 7))
    );
}

#[test]
fn truncated_announcement_is_rejected() {
    let packet = compressed_announcement();
    for len in [5, 20, 50, packet.len() - 1] {
        assert!(
            matches!(
                Message::decode(&packet[..len]),
                Err(WireError::Truncated { .. })
            ),
            "prefix of {len} bytes accepted"
        );
    }
}

#[test]
fn forward_pointer_is_rejected() {
    let mut packet = compressed_announcement();
    // Point the A owner name at itself.
    let a_owner = packet.len() - 16;
    packet[a_owner + 1] = u8::try_from(a_owner).unwrap();
    assert!(matches!(
        Response::decode(&packet),
        Err(WireError::BadPointer { .. })
    ));
}

#[test]
fn query_with_unicast_response_bit_decodes() {
    // PTR question for _ssh._tcp.local. with QU set in the class
    let mut packet = vec![0x12, 0x34, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
    for label in ["_ssh", "_tcp", "local"] {
        packet.push(u8::try_from(label.len()).unwrap());
        packet.extend_from_slice(label.as_bytes());
    }
    packet.extend_from_slice(&[0, 0, 12, 0x80, 0x01]);

    let Message::Query(query) = Message::decode(&packet).unwrap() else {
        panic!("expected a query");
    };
    assert_eq!(query.id, 0x1234);
    assert_eq!(query.questions.len(), 1);
    assert_eq!(query.questions[0].qtype, QType::PTR);
    assert_eq!(query.questions[0].qclass, 0x8001);
    assert_eq!(query.questions[0].name.to_string(), "_ssh._tcp.local.");
}

#[test]
fn binary_instance_label_keeps_other_answers() {
    // Another responder announcing an instance whose label is not UTF-8.
    let service: DomainName = "_opoznienia._udp.local.".parse().unwrap();
    let foreign = DomainName::from_labels([
        &[b'p', 0xC3, 0x28, b'c'][..],
        &b"_opoznienia"[..],
        &b"_udp"[..],
        &b"local"[..],
    ])
    .unwrap();
    let instance: DomainName = "box._opoznienia._udp.local.".parse().unwrap();
    let packet = Response::new(vec![
        Answer::new(service.clone(), ResourceRecord::ptr(120, foreign.clone())),
        Answer::new(service, ResourceRecord::ptr(120, instance.clone())),
        Answer::new(instance, ResourceRecord::a(120, Ipv4Addr::new(10, 1, 2, 3))),
    ])
    .encode()
    .unwrap();

    let response = Response::decode(&packet).unwrap();
    assert_eq!(response.answers.len(), 3);
    assert_eq!(response.answers[0].record.data(), &RecordData::Ptr(foreign));
    assert_eq!(
        response.answers[2].record.data(),
        &RecordData::A(Ipv4Addr::new(10, 1, 2, 3))
    );
}
