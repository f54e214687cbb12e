//! Client operations against a scripted station.
//!
//! Each test accepts one connection, parses the client's request with the
//! raw codecs, and writes back a canned response, covering both response
//! shapes stations use (coalesced body and streamed elements).

use acp_client::{Client, ClientError, PropertyReply};
use acp_proto::{
    Command, HEADER_SIZE, Message, MessageHeader, Value,
    payloads::rpc::{RpcRequest, RpcResponse},
    property::{
        PropName, Property, PropertyError, PropertyValue, SENTINEL, compose_element,
        compose_element_list, parse_element_list,
    },
};
use bytes::Bytes;
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn read_request(stream: &mut TcpStream) -> Message {
    let mut header_bytes = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header_bytes).await.unwrap();
    let header = MessageHeader::parse(&header_bytes).unwrap();

    let body = if header.body_size >= 0 {
        let mut body = vec![0u8; header.body_size as usize];
        stream.read_exact(&mut body).await.unwrap();
        Some(Bytes::from(body))
    } else {
        None
    };
    Message::from_parts(&header, body).unwrap()
}

async fn connected_client(listener: &TcpListener) -> (Client, TcpStream) {
    let port = listener.local_addr().unwrap().port();
    let accept = listener.accept();

    let mut client = Client::new("127.0.0.1", "testing").with_port(port);
    let (connected, accepted) = tokio::join!(client.connect(TIMEOUT), accept);
    connected.unwrap();
    let (peer, _) = accepted.unwrap();
    (client, peer)
}

#[tokio::test]
async fn echo_round_trips_the_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut client, mut peer) = connected_client(&listener).await;

    let station = tokio::spawn(async move {
        let request = read_request(&mut peer).await;
        assert_eq!(request.command, Command::Echo);
        let reply = Message::response(&request, 0, request.body.clone());
        peer.write_all(&reply.compose()).await.unwrap();
    });

    let body = client.echo(Bytes::from_static(b"ping?")).await.unwrap();
    assert_eq!(&body[..], b"ping?");
    station.await.unwrap();
}

#[tokio::test]
async fn get_properties_parses_a_coalesced_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut client, mut peer) = connected_client(&listener).await;

    let station = tokio::spawn(async move {
        let request = read_request(&mut peer).await;
        assert_eq!(request.command, Command::GetProperty);

        // Request is a run of name elements ending at the sentinel
        let requested = parse_element_list(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(requested.len(), 2);
        assert_eq!(requested[0].name, PropName::new("syNm").unwrap());

        let body = compose_element_list(&[
            Property::typed(
                PropName::new("syNm").unwrap(),
                &PropertyValue::Str("Attic Base Station".to_owned()),
            ),
            Property::typed(PropName::new("dbug").unwrap(), &PropertyValue::Hex(0x3000)),
        ]);
        let reply = Message::response(&request, 0, Some(Bytes::from(body)));
        peer.write_all(&reply.compose()).await.unwrap();
    });

    let properties = client.get_properties(&["syNm", "dbug"]).await.unwrap();
    assert_eq!(properties.len(), 2);
    assert_eq!(
        properties[0].decode().unwrap(),
        PropertyValue::Str("Attic Base Station".to_owned())
    );
    assert_eq!(properties[1].decode().unwrap(), PropertyValue::Hex(0x3000));
    station.await.unwrap();
}

#[tokio::test]
async fn get_properties_parses_a_streamed_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut client, mut peer) = connected_client(&listener).await;

    let station = tokio::spawn(async move {
        let request = read_request(&mut peer).await;

        // Bare acknowledgement first, then raw elements on the socket
        let ack = Message::response(&request, 0, None);
        peer.write_all(&ack.compose()).await.unwrap();

        let element = compose_element(
            0,
            &Property::typed(PropName::new("dbug").unwrap(), &PropertyValue::Hex(0x3000)),
        );
        peer.write_all(&element).await.unwrap();
        peer.write_all(&SENTINEL).await.unwrap();
    });

    let properties = client.get_properties(&["dbug"]).await.unwrap();
    assert_eq!(properties.len(), 1);
    assert_eq!(properties[0].decode().unwrap(), PropertyValue::Hex(0x3000));
    station.await.unwrap();
}

#[tokio::test]
async fn per_property_errors_surface_both_ways() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let respond_with_error = |mut peer: TcpStream| async move {
        let request = read_request(&mut peer).await;

        let mut body = compose_element(
            0,
            &Property::typed(PropName::new("syNm").unwrap(), &PropertyValue::Str("A".to_owned())),
        );
        // Error element: flags bit 0, value is the status code
        let failed = Property::new(
            PropName::new("zzzz").unwrap(),
            (-10i32).to_be_bytes().to_vec(),
        );
        body.extend_from_slice(&compose_element(1, &failed));
        body.extend_from_slice(&SENTINEL);

        let reply = Message::response(&request, 0, Some(Bytes::from(body)));
        peer.write_all(&reply.compose()).await.unwrap();
    };

    // Strict mode: the first error aborts the call
    let (mut client, peer) = connected_client(&listener).await;
    let station = tokio::spawn(respond_with_error(peer));
    let err = client.get_properties(&["syNm", "zzzz"]).await.unwrap_err();
    assert_eq!(err, ClientError::Property(PropertyError::ServerError(-10)));
    station.await.unwrap();

    // Mixed mode: entries come back in request order
    let (mut client, peer) = connected_client(&listener).await;
    let station = tokio::spawn(respond_with_error(peer));
    let replies = client.get_properties_with_errors(&["syNm", "zzzz"]).await.unwrap();
    assert_eq!(replies.len(), 2);
    assert!(matches!(replies[0], PropertyReply::Value(_)));
    assert_eq!(
        replies[1],
        PropertyReply::Error { name: PropName::new("zzzz").unwrap(), code: -10 }
    );
    station.await.unwrap();
}

#[tokio::test]
async fn set_properties_reports_per_record_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut client, mut peer) = connected_client(&listener).await;

    let station = tokio::spawn(async move {
        let request = read_request(&mut peer).await;
        assert_eq!(request.command, Command::SetProperty);

        let records = parse_element_list(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(records.len(), 1);

        // Success record: four zero bytes
        let body = compose_element_list(&[Property::new(
            records[0].name,
            vec![0u8; 4],
        )]);
        let reply = Message::response(&request, 0, Some(Bytes::from(body)));
        peer.write_all(&reply.compose()).await.unwrap();
    });

    let property = Property::typed(PropName::new("acRB").unwrap(), &PropertyValue::Dec(0));
    client.set_properties(&[property]).await.unwrap();
    station.await.unwrap();
}

#[tokio::test]
async fn rpc_failure_status_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut client, mut peer) = connected_client(&listener).await;

    let station = tokio::spawn(async move {
        let request = read_request(&mut peer).await;
        assert_eq!(request.command, Command::Rpc);

        let call = RpcRequest::decode(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(call.function, "wifi.scan");

        let body = RpcResponse { status: 22, outputs: Value::dict(vec![]) }.encode();
        let reply = Message::response(&request, 0, Some(Bytes::from(body)));
        peer.write_all(&reply.compose()).await.unwrap();
    });

    let err = client.rpc("wifi.scan", Value::dict(vec![])).await.unwrap_err();
    assert_eq!(err, ClientError::RpcFailed(22));
    station.await.unwrap();
}

#[tokio::test]
async fn mismatched_reply_command_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (mut client, mut peer) = connected_client(&listener).await;

    let station = tokio::spawn(async move {
        let request = read_request(&mut peer).await;
        let mut reply = Message::response(&request, 0, request.body.clone());
        reply.command = Command::GetProperty;
        peer.write_all(&reply.compose()).await.unwrap();
    });

    let err = client.echo(Bytes::from_static(b"x")).await.unwrap_err();
    assert_eq!(
        err,
        ClientError::UnexpectedCommand { expected: Command::Echo, got: Command::GetProperty }
    );
    station.await.unwrap();
}
