//! Streaming facade contract: completed messages come out as byte payloads.

mod common;

use std::net::{IpAddr, Ipv4Addr};

use httpsniff::{Listener, RawInput};

use common::build_tcp_segment;

fn peer() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 99))
}

#[tokio::test(start_paused = true)]
async fn test_facade_streams_message_payloads() {
    let (listener, feed) = Listener::with_feed(80);
    let mut input = RawInput::from_listener("127.0.0.1:80".to_string(), listener);

    let segment = build_tcp_segment(80, 54321, 1000, 42, b"GET / HTTP/1.1\r\n\r\n");
    feed.push_segment(peer(), "10.0.0.1", "10.0.0.2", &segment).await;

    let payload = input.recv().await.expect("one payload");
    assert_eq!(payload, b"GET / HTTP/1.1\r\n\r\n");
}

#[tokio::test(start_paused = true)]
async fn test_read_copies_into_caller_buffer() {
    let (listener, feed) = Listener::with_feed(80);
    let mut input = RawInput::from_listener("127.0.0.1:80".to_string(), listener);

    let segment = build_tcp_segment(80, 54321, 1000, 42, b"hello");
    feed.push_segment(peer(), "10.0.0.1", "10.0.0.2", &segment).await;

    let mut buf = [0u8; 64];
    let n = input.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"hello");
}

#[tokio::test(start_paused = true)]
async fn test_read_truncates_to_destination_length() {
    let (listener, feed) = Listener::with_feed(80);
    let mut input = RawInput::from_listener("127.0.0.1:80".to_string(), listener);

    let segment = build_tcp_segment(80, 54321, 1000, 42, b"hello world");
    feed.push_segment(peer(), "10.0.0.1", "10.0.0.2", &segment).await;

    let mut buf = [0u8; 5];
    let n = input.read(&mut buf).await.unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buf, b"hello");
}

#[tokio::test(start_paused = true)]
async fn test_read_returns_zero_at_end_of_stream() {
    let (listener, feed) = Listener::with_feed(80);
    let mut input = RawInput::from_listener("127.0.0.1:80".to_string(), listener);
    drop(feed);

    let mut buf = [0u8; 8];
    assert_eq!(input.read(&mut buf).await.unwrap(), 0);
}
