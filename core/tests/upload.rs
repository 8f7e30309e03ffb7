//! Chunked upload sequencing against a scripted media endpoint.

mod support;

use std::io::{self, Read};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use courier_core::auth::NoAuth;
use courier_core::log::NullLog;
use courier_core::service::JsonService;
use courier_core::upload::{UploadSource, UploadState};
use courier_core::{Client, ClientConfig, HttpMethod, HttpRequest, HttpResponse, RequestBody, ResponseError};
use support::{param, Scripted};

const MIB: usize = 1024 * 1024;

fn client(config: ClientConfig, transport: Arc<Scripted>) -> Client<NoAuth> {
    Client::builder(config, NoAuth)
        .transport(transport)
        .log(Arc::new(NullLog))
        .build()
        .unwrap()
}

fn config() -> ClientConfig {
    ClientConfig {
        upload_url: Some("https://upload.example.com/1.1/media/upload.json".into()),
        ..ClientConfig::new("https://api.example.com/1.1")
    }
}

fn command(request: &HttpRequest) -> String {
    param(request, "command").unwrap_or_default()
}

/// Media endpoint that accepts everything, failing APPEND at `fail_at`.
fn media_endpoint(fail_at: Option<u64>) -> Arc<Scripted> {
    Scripted::with_handler(move |request| {
        let reply = match command(request).as_str() {
            "INIT" => HttpResponse::new(202, r#"{"media_id":"42"}"#),
            "APPEND" => {
                let index: u64 = param(request, "segment_index").unwrap().parse().unwrap();
                if Some(index) == fail_at {
                    HttpResponse::new(500, r#"{"errors":[{"message":"segment rejected"}]}"#)
                } else {
                    HttpResponse::new(204, "")
                }
            }
            "FINALIZE" => HttpResponse::new(200, r#"{"media_id_string":"42","size":0}"#),
            _ => HttpResponse::new(400, r#"{"errors":[]}"#),
        };
        Ok(reply)
    })
}

fn appends(transport: &Scripted) -> Vec<HttpRequest> {
    transport
        .requests()
        .into_iter()
        .filter(|r| command(r) == "APPEND")
        .collect()
}

#[test]
fn five_mib_at_three_mib_chunks_sends_two_appends() {
    let transport = media_endpoint(None);
    let client = client(config(), transport.clone());

    let bytes: Vec<u8> = (0..5 * MIB).map(|i| (i % 251) as u8).collect();
    let outcome = client
        .uploader()
        .run(UploadSource::from_bytes(bytes.clone(), "video/mp4"), Some("tweet_video"))
        .unwrap();

    assert!(outcome.response.is_successful());
    assert_eq!(outcome.response.get("media_id_string").unwrap(), "42");
    let session = outcome.session.unwrap();
    assert_eq!(session.state, UploadState::Completed);
    assert_eq!(session.segment_index, 2);

    let sent = transport.requests();
    let commands: Vec<String> = sent.iter().map(command).collect();
    assert_eq!(commands, ["INIT", "APPEND", "APPEND", "FINALIZE"]);

    let init = &sent[0];
    assert_eq!(init.method, HttpMethod::Post);
    assert_eq!(param(init, "total_bytes").as_deref(), Some("5242880"));
    assert_eq!(param(init, "media_type").as_deref(), Some("video/mp4"));
    assert_eq!(param(init, "media_category").as_deref(), Some("tweet_video"));

    let mut uploaded = Vec::new();
    for (index, append) in appends(&transport).iter().enumerate() {
        assert_eq!(param(append, "segment_index"), Some(index.to_string()));
        assert_eq!(param(append, "media_id").as_deref(), Some("42"));
        let chunk = STANDARD.decode(param(append, "media_data").unwrap()).unwrap();
        assert_eq!(chunk.len(), if index == 0 { 3 * MIB } else { 2 * MIB });
        uploaded.extend(chunk);
    }
    assert_eq!(uploaded, bytes);
}

#[test]
fn failed_append_stops_the_sequence() {
    let transport = media_endpoint(Some(1));
    let client = client(config(), transport.clone());

    let outcome = client
        .uploader()
        .with_chunk_size(10)
        .run(UploadSource::from_bytes(vec![7; 65], "image/gif"), None)
        .unwrap();

    assert!(!outcome.response.is_successful());
    assert_eq!(outcome.response.status(), Some(500));
    assert!(outcome.response.errors().is_none());
    assert_eq!(outcome.session.unwrap().state, UploadState::Failed);

    let indices: Vec<String> = appends(&transport)
        .iter()
        .map(|r| param(r, "segment_index").unwrap())
        .collect();
    assert_eq!(indices, ["0", "1"]);
    assert!(transport.requests().iter().all(|r| command(r) != "FINALIZE"));
}

#[test]
fn zero_byte_media_sends_exactly_one_append() {
    let transport = media_endpoint(None);
    let client = client(config(), transport.clone());

    let response = client
        .uploader()
        .upload(UploadSource::from_bytes(Vec::new(), "image/png"), None)
        .unwrap();

    assert!(response.is_successful());
    let appends = appends(&transport);
    assert_eq!(appends.len(), 1);
    assert_eq!(param(&appends[0], "media_data").as_deref(), Some(""));
    assert_eq!(param(&appends[0], "segment_index").as_deref(), Some("0"));
}

#[test]
fn sub_chunk_media_sends_one_append() {
    let transport = media_endpoint(None);
    let client = client(config(), transport.clone());
    client
        .uploader()
        .upload(UploadSource::from_bytes(vec![1; 1000], "image/png"), None)
        .unwrap();
    assert_eq!(appends(&transport).len(), 1);
}

#[test]
fn failed_init_is_returned_without_further_calls() {
    let transport = Scripted::new();
    transport.reply(400, r#"{"errors":[{"code":324,"message":"bad media"}]}"#);
    let client = client(config(), transport.clone());

    let outcome = client
        .uploader()
        .run(UploadSource::from_bytes(vec![1; 10], "image/png"), None)
        .unwrap();
    assert_eq!(outcome.response.status(), Some(400));
    assert!(outcome.session.is_none());
    assert_eq!(transport.count(), 1);
}

#[test]
fn init_without_media_id_fails() {
    let transport = Scripted::new();
    transport.reply(200, r#"{"expires_after_secs":86400}"#);
    let client = client(config(), transport.clone());

    let response = client
        .uploader()
        .upload(UploadSource::from_bytes(vec![1; 10], "image/png"), None)
        .unwrap();
    assert!(!response.is_successful());
    assert!(matches!(response.errors(), Some(ResponseError::Upload(_))));
    assert_eq!(response.status(), Some(200));
    assert_eq!(transport.count(), 1);
}

#[test]
fn numeric_media_id_is_accepted() {
    let transport = Scripted::new();
    transport.reply(202, r#"{"media_id":710511363345354753}"#);
    let client = client(config(), transport.clone());

    client
        .uploader()
        .upload(UploadSource::from_bytes(vec![1; 4], "image/png"), None)
        .unwrap();
    let append = &transport.requests()[1];
    assert_eq!(param(append, "media_id").as_deref(), Some("710511363345354753"));
}

#[test]
fn source_shorter_than_declared_size_fails() {
    let transport = media_endpoint(None);
    let client = client(config(), transport.clone());

    let source = UploadSource::new(io::Cursor::new(vec![1u8; 5]), 25, "image/png");
    let outcome = client.uploader().with_chunk_size(10).run(source, None).unwrap();
    assert!(matches!(outcome.response.errors(), Some(ResponseError::Upload(_))));
    assert!(appends(&transport).is_empty());
}

#[test]
fn source_ending_inside_last_segment_fails_before_sending_it() {
    let transport = media_endpoint(None);
    let client = client(config(), transport.clone());

    let source = UploadSource::new(io::Cursor::new(vec![1u8; 22]), 25, "image/png");
    let outcome = client.uploader().with_chunk_size(10).run(source, None).unwrap();
    match outcome.response.errors() {
        Some(ResponseError::Upload(message)) => assert!(message.contains("2 of 5 bytes")),
        other => panic!("expected upload error, got {other:?}"),
    }
    assert_eq!(outcome.session.unwrap().state, UploadState::Failed);
    assert_eq!(appends(&transport).len(), 2);
    assert!(transport.requests().iter().all(|r| command(r) != "FINALIZE"));
}

struct Broken;

impl Read for Broken {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("disk gone"))
    }
}

#[test]
fn read_error_aborts_before_append() {
    let transport = media_endpoint(None);
    let client = client(config(), transport.clone());

    let outcome = client
        .uploader()
        .run(UploadSource::new(Broken, 10, "image/png"), None)
        .unwrap();
    match outcome.response.errors() {
        Some(ResponseError::Upload(message)) => assert!(message.contains("disk gone")),
        other => panic!("expected upload error, got {other:?}"),
    }
    assert!(appends(&transport).is_empty());
}

#[test]
fn upload_endpoint_defaults_relative_to_site() {
    let transport = media_endpoint(None);
    let client = client(ClientConfig::new("https://upload.example.com/1.1"), transport.clone());

    client
        .uploader()
        .upload(UploadSource::from_bytes(vec![1], "image/png"), None)
        .unwrap();
    assert!(transport.requests()[0]
        .url
        .starts_with("https://upload.example.com/1.1/media/upload.json?command=INIT"));
}

#[test]
fn status_is_a_get_with_command_query() {
    let transport = Scripted::new();
    transport.reply(200, r#"{"processing_info":{"state":"succeeded"}}"#);
    let client = client(config(), transport.clone());

    let response = client.uploader().status("42").unwrap();
    assert!(response.is_successful());
    let request = &transport.requests()[0];
    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(
        request.url,
        "https://upload.example.com/1.1/media/upload.json?command=STATUS&media_id=42"
    );
}

#[test]
fn appends_are_labelled_as_forms_on_json_services() {
    let transport = media_endpoint(None);
    let client = Client::builder(config(), NoAuth)
        .service(JsonService::new())
        .transport(transport.clone())
        .log(Arc::new(NullLog))
        .build()
        .unwrap();

    client
        .uploader()
        .upload(UploadSource::from_bytes(vec![1, 2, 3], "image/png"), None)
        .unwrap();
    let appends = appends(&transport);
    assert_eq!(appends.len(), 1);
    assert!(matches!(appends[0].body, RequestBody::Form(_)));
    assert_eq!(
        appends[0].headers.get("Content-Type"),
        Some("application/x-www-form-urlencoded")
    );
}
