use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use sitewatch::api::{WebHandle, WebServer};
use sitewatch::config::{AppConfig, BackendKind, DetectSettings};

const BOUNDARY: &str = "sitewatchtestboundary";

fn spawn_server(scratch: &Path) -> WebHandle {
    let cfg = AppConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        scratch_dir: scratch.to_path_buf(),
        weights_root: scratch.to_path_buf(),
        detect: DetectSettings {
            backend: BackendKind::Stub,
            input_size: 640,
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
        },
    };
    WebServer::new(cfg).spawn().expect("spawn server")
}

fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(16, 16, Rgb([120, 30, 200]));
    let mut out = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .expect("encode png");
    out
}

fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut data = Vec::new();
    stream.read_to_end(&mut data).expect("read response");
    let pos = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header terminator");
    let head = String::from_utf8_lossy(&data[..pos]).into_owned();
    (head, data[pos + 4..].to_vec())
}

fn http_get(addr: SocketAddr, path: &str) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .expect("send request");
    read_response(&mut stream)
}

fn http_upload(addr: SocketAddr, file_name: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut stream = TcpStream::connect(addr).expect("connect");
    write!(
        stream,
        "POST /upload HTTP/1.1\r\nHost: localhost\r\n\
Content-Type: multipart/form-data; boundary={BOUNDARY}\r\n\
Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .expect("send headers");
    stream.write_all(&body).expect("send body");
    read_response(&mut stream)
}

#[test]
fn front_page_and_health_respond() {
    let scratch = TempDir::new().unwrap();
    let handle = spawn_server(scratch.path());
    let addr = handle.addr;

    let (head, body) = http_get(addr, "/");
    assert!(head.contains("200 OK"), "head: {head}");
    let page = String::from_utf8_lossy(&body);
    assert!(page.contains("<form"));
    assert!(page.contains("multipart/form-data"));

    let (head, body) = http_get(addr, "/health");
    assert!(head.contains("200 OK"));
    let health = String::from_utf8_lossy(&body);
    assert!(health.contains(r#""status":"ok""#), "health: {health}");

    let (head, _) = http_get(addr, "/missing");
    assert!(head.contains("404"));

    handle.stop().unwrap();
}

#[test]
fn upload_renders_report_and_serves_the_annotated_artifact() {
    let scratch = TempDir::new().unwrap();
    let handle = spawn_server(scratch.path());
    let addr = handle.addr;

    let (head, body) = http_upload(addr, "crew.png", &png_bytes());
    assert!(head.contains("200 OK"), "head: {head}");
    let page = String::from_utf8_lossy(&body).into_owned();

    // Original image embedded, report rendered. The stub detector always
    // finds one vocabulary object, so the summary is non-empty.
    assert!(page.contains("data:image/png;base64,"));
    assert!(page.contains("Detection Details"), "page: {page}");
    assert!(page.contains("Detection Summary"));
    assert!(page.contains("Confidence: "));
    assert!(page.contains("/artifacts/detection_"));

    let start = page.find("/artifacts/detection_").unwrap();
    let end = start + page[start..].find('"').unwrap();
    let href = page[start..end].to_string();

    let (head, img) = http_get(addr, &href);
    assert!(head.contains("200 OK"), "head: {head}");
    assert!(head.contains("image/jpeg"));
    assert!(!img.is_empty());

    handle.stop().unwrap();
}

#[test]
fn bad_uploads_get_legible_rejections() {
    let scratch = TempDir::new().unwrap();
    let handle = spawn_server(scratch.path());
    let addr = handle.addr;

    // Wrong extension.
    let (head, body) = http_upload(addr, "notes.txt", b"not an image");
    assert!(head.contains("400"), "head: {head}");
    assert!(String::from_utf8_lossy(&body).contains("Unsupported file type"));

    // Right extension, undecodable payload.
    let (head, body) = http_upload(addr, "broken.png", b"not an image");
    assert!(head.contains("400"), "head: {head}");
    assert!(String::from_utf8_lossy(&body).contains("Unreadable image"));

    handle.stop().unwrap();
}

#[test]
fn artifact_route_rejects_traversal() {
    let scratch = TempDir::new().unwrap();
    std::fs::write(scratch.path().join("secret.txt"), b"do not serve").unwrap();
    let handle = spawn_server(scratch.path());
    let addr = handle.addr;

    for path in [
        "/artifacts/../secret.txt",
        "/artifacts/detection_1/../secret.txt",
        "/artifacts/secret.txt",
        "/artifacts/upload_1/secret.txt",
    ] {
        let (head, body) = http_get(addr, path);
        assert!(head.contains("404"), "{path} head: {head}");
        assert!(!String::from_utf8_lossy(&body).contains("do not serve"));
    }

    handle.stop().unwrap();
}
