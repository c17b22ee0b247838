//! Single-page web surface: upload form, detection results, artifact serving.
//!
//! Hand-rolled HTTP over `std::net::TcpListener`: blocking accept loop,
//! manual request parsing, one request handled at a time. Routes:
//!
//! - `GET /` upload page
//! - `POST /upload` multipart image upload, responds with the results page
//! - `GET /artifacts/<dir>/<file>` annotated images from the scratch namespace
//! - `GET /health` liveness probe

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::config::AppConfig;
use crate::labels::Bucket;
use crate::pipeline::{self, PipelineOutcome};
use crate::provision;
use crate::report::Report;

/// Upper bound on a whole request, upload body included.
const MAX_REQUEST_BYTES: usize = 20 * 1024 * 1024;
const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct WebServer {
    cfg: AppConfig,
}

#[derive(Debug)]
pub struct WebHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl WebHandle {
    /// Shared flag; storing `true` makes the accept loop wind down.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Blocks until the server thread exits (normally after the shutdown
    /// flag is set).
    pub fn wait(mut self) -> Result<()> {
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("web server thread panicked"))?;
        }
        Ok(())
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("web server thread panicked"))?;
        }
        Ok(())
    }
}

impl WebServer {
    pub fn new(cfg: AppConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn(self) -> Result<WebHandle> {
        let listener = TcpListener::bind(&self.cfg.listen_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_server(listener, cfg, shutdown_thread) {
                log::error!("web server stopped: {err:#}");
            }
        });

        Ok(WebHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(listener: TcpListener, cfg: AppConfig, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &cfg) {
                    log::warn!("request failed: {err:#}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, cfg: &AppConfig) -> Result<()> {
    let request = read_request(&mut stream)?;
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_html_response(&mut stream, 200, &index_page()),
        ("GET", "/health") => {
            let body = serde_json::to_vec(&serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            }))?;
            write_response(&mut stream, 200, "application/json", &body)
        }
        ("GET", path) if path.starts_with("/artifacts/") => {
            serve_artifact(&mut stream, cfg, path)
        }
        ("POST", "/upload") => handle_upload(&mut stream, cfg, &request),
        ("GET", _) => write_html_response(
            &mut stream,
            404,
            &message_page("Not found", "There is nothing at this address."),
        ),
        _ => write_html_response(
            &mut stream,
            405,
            &message_page("Method not allowed", "Use the upload form on the front page."),
        ),
    }
}

fn handle_upload(stream: &mut TcpStream, cfg: &AppConfig, request: &HttpRequest) -> Result<()> {
    let upload = match parse_multipart(request) {
        Ok(upload) => upload,
        Err(err) => {
            log::warn!("upload rejected: {err:#}");
            return write_html_response(
                stream,
                400,
                &message_page("Upload rejected", &format!("{err}")),
            );
        }
    };

    let extension = extension_of(&upload.file_name);
    if !extension
        .as_deref()
        .map(|e| ALLOWED_EXTENSIONS.contains(&e))
        .unwrap_or(false)
    {
        return write_html_response(
            stream,
            400,
            &message_page(
                "Unsupported file type",
                "Choose a jpg, jpeg, or png image.",
            ),
        );
    }

    let decoded = match image::load_from_memory(&upload.data) {
        Ok(decoded) => decoded.to_rgb8(),
        Err(err) => {
            log::warn!("unreadable image '{}': {}", upload.file_name, err);
            return write_html_response(
                stream,
                400,
                &message_page("Unreadable image", "The file could not be decoded as an image."),
            );
        }
    };

    let detector = match provision::get_detector(cfg) {
        Ok(detector) => detector,
        Err(err) => {
            log::error!("detector unavailable: {err:#}");
            return write_html_response(
                stream,
                500,
                &message_page("Detector unavailable", &format!("{err}")),
            );
        }
    };

    let outcome = match pipeline::run_detection(cfg, detector.as_ref(), &decoded, &upload.file_name)
    {
        Ok(outcome) => outcome,
        Err(err) => {
            log::error!("detection failed for '{}': {err:#}", upload.file_name);
            return write_html_response(
                stream,
                500,
                &message_page("Detector failure", "Detection failed; check the server log."),
            );
        }
    };

    let report = Report::build(&outcome.detections);
    write_html_response(stream, 200, &results_page(&upload, &outcome, &report))
}

fn serve_artifact(stream: &mut TcpStream, cfg: &AppConfig, path: &str) -> Result<()> {
    let rest = path.trim_start_matches("/artifacts/");
    let mut components = rest.splitn(2, '/');
    let dir = components.next().unwrap_or("");
    let file = components.next().unwrap_or("");

    if !is_safe_component(dir) || !is_safe_component(file) || !dir.starts_with("detection_") {
        return write_html_response(
            stream,
            404,
            &message_page("Not found", "Unknown artifact."),
        );
    }

    let full = cfg.scratch_dir.join(dir).join(file);
    match std::fs::read(&full) {
        Ok(bytes) => write_response(stream, 200, content_type_for(file), &bytes),
        Err(_) => write_html_response(
            stream,
            404,
            &message_page("Not found", "This artifact is gone."),
        ),
    }
}

/// One path component: no separators, no parent references.
fn is_safe_component(component: &str) -> bool {
    !component.is_empty()
        && !component.contains("..")
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

fn content_type_for(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

// ----------------------------------------------------------------------------
// Request parsing
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();

    let header_end = loop {
        if let Some(pos) = find_subsequence(&data, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-request"));
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request too large"));
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
        if body.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

struct Upload {
    file_name: String,
    data: Vec<u8>,
}

/// Extracts the first file part from a multipart/form-data body.
fn parse_multipart(request: &HttpRequest) -> Result<Upload> {
    let content_type = request
        .headers
        .get("content-type")
        .ok_or_else(|| anyhow!("missing content-type header"))?;
    if !content_type.starts_with("multipart/form-data") {
        return Err(anyhow!("expected a multipart/form-data upload"));
    }
    let boundary = content_type
        .split(';')
        .find_map(|part| part.trim().strip_prefix("boundary="))
        .ok_or_else(|| anyhow!("missing multipart boundary"))?
        .trim_matches('"');
    let delimiter = format!("--{boundary}");

    let body = &request.body;
    let mut cursor = 0usize;
    while let Some(rel) = find_subsequence(&body[cursor..], delimiter.as_bytes()) {
        let after_delimiter = cursor + rel + delimiter.len();
        if body[after_delimiter..].starts_with(b"--") {
            break;
        }
        let mut part_start = after_delimiter;
        if body[part_start..].starts_with(b"\r\n") {
            part_start += 2;
        }

        let Some(header_len) = find_subsequence(&body[part_start..], b"\r\n\r\n") else {
            break;
        };
        let content_start = part_start + header_len + 4;
        let Some(end_rel) = find_subsequence(&body[content_start..], delimiter.as_bytes()) else {
            break;
        };
        let mut content_end = content_start + end_rel;
        if content_end >= content_start + 2 && &body[content_end - 2..content_end] == b"\r\n" {
            content_end -= 2;
        }

        let part_headers = String::from_utf8_lossy(&body[part_start..part_start + header_len]);
        if let Some(file_name) = file_name_from_part(&part_headers) {
            return Ok(Upload {
                file_name,
                data: body[content_start..content_end].to_vec(),
            });
        }
        cursor = content_start + end_rel;
    }
    Err(anyhow!("no file field in the upload"))
}

fn file_name_from_part(part_headers: &str) -> Option<String> {
    for line in part_headers.split("\r\n") {
        if !line.to_ascii_lowercase().starts_with("content-disposition") {
            continue;
        }
        let marker = "filename=\"";
        let idx = line.to_ascii_lowercase().find(marker)?;
        let rest = &line[idx + marker.len()..];
        let end = rest.find('"')?;
        if !rest[..end].is_empty() {
            return Some(rest[..end].to_string());
        }
    }
    None
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ----------------------------------------------------------------------------
// Response writing and pages
// ----------------------------------------------------------------------------

fn write_html_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "text/html; charset=utf-8", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
<title>{title}</title>\
<style>\
body{{background:#16181d;color:#e8e8e8;font-family:sans-serif;max-width:720px;margin:2em auto;padding:0 1em;}}\
img{{max-width:100%;border:1px solid #333;}}\
a{{color:#7ab8ff;}}\
hr{{border:0;border-top:1px solid #333;}}\
.notice{{color:#aaa;}}\
</style></head><body>\n{body}\n</body></html>"
    )
}

fn index_page() -> String {
    page(
        "PPE Detection",
        "<h1>PPE Detection</h1>\
<p>Upload an image to detect helmets, vests, masks, and more.</p>\
<form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\
<p><input type=\"file\" name=\"image\" accept=\".jpg,.jpeg,.png\" required></p>\
<p><button type=\"submit\">Detect</button></p>\
</form>",
    )
}

fn message_page(title: &str, detail: &str) -> String {
    page(
        title,
        &format!(
            "<h1>{}</h1><p class='notice'>{}</p><p><a href=\"/\">Back to upload</a></p>",
            html_escape(title),
            html_escape(detail)
        ),
    )
}

fn results_page(upload: &Upload, outcome: &PipelineOutcome, report: &Report) -> String {
    let mut body = String::new();
    body.push_str("<h1>PPE Detection</h1>");

    body.push_str("<h2>Uploaded Image</h2>");
    body.push_str(&format!(
        "<img src=\"{}\" alt=\"{}\">",
        data_uri(upload),
        html_escape(&upload.file_name)
    ));

    match artifact_href(outcome) {
        Some(href) => {
            body.push_str("<h2>Detection Results</h2>");
            body.push_str(&format!("<img src=\"{href}\" alt=\"annotated image\">"));
        }
        None => body.push_str("<p class='notice'>No annotated image was produced.</p>"),
    }

    if report.is_empty() {
        body.push_str("<p class='notice'>No objects detected.</p>");
    } else {
        body.push_str("<h2>Detection Details</h2>");
        for bucket in Bucket::ORDER {
            let entries = report.entries(bucket);
            if entries.is_empty() {
                continue;
            }
            body.push_str(&format!("<h3>{}</h3>", bucket.title()));
            for entry in entries {
                body.push_str(&format!("<p>{}</p>", entry.html()));
            }
        }
        body.push_str("<hr><h2>Detection Summary</h2>");
        for line in report.summary() {
            body.push_str(&format!("<p>{}</p>", line.html()));
        }
    }

    body.push_str("<p><a href=\"/\">Detect another image</a></p>");
    page("PPE Detection Results", &body)
}

/// The upload's scratch copy is deleted by the pipeline, so the original is
/// embedded into the page instead of served from disk.
fn data_uri(upload: &Upload) -> String {
    let mime = match extension_of(&upload.file_name).as_deref() {
        Some("png") => "image/png",
        _ => "image/jpeg",
    };
    format!("data:{mime};base64,{}", BASE64.encode(&upload.data))
}

fn artifact_href(outcome: &PipelineOutcome) -> Option<String> {
    let path = outcome.annotated_path.as_ref()?;
    let file = path.file_name()?.to_str()?;
    let dir = outcome.results_dir.file_name()?.to_str()?;
    Some(format!("/artifacts/{dir}/{file}"))
}

fn html_escape(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}
