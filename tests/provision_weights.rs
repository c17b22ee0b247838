use std::fs;
use std::path::Path;

use tempfile::TempDir;

use sitewatch::config::{AppConfig, BackendKind, DetectSettings};
use sitewatch::provision::{self, MISSING_WEIGHTS_HELP, WEIGHT_CANDIDATES};

fn tract_config(weights_root: &Path) -> AppConfig {
    AppConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        scratch_dir: weights_root.to_path_buf(),
        weights_root: weights_root.to_path_buf(),
        detect: DetectSettings {
            backend: BackendKind::Tract,
            input_size: 640,
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
        },
    }
}

#[test]
fn locate_weights_scans_candidates_in_priority_order() {
    let root = TempDir::new().unwrap();
    assert_eq!(provision::locate_weights(root.path()), None);

    fs::write(root.path().join("yolov5s.onnx"), b"demo").unwrap();
    assert_eq!(
        provision::locate_weights(root.path()),
        Some(root.path().join("yolov5s.onnx"))
    );

    fs::write(root.path().join("best.onnx"), b"fallback").unwrap();
    assert_eq!(
        provision::locate_weights(root.path()),
        Some(root.path().join("best.onnx"))
    );

    fs::create_dir(root.path().join("weights")).unwrap();
    fs::write(root.path().join("weights").join("best.onnx"), b"trained").unwrap();
    assert_eq!(
        provision::locate_weights(root.path()),
        Some(root.path().join(WEIGHT_CANDIDATES[0]))
    );
}

#[cfg(feature = "backend-tract")]
#[test]
fn missing_weights_surface_operator_guidance() {
    let root = TempDir::new().unwrap();
    let err = provision::get_detector(&tract_config(root.path()))
        .expect_err("no weights present, provisioning must fail");
    assert!(
        format!("{err}").contains("no weights found"),
        "unexpected error: {err:#}"
    );
    assert!(MISSING_WEIGHTS_HELP.contains("weights/best.onnx"));
}

#[cfg(feature = "backend-tract")]
#[test]
fn corrupt_weights_fail_with_a_load_error() {
    use sitewatch::TractDetector;

    let root = TempDir::new().unwrap();
    let path = root.path().join("best.onnx");
    fs::write(&path, b"this is not an onnx graph").unwrap();

    let err = TractDetector::load(&path, 640, 0.25, 0.45)
        .expect_err("garbage weights must not load");
    assert!(
        format!("{err:#}").contains("failed to load ONNX model"),
        "unexpected error: {err:#}"
    );
}
