use std::sync::Mutex;

use tempfile::Builder;

use edge_pipeline::config::PipelineAppConfig;
use edge_pipeline::MemoryScope;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "EDGE_PIPELINE_CONFIG",
        "EDGE_IMAGE_DIR",
        "EDGE_QUEUE_SIZE",
        "EDGE_TARGET_FPS",
        "EDGE_TARGET_WIDTH",
        "EDGE_TARGET_HEIGHT",
        "EDGE_CAMERA_INDEX",
        "EDGE_CAMERA_DEVICE",
        "EDGE_BACKEND",
        "EDGE_STATUS_EVERY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".json")
        .tempfile()
        .expect("temp config");
    let json = r#"{
        "image_dir": "/srv/frames",
        "sorted": true,
        "pipeline": { "queue_size": 6, "target_fps": 2.5, "max_consecutive_failures": 5 },
        "camera": { "index": 1, "width": 1280, "height": 720 },
        "inference": { "backend": "motion" },
        "status": { "every": 50, "memory_scope": "system" }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("EDGE_PIPELINE_CONFIG", file.path());
    std::env::set_var("EDGE_QUEUE_SIZE", "2");
    std::env::set_var("EDGE_CAMERA_INDEX", "3");

    let cfg = PipelineAppConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.image_dir.to_str(), Some("/srv/frames"));
    assert!(cfg.sorted);
    assert_eq!(cfg.pipeline.queue_size, 2);
    assert_eq!(cfg.pipeline.target_fps, Some(2.5));
    assert_eq!(cfg.pipeline_config().max_consecutive_failures, 5);
    assert_eq!(cfg.camera_config().device, "/dev/video3");
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.inference.backend, "motion");
    assert_eq!(cfg.status.every, 50);
    assert_eq!(cfg.status.memory_scope, MemoryScope::System);
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [pipeline]
        target_width = 320
        target_height = 240

        [camera]
        device = "stub://lab"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("EDGE_PIPELINE_CONFIG", file.path());

    let cfg = PipelineAppConfig::load().expect("load config");
    clear_env();

    assert_eq!(cfg.pipeline_config().target_size, (320, 240));
    assert_eq!(cfg.camera_config().device, "stub://lab");
}

#[test]
fn defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineAppConfig::load().expect("load defaults");
    assert_eq!(cfg.pipeline.queue_size, 4);
    assert_eq!(cfg.pipeline_config().target_size, (224, 224));
    assert_eq!(cfg.pipeline.target_fps, None);
    assert_eq!(cfg.pipeline.max_consecutive_failures, 30);
    assert_eq!(cfg.inference.backend, "dummy");
    assert_eq!(cfg.status.every, 10);
    assert_eq!(cfg.status.memory_scope, MemoryScope::Process);
}

#[test]
fn env_target_fps_zero_disables_sampling() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EDGE_TARGET_FPS", "0");
    let cfg = PipelineAppConfig::load().expect("load config");
    clear_env();
    assert_eq!(cfg.pipeline.target_fps, None);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EDGE_QUEUE_SIZE", "many");
    assert!(PipelineAppConfig::load().is_err());

    std::env::set_var("EDGE_QUEUE_SIZE", "0");
    assert!(PipelineAppConfig::load().is_err());

    clear_env();
    std::env::set_var("EDGE_STATUS_EVERY", "0");
    assert!(PipelineAppConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_missing_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EDGE_PIPELINE_CONFIG", "/nonexistent/edge-pipeline.json");
    assert!(PipelineAppConfig::load().is_err());
    clear_env();
}
