use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use vehicle_watch::api::{ApiConfig, ApiHandle, ApiServer};
use vehicle_watch::{
    BoundingBox, Dashboard, DetectorBackend, FramePipeline, ModelGate, ModelStatus, RawDetection,
    StatsAggregator, StubBackend,
};

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

struct TestApi {
    stats: Arc<StatsAggregator>,
    gate: Arc<ModelGate>,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new(gate: ModelGate) -> Result<Self> {
        let stats = Arc::new(StatsAggregator::new());
        let gate = Arc::new(gate);
        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
        };
        let api_handle = ApiServer::new(
            api_config,
            Dashboard::new(Arc::clone(&stats)),
            Arc::clone(&gate),
        )
        .spawn()?;

        Ok(Self {
            stats,
            gate,
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle
            .as_ref()
            .expect("test API handle should be initialized")
    }

    fn request(&self, method: &str, path: &str) -> Result<(String, String)> {
        let mut stream = TcpStream::connect(self.handle().addr)?;
        let request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes())?;
        read_response(&mut stream)
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let (headers, body) = self.request("GET", path)?;
        if !headers.contains("200 OK") {
            return Err(anyhow!("GET {} returned {}", path, headers));
        }
        assert!(headers.contains("Content-Type: application/json"));
        Ok(serde_json::from_str(&body)?)
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            handle.stop().expect("failed to stop API server");
        }
    }
}

fn two_cars_and_a_truck() -> StubBackend {
    StubBackend::fixed(vec![
        RawDetection::new(2, 0.9, BoundingBox::new(1.0, 1.0, 10.0, 10.0)),
        RawDetection::new(2, 0.7, BoundingBox::new(12.0, 1.0, 20.0, 10.0)),
        RawDetection::new(7, 0.6, BoundingBox::new(1.0, 12.0, 20.0, 30.0)),
        RawDetection::new(0, 0.99, BoundingBox::new(1.0, 1.0, 5.0, 5.0)),
    ])
}

#[test]
fn health_reports_ok() -> Result<()> {
    let api = TestApi::new(ModelGate::new())?;
    assert_eq!(api.get_json("/health")?, json!({"status": "ok"}));
    Ok(())
}

#[test]
fn empty_stats_and_history() -> Result<()> {
    let api = TestApi::new(ModelGate::new())?;

    let stats = api.get_json("/stats")?;
    assert_eq!(stats["total_detections"], 0);
    assert_eq!(
        stats["vehicle_counts"],
        json!({"car": 0, "motorcycle": 0, "bus": 0, "truck": 0})
    );
    assert_eq!(stats["last_detection_time"], Value::Null);

    let history = api.get_json("/history")?;
    assert_eq!(
        history,
        json!({"timestamps": [], "detections": [], "vehicles": {}})
    );
    Ok(())
}

#[test]
fn ready_model_without_a_job_reports_only_readiness() -> Result<()> {
    let api = TestApi::new(ModelGate::ready(two_cars_and_a_truck()))?;

    assert_eq!(api.get_json("/model")?["state"], "ready");
    assert_eq!(api.get_json("/stats")?["total_detections"], 0);
    assert_eq!(api.get_json("/history")?["detections"], json!([]));
    Ok(())
}

#[test]
fn stats_and_history_follow_recorded_images() -> Result<()> {
    let api = TestApi::new(ModelGate::ready(two_cars_and_a_truck()))?;
    let pipeline = FramePipeline::new(Arc::clone(&api.gate), Arc::clone(&api.stats));
    pipeline.run_image(image::RgbImage::new(32, 32))?;
    pipeline.run_image(image::RgbImage::new(32, 32))?;

    let stats = api.get_json("/stats")?;
    assert_eq!(stats["total_detections"], 6);
    assert_eq!(stats["vehicle_counts"]["car"], 4);
    assert_eq!(stats["vehicle_counts"]["truck"], 2);
    assert!(stats["last_detection_time"].is_string());

    let history = api.get_json("/history")?;
    assert_eq!(history["detections"], json!([3, 3]));
    assert_eq!(history["timestamps"].as_array().map(Vec::len), Some(2));
    assert_eq!(history["vehicles"]["car"], json!([2, 2]));
    assert_eq!(history["vehicles"]["bus"], json!([0, 0]));
    assert_eq!(history["vehicles"]["motorcycle"], json!([0, 0]));
    Ok(())
}

#[test]
fn model_endpoint_tracks_gate_state() -> Result<()> {
    let api = TestApi::new(ModelGate::new())?;
    assert_eq!(
        api.get_json("/model")?,
        json!({"state": "uninitialized", "backend": null})
    );

    api.gate
        .spawn_load(|| Ok(Box::new(StubBackend::new()) as Box<dyn DetectorBackend>))?;
    assert_eq!(api.gate.wait_settled(Duration::from_secs(5)), ModelStatus::Ready);
    assert_eq!(
        api.get_json("/model")?,
        json!({"state": "ready", "backend": "stub"})
    );
    Ok(())
}

#[test]
fn model_endpoint_reports_load_failure() -> Result<()> {
    let api = TestApi::new(ModelGate::new())?;
    api.gate
        .spawn_load(|| Err(anyhow!("weights file missing")))?;
    let status = api.gate.wait_settled(Duration::from_secs(5));
    assert!(matches!(status, ModelStatus::Failed(_)));

    let model = api.get_json("/model")?;
    assert_eq!(model["state"], "failed");
    assert!(model["reason"]
        .as_str()
        .is_some_and(|reason| reason.contains("weights file missing")));
    Ok(())
}

#[test]
fn unknown_paths_and_methods_are_rejected() -> Result<()> {
    let api = TestApi::new(ModelGate::new())?;

    let (headers, _) = api.request("GET", "/events")?;
    assert!(headers.contains("404 Not Found"));

    let (headers, _) = api.request("POST", "/stats")?;
    assert!(headers.contains("405 Method Not Allowed"));

    let (headers, _) = api.request("GET", "/stats?window=10")?;
    assert!(headers.contains("200 OK"));
    Ok(())
}
