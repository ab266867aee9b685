//! Background verification worker.
//!
//! A dedicated thread receiving tagged requests over a channel and answering
//! on another. Delivery is best-effort: no acknowledgement, no timeout, no
//! ordering guarantee. Callers correlate responses by id only.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::DomainTag;
use crate::error::{KernelError, KernelResult};

/// Opaque id tying a response to its request.
pub type CorrelationId = u64;

/// Maximum entities per spatial cell before the index counts as degenerate.
pub const MAX_CELL_DENSITY: f64 = 50.0;

/// Consecutive waypoints may be at most this many grid cells apart.
pub const MAX_STEP_IN_CELLS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
}

impl Waypoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Checks too expensive to run inline every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormalCheck {
    SpatialTopology { cell_count: u64, entity_count: u64 },
    PathContinuity { waypoints: Vec<Waypoint>, grid_size: f64 },
    RenderDepth { depths: Vec<f64> },
}

impl FormalCheck {
    #[must_use]
    pub const fn domain(&self) -> DomainTag {
        match self {
            Self::SpatialTopology { .. } => DomainTag::SpatialTopology,
            Self::PathContinuity { .. } => DomainTag::PathContinuity,
            Self::RenderDepth { .. } => DomainTag::RenderDepth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormalRequest {
    pub id: CorrelationId,
    pub check: FormalCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormalResponse {
    pub id: CorrelationId,
    pub domain: DomainTag,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    pub compute_time_ms: f64,
    /// Dispatch itself failed; `error` carries the reason.
    #[serde(default)]
    pub fault: bool,
}

/// Payload the worker refuses to evaluate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkerFault {
    #[error("spatial topology with zero cells")]
    ZeroCells,
    #[error("grid size {0} must be finite and positive")]
    BadGridSize(f64),
    #[error("non-finite value at index {0}")]
    NonFinite(usize),
    #[error("dispatch panicked: {0}")]
    Panicked(String),
}

struct Outcome {
    valid: bool,
    error: Option<String>,
    meta: serde_json::Value,
}

fn evaluate(check: &FormalCheck) -> Result<Outcome, WorkerFault> {
    match check {
        FormalCheck::SpatialTopology {
            cell_count,
            entity_count,
        } => {
            if *cell_count == 0 {
                return Err(WorkerFault::ZeroCells);
            }
            let density = *entity_count as f64 / *cell_count as f64;
            let valid = density <= MAX_CELL_DENSITY;
            Ok(Outcome {
                valid,
                error: (!valid).then(|| {
                    format!("spatial density {density:.2} exceeds {MAX_CELL_DENSITY}")
                }),
                meta: serde_json::json!({ "density": density }),
            })
        }
        FormalCheck::PathContinuity {
            waypoints,
            grid_size,
        } => {
            if !grid_size.is_finite() || *grid_size <= 0.0 {
                return Err(WorkerFault::BadGridSize(*grid_size));
            }
            if let Some(i) = waypoints
                .iter()
                .position(|w| !w.x.is_finite() || !w.y.is_finite())
            {
                return Err(WorkerFault::NonFinite(i));
            }
            let limit = MAX_STEP_IN_CELLS * grid_size;
            let jump = waypoints
                .windows(2)
                .enumerate()
                .map(|(i, pair)| (i, pair[0].distance(&pair[1])))
                .find(|&(_, d)| d > limit);
            Ok(match jump {
                Some((i, d)) => Outcome {
                    valid: false,
                    error: Some(format!(
                        "path jumps {d:.2} between waypoints {i} and {} (limit {limit:.2})",
                        i + 1
                    )),
                    meta: serde_json::json!({ "index": i, "distance": d, "limit": limit }),
                },
                None => Outcome {
                    valid: true,
                    error: None,
                    meta: serde_json::json!({ "waypoints": waypoints.len() }),
                },
            })
        }
        FormalCheck::RenderDepth { depths } => {
            if let Some(i) = depths.iter().position(|d| !d.is_finite()) {
                return Err(WorkerFault::NonFinite(i));
            }
            let inversion = depths.windows(2).position(|pair| pair[1] < pair[0]);
            Ok(match inversion {
                Some(i) => Outcome {
                    valid: false,
                    error: Some(format!(
                        "depth order breaks at {}: {} after {}",
                        i + 1,
                        depths[i + 1],
                        depths[i]
                    )),
                    meta: serde_json::json!({ "index": i + 1 }),
                },
                None => Outcome {
                    valid: true,
                    error: None,
                    meta: serde_json::json!({ "layers": depths.len() }),
                },
            })
        }
    }
}

/// Evaluate one request the way the worker thread does, panics included.
#[must_use]
pub fn dispatch(request: &FormalRequest) -> FormalResponse {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| evaluate(&request.check)))
        .unwrap_or_else(|payload| Err(WorkerFault::Panicked(panic_message(payload.as_ref()))));
    let compute_time_ms = started.elapsed().as_secs_f64() * 1_000.0;
    let domain = request.check.domain();
    match result {
        Ok(outcome) => FormalResponse {
            id: request.id,
            domain,
            valid: outcome.valid,
            error: outcome.error,
            meta: Some(outcome.meta),
            compute_time_ms,
            fault: false,
        },
        Err(fault) => FormalResponse {
            id: request.id,
            domain,
            valid: false,
            error: Some(fault.to_string()),
            meta: None,
            compute_time_ms,
            fault: true,
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

enum WorkerMessage {
    Verify(FormalRequest),
    Shutdown,
}

/// Handle to the worker thread. Dropping it stops and joins the thread.
pub struct VerificationWorker {
    requests: Sender<WorkerMessage>,
    responses: Receiver<FormalResponse>,
    handle: Option<JoinHandle<()>>,
}

impl VerificationWorker {
    pub fn spawn() -> KernelResult<Self> {
        let (req_tx, req_rx) = unbounded::<WorkerMessage>();
        let (resp_tx, resp_rx) = unbounded::<FormalResponse>();
        let handle = thread::Builder::new()
            .name("axiomguard-verify".to_string())
            .spawn(move || run_loop(&req_rx, &resp_tx))
            .map_err(KernelError::WorkerSpawn)?;
        debug!(target: "axiomguard::worker", "verification worker started");
        Ok(Self {
            requests: req_tx,
            responses: resp_rx,
            handle: Some(handle),
        })
    }

    /// Fire and forget. Returns false when the worker is gone.
    pub fn submit(&self, request: FormalRequest) -> bool {
        self.requests.send(WorkerMessage::Verify(request)).is_ok()
    }

    /// Next available response, without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<FormalResponse> {
        match self.responses.try_recv() {
            Ok(resp) => Some(resp),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block until a response arrives or the worker goes away.
    #[must_use]
    pub fn recv_blocking(&self) -> Option<FormalResponse> {
        self.responses.recv().ok()
    }
}

impl Drop for VerificationWorker {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: "axiomguard::worker", "verification worker exited abnormally");
            }
        }
    }
}

fn run_loop(requests: &Receiver<WorkerMessage>, responses: &Sender<FormalResponse>) {
    while let Ok(message) = requests.recv() {
        match message {
            WorkerMessage::Verify(request) => {
                let response = dispatch(&request);
                if response.fault {
                    warn!(
                        target: "axiomguard::worker",
                        id = response.id,
                        domain = %response.domain,
                        error = response.error.as_deref().unwrap_or(""),
                        "formal check faulted"
                    );
                }
                if responses.send(response).is_err() {
                    break;
                }
            }
            WorkerMessage::Shutdown => break,
        }
    }
    debug!(target: "axiomguard::worker", "verification worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: CorrelationId, check: FormalCheck) -> FormalRequest {
        FormalRequest { id, check }
    }

    #[test]
    fn spatial_density_threshold() {
        let ok = dispatch(&req(
            1,
            FormalCheck::SpatialTopology {
                cell_count: 10,
                entity_count: 500,
            },
        ));
        assert!(ok.valid);
        let bad = dispatch(&req(
            2,
            FormalCheck::SpatialTopology {
                cell_count: 10,
                entity_count: 501,
            },
        ));
        assert!(!bad.valid);
        assert!(!bad.fault);
        assert!(bad.error.unwrap().contains("50.10"));
        assert_eq!(bad.domain, DomainTag::SpatialTopology);
    }

    #[test]
    fn path_rejects_teleports() {
        let check = |last: f64| FormalCheck::PathContinuity {
            waypoints: vec![
                Waypoint::new(0.0, 0.0),
                Waypoint::new(10.0, 0.0),
                Waypoint::new(last, 0.0),
            ],
            grid_size: 10.0,
        };
        assert!(dispatch(&req(1, check(30.0))).valid);
        let bad = dispatch(&req(2, check(30.5)));
        assert!(!bad.valid);
        assert_eq!(bad.meta.unwrap()["index"], 1);
    }

    #[test]
    fn depth_must_be_non_decreasing() {
        let ok = FormalCheck::RenderDepth {
            depths: vec![0.0, 0.0, 1.0, 2.5],
        };
        assert!(dispatch(&req(1, ok)).valid);
        let bad = FormalCheck::RenderDepth {
            depths: vec![0.0, 2.0, 1.0],
        };
        let resp = dispatch(&req(2, bad));
        assert!(!resp.valid);
        assert_eq!(resp.domain, DomainTag::RenderDepth);
    }

    #[test]
    fn malformed_payloads_are_faults() {
        let zero = dispatch(&req(
            1,
            FormalCheck::SpatialTopology {
                cell_count: 0,
                entity_count: 3,
            },
        ));
        assert!(zero.fault);
        let grid = dispatch(&req(
            2,
            FormalCheck::PathContinuity {
                waypoints: vec![],
                grid_size: 0.0,
            },
        ));
        assert!(grid.fault);
        let nan = dispatch(&req(
            3,
            FormalCheck::RenderDepth {
                depths: vec![1.0, f64::NAN],
            },
        ));
        assert!(nan.fault);
        assert_eq!(nan.error.as_deref(), Some("non-finite value at index 1"));
    }

    #[test]
    fn request_serializes_as_tagged_union() {
        let json = serde_json::to_value(req(
            7,
            FormalCheck::SpatialTopology {
                cell_count: 1,
                entity_count: 2,
            },
        ))
        .unwrap();
        assert_eq!(json["check"]["type"], "SPATIAL_TOPOLOGY");
        assert_eq!(json["check"]["payload"]["entity_count"], 2);
    }

    #[test]
    fn thread_round_trip() {
        let worker = VerificationWorker::spawn().unwrap();
        for id in 0..3 {
            assert!(worker.submit(req(
                id,
                FormalCheck::RenderDepth {
                    depths: vec![id as f64, 0.0],
                },
            )));
        }
        let mut ids: Vec<CorrelationId> = (0..3)
            .map(|_| worker.recv_blocking().unwrap())
            .map(|r| r.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
