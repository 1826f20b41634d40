//! Mosaic Camserver Library
//!
//! Ingests several independent MJPEG camera feeds, composes them into a
//! mosaic (one full-size main view plus a thumbnail strip of every camera),
//! and republishes one continuously updating MJPEG stream per
//! camera-as-main. A side pipeline keeps a warm snapshot cache for one
//! designated camera and uploads stills to object storage on demand.
//!
//! ## Components
//!
//! 1. Geometry - canvas/thumbnail dimensions and placement
//! 2. MJPEG wire support - ingest decoding, egress fan-out, JPEG encoding
//! 3. FrameMailbox - bounded-wait hand-off between producer and consumer
//! 4. FrameSource - per-camera reconnect state machine
//! 5. CameraPipeline - source + scaler feeding the camera's slot
//! 6. MosaicCompositor - ticked fan-in, composition, publication
//! 7. SnapshotService - warm cache + on-demand upload
//! 8. CameraStatusTracker - lost/recovered transition tracking
//! 9. WebAPI - HTTP endpoints

pub mod camera_pipeline;
pub mod camera_status_tracker;
pub mod error;
pub mod frame_source;
pub mod geometry;
pub mod mailbox;
pub mod mjpeg;
pub mod mosaic;
pub mod snapshot_service;
pub mod state;
pub mod storage;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
