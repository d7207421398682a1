//! Analysis job submission and status tracking.
//!
//! ## Overview
//!
//! A client submits a repository for analysis; the service forwards it to an
//! external batch job queue and hands back the queue's job handle. Progress
//! is then observed in two ways: the client polls the queue through this
//! service, and the running job pushes finer-grained progress directly.
//! Both paths land in the process-local `StatusStore`.
//!
//! ```text
//! ┌──────────┐  HTTP  ┌──────────────────────────────────────────────┐
//! │  Client  │ ─────> │  server.rs  (axum Router, TraceLayer, CORS)  │
//! └──────────┘        │    └─ api.rs  (handlers, AppState, ApiError) │
//!                     │         │                  │                 │
//!                     │   submit / describe    read / write          │
//!                     │         v                  v                 │
//!                     │  job_queue.rs          store.rs              │
//!                     │  (JobQueue trait,      (StatusStore,         │
//!                     │   HttpJobQueue)         TTL sweeper)         │
//!                     └──────────────────────────────────────────────┘
//! ```
//!
//! | Module      | Responsibility                                              |
//! |-------------|-------------------------------------------------------------|
//! | `models`    | `AnalysisStatus`, `JobQueueStatus` mapping, records, views  |
//! | `store`     | Shared last-write-wins map with terminal-record expiry      |
//! | `job_queue` | `JobQueue` trait, HTTP client, submission wire format       |
//! | `api`       | Route handlers and HTTP error mapping                       |
//! | `server`    | Router assembly and process lifecycle                       |
//!
//! ## Request flow (poll)
//!
//! 1. `GET /api/analysis/batch-status?jobId=..&analysisId=..`
//! 2. `JobQueue::describe()`; no job → 404, nothing written.
//! 3. `JobQueueStatus::to_analysis()` maps the raw status to
//!    `(AnalysisStatus, progress)`.
//! 4. `StatusStore::record_poll()` overwrites status, progress and
//!    current activity for the analysis.

pub mod api;
pub mod job_queue;
pub mod models;
pub mod server;
pub mod store;
