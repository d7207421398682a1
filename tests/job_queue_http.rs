//! End-to-end tests: the real router and `HttpJobQueue` against a fake job
//! queue served over HTTP.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use repo_analyzer::analysis::api::AppState;
use repo_analyzer::analysis::job_queue::HttpJobQueue;
use repo_analyzer::analysis::server::build_router;
use repo_analyzer::analysis::store::StatusStore;
use repo_analyzer::config::{JobParameterSecrets, JobQueueConfig};
use serde_json::{Value, json};

#[derive(Default)]
struct FakeQueue {
    submissions: Mutex<Vec<Value>>,
    statuses: Mutex<HashMap<String, String>>,
    reject_submissions: Mutex<bool>,
}

async fn submit_job(
    State(fake): State<Arc<FakeQueue>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if *fake.reject_submissions.lock().unwrap() {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"message": "queue is disabled"})),
        );
    }
    let mut subs = fake.submissions.lock().unwrap();
    subs.push(body.clone());
    let job_id = format!("fake-{}", subs.len());
    fake.statuses
        .lock()
        .unwrap()
        .insert(job_id.clone(), "SUBMITTED".to_string());
    (
        StatusCode::OK,
        Json(json!({"jobId": job_id, "jobName": body["jobName"], "jobArn": "arn:fake"})),
    )
}

async fn describe_jobs(
    State(fake): State<Arc<FakeQueue>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let statuses = fake.statuses.lock().unwrap();
    let jobs: Vec<Value> = body["jobs"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|id| id.as_str())
        .filter_map(|id| {
            statuses.get(id).map(|status| {
                json!({
                    "jobId": id,
                    "jobName": "analysis",
                    "status": status,
                    "createdAt": 1_700_000_000_000i64,
                    "startedAt": null
                })
            })
        })
        .collect();
    Json(json!({ "jobs": jobs }))
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn start() -> (String, Arc<FakeQueue>) {
    let fake = Arc::new(FakeQueue::default());
    let queue_app = Router::new()
        .route("/v1/submitjob", post(submit_job))
        .route("/v1/describejobs", post(describe_jobs))
        .with_state(fake.clone());
    let queue_url = spawn(queue_app).await;

    let queue_config = JobQueueConfig {
        endpoint: queue_url,
        ..Default::default()
    };
    let state = Arc::new(AppState {
        job_queue: Arc::new(HttpJobQueue::new(&queue_config).unwrap()),
        store: StatusStore::new(None),
        queue_config,
        secrets: JobParameterSecrets {
            database_url: Some("postgres://db".into()),
            ..Default::default()
        },
    });
    let service_url = spawn(build_router(state, false)).await;
    (service_url, fake)
}

#[tokio::test]
async fn test_submit_poll_and_read_roundtrip() {
    let (url, fake) = start().await;
    let client = client();

    let submit: Value = client
        .post(format!("{}/api/analysis/submit", url))
        .json(&json!({
            "repositoryUrl": "https://github.com/acme/widgets",
            "strategy": "security",
            "analysisId": "e2e-1"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(submit["success"], true);
    assert_eq!(submit["jobId"], "fake-1");

    {
        let subs = fake.submissions.lock().unwrap();
        assert_eq!(subs[0]["parameters"]["ANALYSIS_ID"], "e2e-1");
        assert_eq!(subs[0]["parameters"]["DATABASE_URL"], "postgres://db");
        assert_eq!(subs[0]["parameters"]["OPENAI_API_KEY"], "");
        assert_eq!(subs[0]["timeout"]["attemptDurationSeconds"], 3600);
    }

    let poll = client
        .get(format!("{}/api/analysis/batch-status", url))
        .query(&[("jobId", "fake-1"), ("analysisId", "e2e-1")])
        .send()
        .await
        .unwrap();
    assert_eq!(poll.status(), reqwest::StatusCode::OK);
    let poll: Value = poll.json().await.unwrap();
    assert_eq!(poll["batchStatus"], "SUBMITTED");
    assert_eq!(poll["status"], "cloning");
    assert_eq!(poll["progress"], 10);
    assert_eq!(poll["createdAt"], "2023-11-14T22:13:20.000Z");
    assert!(poll["startedAt"].is_null());

    fake.statuses
        .lock()
        .unwrap()
        .insert("fake-1".into(), "SUCCEEDED".into());
    client
        .get(format!("{}/api/analysis/batch-status", url))
        .query(&[("jobId", "fake-1"), ("analysisId", "e2e-1")])
        .send()
        .await
        .unwrap();

    let status: Value = client
        .get(format!("{}/api/analysis/status", url))
        .query(&[("analysisId", "e2e-1")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "completed");
    assert_eq!(status["progress"], 100);
    assert_eq!(status["currentFile"], "Job queue status: SUCCEEDED");
    assert!(status["estimatedCompletion"].is_null());
}

#[tokio::test]
async fn test_poll_unknown_job_is_404() {
    let (url, _) = start().await;
    let resp = client()
        .get(format!("{}/api/analysis/batch-status", url))
        .query(&[("jobId", "missing"), ("analysisId", "e2e-2")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let resp = client()
        .get(format!("{}/api/analysis/status", url))
        .query(&[("analysisId", "e2e-2")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_queue_rejection_surfaces_as_500() {
    let (url, fake) = start().await;
    *fake.reject_submissions.lock().unwrap() = true;

    let resp = client()
        .post(format!("{}/api/analysis/submit", url))
        .json(&json!({"repositoryUrl": "r", "strategy": "s", "analysisId": "a"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("queue is disabled"));
}
