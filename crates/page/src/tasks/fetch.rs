#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use meshgen_api::MeshApi;
use meshgen_core::{secondary, CallKind, RequestDescriptor, View};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::model::{CallOutcome, PageUpdate};

/// Spawn the primary call for `cycle` and, if it succeeds, the secondary one.
/// The task never touches the page; it only reports through `tx`.
pub(crate) fn spawn_cycle(
    api: Arc<dyn MeshApi>,
    tx: UnboundedSender<PageUpdate>,
    current: Arc<AtomicU64>,
    cycle: u64,
    view: View,
    primary: RequestDescriptor,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let done = DoneGuard { tx, cycle };
        run_cycle(api.as_ref(), &done.tx, &current, cycle, view, primary).await;
    })
}

/// Reports `Done` when the task exits, including by panic, so the
/// controller's in-flight count always drains.
struct DoneGuard {
    tx: UnboundedSender<PageUpdate>,
    cycle: u64,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(PageUpdate::Done { cycle: self.cycle });
    }
}

async fn run_cycle(
    api: &dyn MeshApi,
    tx: &UnboundedSender<PageUpdate>,
    current: &AtomicU64,
    cycle: u64,
    view: View,
    primary: RequestDescriptor,
) {
    if !call(api, tx, cycle, view, CallKind::Primary, &primary).await {
        return;
    }
    // A newer navigation owns the page now; its own cycle will fetch.
    if current.load(Ordering::SeqCst) != cycle {
        debug!(cycle, view = %view, "fetch: superseded, skipping secondary");
        return;
    }
    let next = secondary(&primary, view);
    call(api, tx, cycle, view, CallKind::Secondary, &next).await;
}

/// Returns true when the backend answered 2xx.
async fn call(
    api: &dyn MeshApi,
    tx: &UnboundedSender<PageUpdate>,
    cycle: u64,
    view: View,
    kind: CallKind,
    request: &RequestDescriptor,
) -> bool {
    let t0 = Instant::now();
    let _ = tx.send(PageUpdate::Started { cycle, view, kind, request: request.clone() });
    let outcome = match api.fetch(request).await {
        Ok(resp) => CallOutcome::Response(resp),
        Err(e) => CallOutcome::Transport(e.to_string()),
    };
    let ok = matches!(&outcome, CallOutcome::Response(r) if r.is_success());
    histogram!("meshgen_call_ms", t0.elapsed().as_secs_f64() * 1000.0);
    info!(cycle, view = %view, kind = %kind, request = %request, ok, took_ms = %t0.elapsed().as_millis(), "fetch: call finished");
    let _ = tx.send(PageUpdate::Finished { cycle, view, kind, as_yaml: request.path.ends_with(".yaml"), outcome });
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgen_api::{ApiResponse, ApiResult, MockApi};
    use meshgen_core::Method;
    use tokio::sync::mpsc;

    fn primary() -> RequestDescriptor {
        RequestDescriptor { method: Method::Get, path: "/api/random.mmd".into(), query: vec![("seed".into(), "1".into())], body: None }
    }

    async fn collect(api: Arc<MockApi>, current: u64) -> Vec<PageUpdate> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cur = Arc::new(AtomicU64::new(current));
        spawn_cycle(api, tx, cur, 1, View::Random, primary()).await.unwrap();
        let mut out = Vec::new();
        while let Ok(u) = rx.try_recv() {
            out.push(u);
        }
        out
    }

    #[tokio::test]
    async fn success_chains_secondary() {
        let api = Arc::new(
            MockApi::new()
                .route("/api/random.mmd", ApiResponse::ok("graph TD;"))
                .route("/api/random.yaml", ApiResponse::ok("kind: List")),
        );
        let ups = collect(api.clone(), 1).await;
        assert_eq!(ups.len(), 5);
        assert!(matches!(ups.last(), Some(PageUpdate::Done { cycle: 1 })));
        let reqs = api.requests();
        assert_eq!(reqs[1].path, "/api/random.yaml");
        assert!(reqs[1].query.contains(&("k8s".to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn failure_stops_chain() {
        let api = Arc::new(MockApi::new().route("/api/random.mmd", ApiResponse::with_status(400, "{}")));
        let ups = collect(api.clone(), 1).await;
        assert_eq!(ups.len(), 3);
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test]
    async fn superseded_cycle_skips_secondary() {
        let api = Arc::new(MockApi::new().route("/api/random.mmd", ApiResponse::ok("graph TD;")));
        let ups = collect(api.clone(), 2).await;
        assert_eq!(api.requests().len(), 1);
        assert!(matches!(ups.last(), Some(PageUpdate::Done { cycle: 1 })));
    }

    struct PanickingApi;

    #[async_trait::async_trait]
    impl MeshApi for PanickingApi {
        async fn fetch(&self, _request: &RequestDescriptor) -> ApiResult<ApiResponse> {
            panic!("backend client bug")
        }
    }

    #[tokio::test]
    async fn panicking_fetch_still_reports_done() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_cycle(Arc::new(PanickingApi), tx, Arc::new(AtomicU64::new(1)), 1, View::Random, primary());
        assert!(handle.await.unwrap_err().is_panic());
        let mut ups = Vec::new();
        while let Ok(u) = rx.try_recv() {
            ups.push(u);
        }
        assert!(matches!(ups.first(), Some(PageUpdate::Started { .. })));
        assert!(matches!(ups.last(), Some(PageUpdate::Done { cycle: 1 })));
    }
}
