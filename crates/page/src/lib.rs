//! meshgen page controller.
//!
//! Keeps the forms, the location and the backend renders consistent. The host
//! forwards navigation signals, field edits and submissions; fetches run as
//! tokio tasks that report back over a channel, and only the controller
//! mutates the [`Page`].

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::counter;
use meshgen_api::MeshApi;
use meshgen_core::{decode, encode, location_for, random_seed, with_param, CodecError, ParameterSpec, RequestDescriptor, View, SEED_KEY, YAML_KEY};
use tokio::sync::mpsc;
use tracing::{info, warn};

mod model;
mod nav;
mod render;
mod sync;
mod tasks;
mod updates;
mod validate;

pub use model::{
    Artifact, ArtifactClass, CallOutcome, CallState, Field, FieldKind, Form, NavSignal, Page, PageUpdate, RenderTarget,
    Surface, ViewPage,
};
pub use nav::{NavigationWatcher, Transition};
pub use render::pretty_json;
pub use sync::{guard_replicas, sync};
pub use validate::{form_pairs, guard_submit, SubmitOutcome};

pub struct PageController {
    api: Arc<dyn MeshApi>,
    page: Page,
    random_spec: ParameterSpec,
    define_spec: ParameterSpec,
    watcher: NavigationWatcher,
    // last location reported by the host
    location: String,
    cycle: u64,
    current: Arc<AtomicU64>,
    updates_tx: mpsc::UnboundedSender<PageUpdate>,
    updates_rx: mpsc::UnboundedReceiver<PageUpdate>,
    in_flight: usize,
    last_request: Option<RequestDescriptor>,
}

impl PageController {
    /// Standard page with a fresh random default seed.
    pub fn new(api: Arc<dyn MeshApi>) -> Self {
        Self::with_page(api, Page::standard(), random_seed())
    }

    pub fn with_page(api: Arc<dyn MeshApi>, page: Page, seed: i64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<PageUpdate>();
        info!(seed, "page controller starting");
        Self {
            api,
            page,
            random_spec: ParameterSpec::for_view(View::Random, seed),
            define_spec: ParameterSpec::for_view(View::Define, seed),
            watcher: NavigationWatcher::new(),
            location: String::new(),
            cycle: 0,
            current: Arc::new(AtomicU64::new(0)),
            updates_tx: tx,
            updates_rx: rx,
            in_flight: 0,
            last_request: None,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Primary request issued by the latest cycle.
    pub fn last_request(&self) -> Option<&RequestDescriptor> {
        self.last_request.as_ref()
    }

    pub fn spec(&self, view: View) -> &ParameterSpec {
        match view {
            View::Random => &self.random_spec,
            View::Define => &self.define_spec,
        }
    }

    /// Host signal: the location may have changed. Returns the new cycle id
    /// when a request was issued.
    pub fn navigate(&mut self, signal: NavSignal, location: &str) -> Option<u64> {
        self.location = location.to_string();
        let transition = self.watcher.observe(signal, location)?;
        self.run_transition(transition)
    }

    fn run_transition(&mut self, t: Transition) -> Option<u64> {
        self.cycle += 1;
        self.current.store(self.cycle, Ordering::SeqCst);
        counter!("meshgen_cycles_total", 1);
        let cycle = self.cycle;

        let old_view = t.from.as_deref().and_then(|f| decode(f).ok()).and_then(|r| r.view);
        let route = match decode(&t.to) {
            Ok(r) => r,
            Err(e) => {
                warn!(cycle, location = %t.to, error = %e, "page: undecodable location");
                if let Some(v) = old_view {
                    self.page.view_mut(v).teardown();
                }
                return None;
            }
        };
        if let Some(old) = old_view {
            if route.view != Some(old) {
                self.page.view_mut(old).teardown();
            }
        }
        let Some(view) = route.view else {
            info!(cycle, location = %t.to, "page: location selects no view");
            return None;
        };

        // Stale output must not be visible while the new request is in flight.
        self.page.view_mut(view).teardown();
        let spec = self.spec(view).clone();
        let effective = sync(&mut self.page.view_mut(view).form, &spec, &route);
        let request = encode(view, &effective, route.has(YAML_KEY));
        info!(cycle, view = %view, request = %request, "page: navigation cycle");
        self.last_request = Some(request.clone());
        tasks::fetch::spawn_cycle(
            self.api.clone(),
            self.updates_tx.clone(),
            self.current.clone(),
            cycle,
            view,
            request,
        );
        self.in_flight += 1;
        Some(cycle)
    }

    /// Apply whatever updates are already queued, without waiting.
    pub fn process_updates(&mut self) -> usize {
        let mut processed = 0usize;
        while let Ok(u) = self.updates_rx.try_recv() {
            self.apply_update(u);
            processed += 1;
        }
        processed
    }

    /// Wait for every in-flight cycle (including superseded ones) to finish.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.updates_rx.recv().await {
                Some(u) => self.apply_update(u),
                None => break,
            }
        }
    }

    /// User edit of a text-like field. Runs the replica guard; returns the
    /// name of a field the guard adjusted.
    pub fn on_field_change(&mut self, view: View, name: &str, value: &str) -> Option<&'static str> {
        let form = &mut self.page.view_mut(view).form;
        match form.field_mut(name) {
            Some(field) => field.set_value(value),
            None => {
                warn!(form = %form.id, field = name, "page: change on unknown field");
                return None;
            }
        }
        guard_replicas(form, name)
    }

    pub fn on_checkbox_change(&mut self, view: View, name: &str, checked: bool) {
        if let Some(field) = self.page.view_mut(view).form.field_mut(name) {
            field.checked = checked;
        }
    }

    /// Submit the view's form. Native submission is always blocked; a valid
    /// form is turned into a location and navigated to, so the URL stays the
    /// source of truth.
    pub fn submit(&mut self, view: View) -> Result<SubmitOutcome, CodecError> {
        let outcome = guard_submit(&mut self.page.view_mut(view).form);
        if outcome.valid {
            let next = location_for(&self.location, view, &form_pairs(&self.page.view(view).form))?;
            self.navigate(NavSignal::PushState, &next);
        }
        Ok(outcome)
    }

    /// Seed refresh button: pick a new seed and navigate to it.
    pub fn refresh_seed(&mut self) -> Result<String, CodecError> {
        let seed = random_seed();
        let next = with_param(&self.location, SEED_KEY, &seed.to_string())?;
        info!(seed, location = %next, "page: seed refreshed");
        self.navigate(NavSignal::PushState, &next);
        Ok(next)
    }
}
