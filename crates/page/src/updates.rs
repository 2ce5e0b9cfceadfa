#![forbid(unsafe_code)]

use metrics::counter;
use meshgen_api::ErrorResponse;
use meshgen_core::CallKind;
use tracing::{debug, info, warn};

use crate::model::{Artifact, ArtifactClass, CallOutcome, CallState, PageUpdate};
use crate::render::{pretty_json, transport_error};
use crate::PageController;

impl PageController {
    pub(crate) fn apply_update(&mut self, update: PageUpdate) {
        if let PageUpdate::Done { .. } = update {
            self.in_flight = self.in_flight.saturating_sub(1);
            return;
        }
        let cycle = update.cycle();
        if cycle != self.cycle {
            debug!(cycle, current = self.cycle, "updates: dropping stale update");
            counter!("meshgen_stale_updates_total", 1);
            return;
        }
        match update {
            PageUpdate::Started { view, kind, .. } => {
                self.page.view_mut(view).state = CallState::Requesting(kind);
            }
            PageUpdate::Finished { view, kind, as_yaml, outcome: CallOutcome::Response(resp), .. } if resp.is_success() => {
                let class = if as_yaml || kind == CallKind::Secondary { ArtifactClass::Yaml } else { ArtifactClass::Mermaid };
                let vp = self.page.view_mut(view);
                vp.target_mut(kind).success.show(Artifact { class, text: resp.body });
                vp.state = CallState::Succeeded(kind);
                info!(cycle, view = %view, kind = %kind, class = class.css(), "updates: rendered");
            }
            PageUpdate::Finished { view, kind, outcome, .. } => {
                let text = match &outcome {
                    CallOutcome::Response(resp) => {
                        match ErrorResponse::parse(&resp.body) {
                            Some(e) => warn!(cycle, view = %view, kind = %kind, status = resp.status, details = %e.summary(), "updates: backend rejected request"),
                            None => warn!(cycle, view = %view, kind = %kind, status = resp.status, "updates: backend error"),
                        }
                        pretty_json(&resp.body)
                    }
                    CallOutcome::Transport(msg) => {
                        warn!(cycle, view = %view, kind = %kind, error = %msg, "updates: request failed");
                        transport_error(msg)
                    }
                };
                let vp = self.page.view_mut(view);
                let target = vp.target_mut(kind);
                target.failure.clear();
                target.failure.show(Artifact { class: ArtifactClass::Error, text });
                vp.state = CallState::Failed(kind);
            }
            PageUpdate::Done { .. } => {}
        }
    }
}
