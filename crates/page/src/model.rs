#![forbid(unsafe_code)]

use meshgen_api::ApiResponse;
use meshgen_core::{CallKind, RequestDescriptor, View};

/// Element type of a form field, as the markup declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Checkbox,
    TextArea,
    Select { options: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub value: String,
    pub checked: bool,
    pub required: bool,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Field {
    fn with_kind(name: &str, kind: FieldKind) -> Self {
        Self { name: name.to_string(), kind, value: String::new(), checked: false, required: false, min: None, max: None }
    }

    pub fn text(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Text)
    }

    pub fn number(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Number)
    }

    pub fn checkbox(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Checkbox)
    }

    pub fn textarea(name: &str) -> Self {
        Self::with_kind(name, FieldKind::TextArea)
    }

    pub fn select(name: &str, options: &[&str]) -> Self {
        Self::with_kind(name, FieldKind::Select { options: options.iter().map(|s| s.to_string()).collect() })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn bounds(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Assign a displayed value the way the element would accept it:
    /// number inputs drop non-numeric text, selects drop unknown options.
    pub fn set_value(&mut self, raw: &str) {
        self.value = match &self.kind {
            FieldKind::Number if !is_valid_number(raw) => String::new(),
            FieldKind::Number => raw.to_string(),
            FieldKind::Select { options } if !options.iter().any(|o| o == raw) => String::new(),
            _ => raw.to_string(),
        };
    }

    /// Constraint validation: required, numeric parse and numeric bounds.
    pub fn is_valid(&self) -> bool {
        if self.kind == FieldKind::Checkbox {
            return !self.required || self.checked;
        }
        if self.value.is_empty() {
            return !self.required;
        }
        if self.kind == FieldKind::Number {
            let Ok(n) = self.value.parse::<f64>() else { return false };
            if self.min.is_some_and(|m| n < m as f64) || self.max.is_some_and(|m| n > m as f64) {
                return false;
            }
        }
        true
    }
}

/// HTML "valid floating-point number": `-?(d+|d+.d+|.d+)([eE][+-]?d+)?`,
/// finite, no surrounding whitespace and no leading `+`.
fn is_valid_number(raw: &str) -> bool {
    let s = raw.strip_prefix('-').unwrap_or(raw);
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    let digits = |t: &str| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit());
    let mantissa_ok = match mantissa.split_once('.') {
        Some((int, frac)) => (int.is_empty() || digits(int)) && digits(frac),
        None => digits(mantissa),
    };
    let exponent_ok = match exponent {
        Some(e) => digits(e.strip_prefix(['+', '-']).unwrap_or(e)),
        None => true,
    };
    mantissa_ok && exponent_ok && raw.parse::<f64>().is_ok_and(f64::is_finite)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub id: String,
    pub fields: Vec<Field>,
    pub needs_validation: bool,
    pub was_validated: bool,
}

impl Form {
    pub fn new(id: &str, fields: Vec<Field>) -> Self {
        Self { id: id.to_string(), fields, needs_validation: true, was_validated: false }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value.as_str())
    }

    pub fn check_validity(&self) -> bool {
        self.fields.iter().all(Field::is_valid)
    }
}

/// Styling tag of a rendered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactClass {
    Mermaid,
    Yaml,
    Error,
}

impl ArtifactClass {
    pub fn css(&self) -> &'static str {
        match self {
            ArtifactClass::Mermaid => "mermaid",
            ArtifactClass::Yaml => "yaml",
            ArtifactClass::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub class: ArtifactClass,
    pub text: String,
}

/// A container that holds at most one artifact and can be hidden.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Surface {
    pub visible: bool,
    artifact: Option<Artifact>,
}

impl Surface {
    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    pub fn text(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.text.as_str())
    }

    pub fn clear(&mut self) {
        self.artifact = None;
    }

    /// Replaces any previous artifact and makes the surface visible.
    pub fn show(&mut self, artifact: Artifact) {
        self.artifact = Some(artifact);
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }
}

/// The (failure, success) surface pair one backend call renders into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderTarget {
    pub failure: Surface,
    pub success: Surface,
}

impl RenderTarget {
    pub fn reset(&mut self) {
        self.failure.clear();
        self.failure.hide();
        self.success.clear();
        self.success.hide();
    }

    pub fn is_blank(&self) -> bool {
        !self.failure.visible && !self.success.visible && self.failure.artifact().is_none() && self.success.artifact().is_none()
    }
}

/// Per-view lifecycle of the two chained calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    #[default]
    Idle,
    Requesting(CallKind),
    Failed(CallKind),
    Succeeded(CallKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewPage {
    pub form: Form,
    pub primary: RenderTarget,
    pub secondary: RenderTarget,
    pub state: CallState,
}

impl ViewPage {
    pub fn new(form: Form) -> Self {
        Self { form, primary: RenderTarget::default(), secondary: RenderTarget::default(), state: CallState::Idle }
    }

    pub fn target(&self, kind: CallKind) -> &RenderTarget {
        match kind {
            CallKind::Primary => &self.primary,
            CallKind::Secondary => &self.secondary,
        }
    }

    pub fn target_mut(&mut self, kind: CallKind) -> &mut RenderTarget {
        match kind {
            CallKind::Primary => &mut self.primary,
            CallKind::Secondary => &mut self.secondary,
        }
    }

    pub fn teardown(&mut self) {
        self.primary.reset();
        self.secondary.reset();
        self.state = CallState::Idle;
    }
}

/// Document model: one form and two render targets per view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub random: ViewPage,
    pub define: ViewPage,
}

impl Page {
    pub fn new(random: Form, define: Form) -> Self {
        Self { random: ViewPage::new(random), define: ViewPage::new(define) }
    }

    /// Forms matching the canonical parameter set.
    pub fn standard() -> Self {
        let k8s_app = Field::select("k8sApp", &["api-play", "fake-service"]).required();
        let random = Form::new(
            "form-random",
            vec![
                Field::number("seed").required(),
                Field::number("numServices").required().bounds(Some(1), None),
                Field::number("minReplicas").required().bounds(Some(1), None),
                Field::number("maxReplicas").required().bounds(Some(1), None),
                Field::number("percentEdge").bounds(Some(0), Some(100)),
                Field::checkbox("yaml"),
                Field::text("k8sNamespace").required(),
                k8s_app.clone(),
            ],
        );
        let define = Form::new(
            "form-define",
            vec![
                Field::checkbox("yaml"),
                Field::text("k8sNamespace").required(),
                k8s_app,
                Field::textarea("defineContent").required(),
            ],
        );
        Self::new(random, define)
    }

    pub fn view(&self, view: View) -> &ViewPage {
        match view {
            View::Random => &self.random,
            View::Define => &self.define,
        }
    }

    pub fn view_mut(&mut self, view: View) -> &mut ViewPage {
        match view {
            View::Random => &mut self.random,
            View::Define => &mut self.define,
        }
    }
}

/// Host-side signals that may mean "the location changed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavSignal {
    /// Document finished loading.
    Ready,
    HashChange,
    PopState,
    PushState,
    /// Emitted after a render, which never changes the location by itself.
    RenderCycle,
}

/// Result of one backend call, before it touches the page.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Response(ApiResponse),
    /// No HTTP response at all (connection refused, timeout...).
    Transport(String),
}

/// Messages from fetch tasks to the controller.
#[derive(Debug, Clone)]
pub enum PageUpdate {
    Started { cycle: u64, view: View, kind: CallKind, request: RequestDescriptor },
    Finished { cycle: u64, view: View, kind: CallKind, as_yaml: bool, outcome: CallOutcome },
    /// The task for this cycle has exited.
    Done { cycle: u64 },
}

impl PageUpdate {
    pub fn cycle(&self) -> u64 {
        match self {
            PageUpdate::Started { cycle, .. } | PageUpdate::Finished { cycle, .. } | PageUpdate::Done { cycle } => *cycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_field_sanitizes_text() {
        let mut f = Field::number("seed");
        f.set_value("abc");
        assert_eq!(f.value, "");
        f.set_value("12");
        assert_eq!(f.value, "12");
    }

    #[test]
    fn number_field_follows_html_number_grammar() {
        let mut f = Field::number("numServices");
        for bad in ["NaN", "inf", "infinity", "+3", "5.", " 12 ", "1e", "--1", "1e999"] {
            f.set_value("7");
            f.set_value(bad);
            assert_eq!(f.value, "", "{bad:?} should be rejected");
        }
        for good in ["-4", "0.5", ".5", "1e3", "2E-1"] {
            f.set_value(good);
            assert_eq!(f.value, good);
        }
        f.set_value("NaN");
        assert!(f.is_valid());
        assert!(!f.clone().required().is_valid());
    }

    #[test]
    fn select_drops_unknown_options() {
        let mut f = Field::select("k8sApp", &["api-play", "fake-service"]);
        f.set_value("fake-service");
        assert_eq!(f.value, "fake-service");
        f.set_value("nginx");
        assert_eq!(f.value, "");
    }

    #[test]
    fn validity_honours_bounds_and_required() {
        let mut f = Field::number("percentEdge").bounds(Some(0), Some(100));
        f.set_value("101");
        assert!(!f.is_valid());
        f.set_value("100");
        assert!(f.is_valid());
        let empty = Field::text("k8sNamespace").required();
        assert!(!empty.is_valid());
    }

    #[test]
    fn surface_holds_one_artifact() {
        let mut s = Surface::default();
        s.show(Artifact { class: ArtifactClass::Mermaid, text: "a".into() });
        s.show(Artifact { class: ArtifactClass::Yaml, text: "b".into() });
        assert_eq!(s.text(), Some("b"));
        assert_eq!(s.artifact().map(|a| a.class), Some(ArtifactClass::Yaml));
        let mut t = RenderTarget { failure: Surface::default(), success: s };
        t.reset();
        assert!(t.is_blank());
    }
}
