#![forbid(unsafe_code)]

use metrics::counter;
use meshgen_core::{EffectiveParameters, ParamKind, ParamValue, ParameterSpec, Route, MAX_REPLICAS_KEY, MIN_REPLICAS_KEY};
use tracing::{debug, warn};

use crate::model::{FieldKind, Form};

/// Write the location's parameters into `form` and read back what the form
/// now holds. Keys without a matching field are logged and skipped.
pub fn sync(form: &mut Form, spec: &ParameterSpec, route: &Route) -> EffectiveParameters {
    let mut out = EffectiveParameters::new();
    for decl in route.ordered(spec) {
        let Some(field) = form.field_mut(&decl.name) else {
            warn!(form = %form.id, key = %decl.name, "sync: no field in form for parameter");
            counter!("meshgen_config_mismatch_total", 1);
            continue;
        };
        let is_checkbox = field.kind == FieldKind::Checkbox;
        if (decl.kind == ParamKind::Flag) != is_checkbox {
            debug!(key = %decl.name, kind = ?decl.kind, element = ?field.kind, "sync: declared kind differs from element");
        }
        let value = match decl.kind {
            ParamKind::Flag => {
                field.checked = route.has(&decl.name);
                ParamValue::Flag(field.checked)
            }
            ParamKind::Number | ParamKind::Text => {
                match route.get(&decl.name) {
                    Some(v) => field.set_value(v),
                    None => field.set_value(&decl.default.render()),
                }
                if decl.kind == ParamKind::Number {
                    ParamValue::Number(field.value.clone())
                } else {
                    ParamValue::Text(field.value.clone())
                }
            }
        };
        out.set(&decl.name, value);
    }
    out
}

/// `parseInt(v || '0')`-style read: leading integer part, empty or garbage is 0.
fn int_value(form: &Form, name: &str) -> i64 {
    let raw = form.value(name).unwrap_or("").trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|f| f.trunc() as i64))
        .unwrap_or(0)
}

/// Keep `minReplicas <= maxReplicas` after the user edits one of them.
/// The edited field wins; returns the name of the field that was adjusted.
pub fn guard_replicas(form: &mut Form, edited: &str) -> Option<&'static str> {
    let (source, other) = match edited {
        MIN_REPLICAS_KEY => (MIN_REPLICAS_KEY, MAX_REPLICAS_KEY),
        MAX_REPLICAS_KEY => (MAX_REPLICAS_KEY, MIN_REPLICAS_KEY),
        _ => return None,
    };
    if form.field(MIN_REPLICAS_KEY).is_none() || form.field(MAX_REPLICAS_KEY).is_none() {
        return None;
    }
    if int_value(form, MIN_REPLICAS_KEY) <= int_value(form, MAX_REPLICAS_KEY) {
        return None;
    }
    let value = form.value(source).unwrap_or("").to_string();
    if let Some(f) = form.field_mut(other) {
        f.value = value;
    }
    debug!(edited = source, adjusted = other, "sync: replica bounds reconciled");
    Some(other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, Page};
    use meshgen_core::{decode, View};

    fn random_form() -> Form {
        Page::standard().random.form
    }

    #[test]
    fn defaults_fill_absent_keys() {
        let mut form = random_form();
        let spec = ParameterSpec::for_view(View::Random, 1234);
        let eff = sync(&mut form, &spec, &decode("#random").unwrap());
        assert_eq!(eff.len(), spec.len());
        assert_eq!(eff.get("seed"), Some(&ParamValue::Number("1234".into())));
        assert_eq!(eff.get("k8sApp"), Some(&ParamValue::Text("api-play".into())));
        assert_eq!(eff.get("yaml"), Some(&ParamValue::Flag(false)));
        assert_eq!(form.value("numServices"), Some("3"));
        assert!(!form.field("yaml").unwrap().checked);
    }

    #[test]
    fn overrides_reach_form_and_parameters() {
        let mut form = random_form();
        let spec = ParameterSpec::for_view(View::Random, 1);
        let eff = sync(&mut form, &spec, &decode("#random?numServices=9&yaml&k8sNamespace=demo").unwrap());
        assert_eq!(eff.get("numServices"), Some(&ParamValue::Number("9".into())));
        assert_eq!(form.value("numServices"), Some("9"));
        assert_eq!(form.value("k8sNamespace"), Some("demo"));
        assert!(form.field("yaml").unwrap().checked);
        assert!(eff.flag("yaml"));
    }

    #[test]
    fn previous_overrides_do_not_stick() {
        let mut form = random_form();
        let spec = ParameterSpec::for_view(View::Random, 1);
        sync(&mut form, &spec, &decode("#random?numServices=9&yaml").unwrap());
        sync(&mut form, &spec, &decode("#random").unwrap());
        assert_eq!(form.value("numServices"), Some("3"));
        assert!(!form.field("yaml").unwrap().checked);
    }

    #[test]
    fn missing_field_is_skipped() {
        let mut form = Form::new("f", vec![Field::number("seed")]);
        let spec = ParameterSpec::legacy_random(5);
        let eff = sync(&mut form, &spec, &decode("#random").unwrap());
        assert_eq!(eff.len(), 1);
        assert_eq!(eff.get("seed"), Some(&ParamValue::Number("5".into())));
    }

    #[test]
    fn non_numeric_override_is_dropped() {
        let mut form = random_form();
        let spec = ParameterSpec::for_view(View::Random, 1);
        let eff = sync(&mut form, &spec, &decode("#random?numServices=lots").unwrap());
        assert_eq!(eff.get("numServices").and_then(|v| v.to_query()), None);
    }

    #[test]
    fn editing_min_pulls_max_up() {
        let mut form = random_form();
        form.field_mut("minReplicas").unwrap().value = "7".into();
        form.field_mut("maxReplicas").unwrap().value = "2".into();
        assert_eq!(guard_replicas(&mut form, "minReplicas"), Some("maxReplicas"));
        assert_eq!(form.value("maxReplicas"), Some("7"));
        assert_eq!(form.value("minReplicas"), Some("7"));
    }

    #[test]
    fn editing_max_pulls_min_down() {
        let mut form = random_form();
        form.field_mut("minReplicas").unwrap().value = "5".into();
        form.field_mut("maxReplicas").unwrap().value = "3".into();
        assert_eq!(guard_replicas(&mut form, "maxReplicas"), Some("minReplicas"));
        assert_eq!(form.value("minReplicas"), Some("3"));
    }

    #[test]
    fn guard_ignores_consistent_and_unrelated_edits() {
        let mut form = random_form();
        form.field_mut("minReplicas").unwrap().value = "2".into();
        form.field_mut("maxReplicas").unwrap().value = "".into();
        // empty reads as 0, so min > max
        assert_eq!(guard_replicas(&mut form, "numServices"), None);
        assert_eq!(guard_replicas(&mut form, "minReplicas"), Some("maxReplicas"));
        assert_eq!(guard_replicas(&mut form, "maxReplicas"), None);
    }

    #[test]
    fn guard_keeps_invariant_over_edit_sequences() {
        let mut form = random_form();
        let edits = [("minReplicas", "4"), ("maxReplicas", "1"), ("minReplicas", "9"), ("maxReplicas", "12"), ("minReplicas", "3"), ("maxReplicas", "0")];
        for (name, value) in edits {
            form.field_mut(name).unwrap().value = value.into();
            guard_replicas(&mut form, name);
            assert_eq!(form.value(name), Some(value));
            assert!(int_value(&form, "minReplicas") <= int_value(&form, "maxReplicas"));
        }
    }
}
