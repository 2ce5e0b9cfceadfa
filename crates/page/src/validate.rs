#![forbid(unsafe_code)]

use tracing::debug;

use crate::model::{FieldKind, Form};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Native submission was cancelled.
    pub prevented: bool,
    pub valid: bool,
    /// Names of fields failing constraint validation.
    pub invalid: Vec<String>,
}

/// Submit handler for validated forms. Native submission never goes through
/// for forms that need validation; the form is marked as attempted either way.
pub fn guard_submit(form: &mut Form) -> SubmitOutcome {
    let invalid: Vec<String> = form.fields.iter().filter(|f| !f.is_valid()).map(|f| f.name.clone()).collect();
    let valid = invalid.is_empty();
    form.was_validated = true;
    debug!(form = %form.id, valid, invalid = ?invalid, "validate: submit");
    SubmitOutcome { prevented: form.needs_validation, valid, invalid }
}

/// Query pairs describing the form as it stands: non-empty values, checked
/// boxes as bare keys.
pub fn form_pairs(form: &Form) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(form.fields.len());
    for f in &form.fields {
        if f.kind == FieldKind::Checkbox {
            if f.checked {
                out.push((f.name.clone(), String::new()));
            }
        } else if !f.value.is_empty() {
            out.push((f.name.clone(), f.value.clone()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, Page};

    #[test]
    fn invalid_form_is_blocked_and_marked() {
        let mut form = Page::standard().random.form;
        let out = guard_submit(&mut form);
        assert!(out.prevented);
        assert!(!out.valid);
        assert!(out.invalid.contains(&"seed".to_string()));
        assert!(form.was_validated);
    }

    #[test]
    fn valid_form_is_still_prevented() {
        let mut form = Form::new("f", vec![Field::number("n").required()]);
        form.field_mut("n").unwrap().set_value("3");
        let out = guard_submit(&mut form);
        assert!(out.prevented);
        assert!(out.valid);
        assert!(out.invalid.is_empty());
    }

    #[test]
    fn unmarked_form_submits_natively() {
        let mut form = Form::new("plain", vec![]);
        form.needs_validation = false;
        let out = guard_submit(&mut form);
        assert!(!out.prevented);
        assert!(form.was_validated);
    }

    #[test]
    fn pairs_skip_empty_and_unchecked() {
        let mut form = Form::new("f", vec![Field::text("a"), Field::text("b"), Field::checkbox("yaml"), Field::checkbox("off")]);
        form.field_mut("a").unwrap().value = "x".into();
        form.field_mut("yaml").unwrap().checked = true;
        assert_eq!(form_pairs(&form), vec![("a".to_string(), "x".to_string()), ("yaml".to_string(), String::new())]);
    }
}
