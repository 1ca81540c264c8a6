use std::collections::BTreeMap;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};

use crate::error::AppError;

/// Renders notification templates against a stringified event context.
///
/// Strict-undefined semantics mean a template referencing a context key that
/// doesn't exist fails the render rather than substituting an empty string;
/// autoescape guards against content injection when rendered bodies are
/// later embedded in HTML (e.g. email channel).
pub fn render(template_source: &str, context: &BTreeMap<String, String>) -> Result<String, AppError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.add_template("_", template_source)
        .map_err(|e| AppError::TemplateRender(e.to_string()))?;

    let tmpl = env
        .get_template("_")
        .map_err(|e| AppError::TemplateRender(e.to_string()))?;

    tmpl.render(context)
        .map_err(|e| AppError::TemplateRender(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_context_keys() {
        let mut ctx = BTreeMap::new();
        ctx.insert("email".to_string(), "a@b.c".to_string());
        let out = render("Welcome, {{ email }}!", &ctx).unwrap();
        assert_eq!(out, "Welcome, a@b.c!");
    }

    #[test]
    fn strict_undefined_fails_on_missing_key() {
        let ctx = BTreeMap::new();
        let err = render("Hello {{ missing }}", &ctx).unwrap_err();
        assert!(matches!(err, AppError::TemplateRender(_)));
    }

    #[test]
    fn autoescapes_html_special_characters() {
        let mut ctx = BTreeMap::new();
        ctx.insert("reason".to_string(), "<script>alert(1)</script>".to_string());
        let out = render("{{ reason }}", &ctx).unwrap();
        assert!(!out.contains("<script>"));
    }
}
