//! Minijinja template rendering for alert subject and body.
//!
//! Templates are arbitrary strings from the sensor profile (not
//! pre-registered), so a fresh [`minijinja::Environment`] is created per
//! render call.

use crate::traits::NotifyError;

/// Default subject: `Smoker Temperature Alert at 10/25/23 8:02:30`.
pub const DEFAULT_SUBJECT: &str = "{{ label }} Temperature Alert at {{ timestamp }}";

/// Default body, worded for either policy.
pub const DEFAULT_BODY: &str = "{{ label }} Temperature Alerted That It Has Changed \
{% if policy == 'stall' %}Less{% else %}More{% endif %} than {{ threshold | number }} Degrees \
in the last {{ window_minutes | round(1) }} minutes at {{ timestamp }}\
{% if policy == 'stall' %} indicating a stall{% endif %}.";

/// Data available to alert templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertContext {
    /// Sensor key from the profile file (e.g. `food-a`).
    pub sensor: String,
    /// Display label (e.g. `Food A`).
    pub label: String,
    /// Timestamp token of the reading that triggered the alert.
    pub timestamp: String,
    /// Evaluator reason (e.g. `stall detected`).
    pub reason: String,
    /// Policy kind: `rate_of_change` or `stall`.
    pub policy: String,
    /// Latest temperature in the window.
    pub value: f64,
    /// Tolerance or minimum span the policy was configured with.
    pub threshold: f64,
    /// Window capacity in readings.
    pub window: usize,
    /// Window capacity expressed in minutes at the producer cadence.
    pub window_minutes: f64,
    /// Render time in RFC 3339.
    pub now: String,
}

/// Renders alert templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Build a configured minijinja environment with custom filters and globals.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("number", number_filter);
        env.add_function("env", env_function);
        env
    }

    /// Render a template string with the given context.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template is invalid or
    /// rendering fails.
    pub fn render(&self, template_str: &str, ctx: &AlertContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Validate that a template string parses without errors.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

/// Custom filter: shortest decimal form, so `15.0` renders as `15`.
fn number_filter(value: f64) -> String {
    value.to_string()
}

/// Global function: read an environment variable by name, empty when unset.
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "Environment variable not found, returning empty string");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smoker_context() -> AlertContext {
        AlertContext {
            sensor: "smoker".to_string(),
            label: "Smoker".to_string(),
            timestamp: "10/25/23 8:02:30".to_string(),
            reason: "rate-of-change exceeded tolerance".to_string(),
            policy: "rate_of_change".to_string(),
            value: 116.0,
            threshold: 15.0,
            window: 5,
            window_minutes: 2.5,
            now: "2026-10-19T12:00:00Z".to_string(),
        }
    }

    fn stall_context() -> AlertContext {
        AlertContext {
            sensor: "food-a".to_string(),
            label: "Food A".to_string(),
            timestamp: "10/25/23 9:10:00".to_string(),
            reason: "stall detected".to_string(),
            policy: "stall".to_string(),
            value: 150.5,
            threshold: 1.0,
            window: 20,
            window_minutes: 10.0,
            now: "2026-10-19T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn default_subject_names_sensor_and_time() {
        let renderer = TemplateRenderer::new();
        let subject = renderer.render(DEFAULT_SUBJECT, &smoker_context()).unwrap();
        assert_eq!(subject, "Smoker Temperature Alert at 10/25/23 8:02:30");
    }

    #[test]
    fn default_body_for_rate_of_change() {
        let renderer = TemplateRenderer::new();
        let body = renderer.render(DEFAULT_BODY, &smoker_context()).unwrap();
        assert_eq!(
            body,
            "Smoker Temperature Alerted That It Has Changed More than 15 Degrees \
             in the last 2.5 minutes at 10/25/23 8:02:30."
        );
    }

    #[test]
    fn default_body_for_stall() {
        let renderer = TemplateRenderer::new();
        let body = renderer.render(DEFAULT_BODY, &stall_context()).unwrap();
        assert!(body.contains("Changed Less than 1 Degrees"), "got: {body}");
        assert!(body.contains("last 10.0 minutes"), "got: {body}");
        assert!(body.ends_with("indicating a stall."), "got: {body}");
    }

    #[test]
    fn round_filter_no_decimals() {
        let renderer = TemplateRenderer::new();
        let out = renderer.render("{{ value | round }}", &stall_context()).unwrap();
        assert_eq!(out, "150");
    }

    #[test]
    fn number_filter_keeps_fractions() {
        let renderer = TemplateRenderer::new();
        let mut ctx = smoker_context();
        ctx.threshold = 12.5;
        let out = renderer.render("{{ threshold | number }}", &ctx).unwrap();
        assert_eq!(out, "12.5");
    }

    #[test]
    fn render_env_function() {
        std::env::set_var("PITWATCH_NOTIFY_TEST_VAR", "backyard");
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render("[{{ env('PITWATCH_NOTIFY_TEST_VAR') }}] {{ reason }}", &stall_context())
            .unwrap();
        assert_eq!(out, "[backyard] stall detected");
        std::env::remove_var("PITWATCH_NOTIFY_TEST_VAR");
    }

    #[test]
    fn invalid_template_produces_error() {
        let renderer = TemplateRenderer::new();
        match renderer.render("{{ unclosed", &smoker_context()) {
            Err(NotifyError::Template(msg)) => assert!(!msg.is_empty()),
            other => panic!("Expected Template error, got: {:?}", other),
        }
    }

    #[test]
    fn validate_templates() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.validate(DEFAULT_SUBJECT).is_ok());
        assert!(renderer.validate(DEFAULT_BODY).is_ok());
        assert!(renderer.validate("{% if %}").is_err());
    }
}
