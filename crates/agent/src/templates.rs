use serde::Serialize;
use tera::{Context, Tera};

const REPLY_TEMPLATE: &str = "reply.html";

/// Variables available to rule templates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TemplateVars {
    pub customer_email: String,
    pub order_number: Option<String>,
    pub company_name: String,
    pub subject: String,
    pub signature: String,
}

/// Renders plain-text replies into the outbound HTML body.
#[derive(Clone, Debug)]
pub struct ReplyRenderer {
    tera: Tera,
}

impl ReplyRenderer {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(REPLY_TEMPLATE, include_str!("../../../templates/reply.html.tera"))?;
        Ok(Self { tera })
    }

    /// Blank lines separate paragraphs; single newlines become `<br>`. Text is escaped.
    pub fn render_html(&self, text: &str, company_name: &str) -> Result<String, tera::Error> {
        let paragraphs = paragraphs(text);
        let mut context = Context::new();
        context.insert("paragraphs", &paragraphs);
        context.insert("company_name", company_name);
        self.tera.render(REPLY_TEMPLATE, &context)
    }
}

fn paragraphs(text: &str) -> Vec<Vec<String>> {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(|block| {
            block.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect::<Vec<_>>()
        })
        .filter(|lines| !lines.is_empty())
        .collect()
}

/// Renders an operator-authored rule template as plain text.
pub fn render_rule_template(template: &str, vars: &TemplateVars) -> Result<String, tera::Error> {
    let context = Context::from_serialize(vars)?;
    Tera::one_off(template, &context, false)
}

#[cfg(test)]
mod tests {
    use super::{render_rule_template, ReplyRenderer, TemplateVars};

    #[test]
    fn reply_html_escapes_and_keeps_paragraphs() {
        let renderer = ReplyRenderer::new().expect("embedded template loads");
        let html = renderer
            .render_html("Hi <Jane>,\n\nYour order shipped.\nTracking: 1Z999\n\nBrewly Support", "Brewly")
            .expect("render");

        assert!(html.contains("Hi &lt;Jane&gt;,"));
        assert!(html.contains("Your order shipped.<br>Tracking: 1Z999"));
        assert_eq!(html.matches("<p style=\"margin: 0 0 16px 0;\">").count(), 3);
        assert!(html.contains("Brewly</p>"));
    }

    #[test]
    fn rule_templates_see_order_and_company() {
        let vars = TemplateVars {
            customer_email: "c@example.com".to_string(),
            order_number: Some("4821".to_string()),
            company_name: "Brewly".to_string(),
            subject: "Where is my order".to_string(),
            signature: "The Brewly Team".to_string(),
        };
        let rendered = render_rule_template(
            "Thanks for contacting {{ company_name }}!{% if order_number %} We're checking order #{{ order_number }}.{% endif %}\n\n{{ signature }}",
            &vars,
        )
        .expect("render");

        assert_eq!(
            rendered,
            "Thanks for contacting Brewly! We're checking order #4821.\n\nThe Brewly Team"
        );
    }

    #[test]
    fn broken_rule_templates_are_errors() {
        assert!(render_rule_template("{{ unclosed", &TemplateVars::default()).is_err());
    }
}
