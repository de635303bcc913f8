// template.rs - The slice of a template that command scanning reads.
//
// Only ids, steps and their shell commands are modelled. Every field is
// optional on the wire so partially formed templates scan to "nothing
// found" instead of failing to deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<TemplateStep>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
}

impl Template {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            steps: None,
        }
    }

    /// Appends a step, creating the step list if it was absent.
    pub fn with_step(mut self, step: TemplateStep) -> Self {
        self.steps.get_or_insert_with(Vec::new).push(step);
        self
    }
}

impl TemplateStep {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            commands: Some(commands.into_iter().map(Into::into).collect()),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_deserialize_to_empty() {
        let t: Template = serde_json::from_str(r#"{"id": "t1"}"#).unwrap();
        assert_eq!(t.id, "t1");
        assert!(t.steps.is_none());

        let t: Template =
            serde_json::from_str(r#"{"id": "t2", "steps": [{"name": "setup"}, {"commands": ["ls"]}]}"#)
                .unwrap();
        let steps = t.steps.unwrap();
        assert!(steps[0].commands.is_none());
        assert_eq!(steps[1].commands.as_deref(), Some(&["ls".to_string()][..]));
    }

    #[test]
    fn builder_appends_steps_in_order() {
        let t = Template::new("t", "Demo", "1.0.0")
            .with_step(TemplateStep::new(["npm install"]).named("install"))
            .with_step(TemplateStep::new(["npm test"]));
        let steps = t.steps.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name.as_deref(), Some("install"));
    }
}
