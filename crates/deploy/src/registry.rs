//! Ordered, validated collection of templates.

use std::collections::HashSet;

use anyhow::Result;

use crate::{BuildOutput, DeployError, Template, TemplateSpec};

/// Templates in execution order.
///
/// Declaration order is dependency order: a template may only reference templates
/// declared before it. Typed references are checked on construction, custom hooks
/// are not.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    templates: Vec<Template>,
}

impl Registry {
    pub fn new(templates: Vec<Template>) -> Result<Self> {
        validate(&templates)?;

        tracing::debug!(templates = templates.len(), "Registry validated");
        Ok(Self { templates })
    }

    /// Build a registry from declarative specs, resolving artifacts in `build`.
    pub fn from_manifest(specs: &[TemplateSpec], build: &BuildOutput) -> Result<Self> {
        let templates = specs
            .iter()
            .map(|spec| spec.to_template(build))
            .collect::<Result<Vec<_>>>()?;
        Self::new(templates)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.name.as_str())
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Template;
    type IntoIter = std::slice::Iter<'a, Template>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn validate(templates: &[Template]) -> Result<()> {
    let declared: HashSet<&str> = templates.iter().map(|t| t.name.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(templates.len());

    for template in templates {
        if seen.contains(template.name.as_str()) {
            return Err(DeployError::DuplicateName(template.name.clone()).into());
        }

        if template.artifact.bytecode.is_empty() {
            return Err(DeployError::MissingArtifact(template.name.clone()).into());
        }

        for reference in template.references() {
            if seen.contains(reference) {
                continue;
            }
            if declared.contains(reference) {
                return Err(DeployError::ForwardReference {
                    template: template.name.clone(),
                    reference: reference.to_string(),
                }
                .into());
            }
            return Err(DeployError::UnknownReference(reference.to_string()).into());
        }

        seen.insert(template.name.as_str());
    }

    Ok(())
}
