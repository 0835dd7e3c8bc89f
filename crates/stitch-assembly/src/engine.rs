//! Assembly engine
//!
//! Assembly is pure given its inputs. Composition places trusted template
//! fragments first; then every slot value is resolved and rendered; then a
//! single substitution pass writes them in. Substituted values are never
//! rescanned, so a value cannot introduce a token of its own.

use crate::assets::AssetRoot;
use crate::error::{AssemblyError, UnresolvedReason};
use crate::injection::InjectionMap;
use crate::render::render;
use crate::template::{SlotSource, TemplateGraph, COMPONENTS_MARKER, LAYOUT_MARKER, TOKEN};
use indexmap::{IndexMap, IndexSet};
use regex::Captures;
use serde_json::Value;
use stitch_artifact::AssembledArtifact;
use stitch_guardian::SanitizedPayload;
use tracing::{debug, info};

/// Deterministic assembler bound to one asset root
#[derive(Debug, Clone)]
pub struct AssemblyEngine {
    assets: AssetRoot,
}

impl AssemblyEngine {
    /// Create an engine
    #[inline]
    #[must_use]
    pub fn new(assets: AssetRoot) -> Self {
        Self { assets }
    }

    /// Asset root
    #[inline]
    #[must_use]
    pub fn assets(&self) -> &AssetRoot {
        &self.assets
    }

    /// Merge a sanitized payload into `template`
    ///
    /// # Errors
    /// - `MissingComponentMarker` if the shell is malformed
    /// - `UnknownComponent` if the payload names a component the template lacks
    /// - `InvalidLayout` if the layout marker is used and the layout is unmapped
    /// - `PathTraversal` / `MissingAsset` for bad asset paths
    /// - `UnresolvedSlot` if a token has no declaration or no value
    /// - `InvalidSlotValue` if a value does not fit its slot type
    pub fn assemble(
        &self,
        sanitized: &SanitizedPayload,
        template: &TemplateGraph,
        injections: &InjectionMap,
    ) -> Result<AssembledArtifact, AssemblyError> {
        let composed = compose(sanitized, template)?;

        let mut assets = IndexSet::new();
        for asset in &template.assets {
            assets.insert(self.assets.check(asset)?);
        }
        for component in sanitized.components() {
            if let Some(fragment) = template.components.get(component) {
                for asset in &fragment.assets {
                    assets.insert(self.assets.check(asset)?);
                }
            }
        }

        let mut resolved: IndexMap<String, String> = IndexMap::new();
        for caps in TOKEN.captures_iter(&composed) {
            let name = &caps[1];
            if resolved.contains_key(name) {
                continue;
            }
            let unresolved = |reason| AssemblyError::UnresolvedSlot {
                slot: name.to_string(),
                reason,
            };
            let slot = template
                .slots
                .get(name)
                .ok_or_else(|| unresolved(UnresolvedReason::Undeclared))?;
            let value = match &slot.source {
                SlotSource::Payload { field } => sanitized
                    .field(field)
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| unresolved(UnresolvedReason::MissingPayloadField(field.clone())))?,
                SlotSource::Injection { key } => injections
                    .get(key)
                    .ok_or_else(|| unresolved(UnresolvedReason::MissingInjection(key.clone())))?,
            };
            let rendered = render(name, slot.kind, value, &self.assets)?;
            if let Some(asset) = rendered.asset {
                assets.insert(asset);
            }
            debug!(slot = name, "Slot resolved");
            resolved.insert(name.to_string(), rendered.text);
        }

        let document = TOKEN
            .replace_all(&composed, |caps: &Captures<'_>| {
                resolved.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned();

        let artifact = AssembledArtifact::new(
            document,
            template.reference(),
            *sanitized.seal(),
            sanitized.variant(),
            assets.into_iter().collect(),
        );
        info!(
            template = %template.id,
            version = template.version,
            components = sanitized.components().len(),
            slots = resolved.len(),
            hash = %artifact.hash().short(),
            "Artifact assembled"
        );
        Ok(artifact)
    }
}

/// Place fragments and the layout class into the shell
fn compose(sanitized: &SanitizedPayload, template: &TemplateGraph) -> Result<String, AssemblyError> {
    let found = template.shell.matches(COMPONENTS_MARKER).count();
    let Some((head, tail)) = template
        .shell
        .split_once(COMPONENTS_MARKER)
        .filter(|_| found == 1)
    else {
        return Err(AssemblyError::MissingComponentMarker {
            template: template.id.clone(),
            found,
        });
    };

    let mut fragments = Vec::with_capacity(sanitized.components().len());
    for component in sanitized.components() {
        let fragment = template.components.get(component).ok_or_else(|| {
            AssemblyError::UnknownComponent {
                component: component.clone(),
            }
        })?;
        fragments.push(fragment.markup.as_str());
    }

    let mut composed = format!("{head}{}{tail}", fragments.join("\n"));

    if composed.contains(LAYOUT_MARKER) {
        let layout = sanitized.field(&template.layout_field).and_then(Value::as_str);
        let class = layout
            .and_then(|l| template.layouts.get(l))
            .ok_or_else(|| AssemblyError::InvalidLayout {
                layout: layout.map(str::to_string),
            })?;
        composed = composed.replace(LAYOUT_MARKER, class);
    }

    Ok(composed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ComponentSlot, Fragment, SlotType};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stitch_artifact::{CandidatePayload, VariantIndex};
    use stitch_guardian::{GuardianConfig, SecurityGuardian, SecurityLog};

    fn sanitize(value: Value) -> SanitizedPayload {
        let guardian = SecurityGuardian::new(GuardianConfig::default()).unwrap();
        let payload = CandidatePayload::generated(VariantIndex::new(2).unwrap(), 1, value.to_string());
        guardian.sanitize(&payload, &SecurityLog::new()).unwrap()
    }

    fn template() -> TemplateGraph {
        TemplateGraph::new(
            "landing",
            1,
            "<main class=\"{{@LAYOUT}}\" style=\"--primary: {{PRIMARY}}\">{{@COMPONENTS}}</main>",
        )
        .with_layout("bento_grid", "grid grid-cols-3")
        .with_component(
            "hero",
            Fragment::new("<h1>{{HEADLINE}}</h1><a href=\"{{CTA_URL}}\">Go</a>")
                .with_asset("img/hero.webp"),
        )
        .with_component("pricing", Fragment::new("<p>${{PRICE}}/mo</p>"))
        .with_component("footer", Fragment::new("<footer>{{HEADLINE}}</footer>"))
        .with_slot("HEADLINE", ComponentSlot::payload(SlotType::Text, "headline"))
        .with_slot("PRIMARY", ComponentSlot::payload(SlotType::Color, "colors.primary"))
        .with_slot("CTA_URL", ComponentSlot::injection(SlotType::Url, "cta.url"))
        .with_slot("PRICE", ComponentSlot::injection(SlotType::Numeric, "price.pro"))
    }

    fn injections() -> InjectionMap {
        InjectionMap::new()
            .with("cta.url", "https://example.com/signup")
            .with("price.pro", 49)
    }

    fn engine() -> AssemblyEngine {
        AssemblyEngine::new(AssetRoot::new("/nonexistent/assets"))
    }

    fn design() -> Value {
        json!({
            "components": ["hero", "pricing", "footer"],
            "layout": "bento_grid",
            "headline": "Fast & <safe>",
            "colors": {"primary": "#00FF41"}
        })
    }

    #[test]
    fn assembles_in_component_order() {
        let sanitized = sanitize(design());
        let artifact = engine().assemble(&sanitized, &template(), &injections()).unwrap();
        assert_eq!(
            artifact.document(),
            "<main class=\"grid grid-cols-3\" style=\"--primary: #00FF41\">\
             <h1>Fast &amp; &lt;safe&gt;</h1><a href=\"https://example.com/signup\">Go</a>\n\
             <p>$49/mo</p>\n\
             <footer>Fast &amp; &lt;safe&gt;</footer></main>"
        );
        assert_eq!(artifact.source(), sanitized.seal());
        assert_eq!(artifact.variant(), VariantIndex::new(2));
        assert_eq!(artifact.assets(), ["img/hero.webp"]);
        assert!(artifact.report().is_none());
    }

    #[test]
    fn missing_injection_is_unresolved() {
        let sanitized = sanitize(design());
        let err = engine()
            .assemble(&sanitized, &template(), &InjectionMap::new().with("cta.url", "#top"))
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::UnresolvedSlot { ref slot, reason: UnresolvedReason::MissingInjection(_) } if slot == "PRICE"
        ));
    }

    #[test]
    fn missing_payload_field_is_unresolved() {
        let mut value = design();
        value.as_object_mut().unwrap().remove("headline");
        let err = engine()
            .assemble(&sanitize(value), &template(), &injections())
            .unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::UnresolvedSlot { reason: UnresolvedReason::MissingPayloadField(_), .. }
        ));
    }

    #[test]
    fn undeclared_token_is_unresolved() {
        let graph = template().with_component("contact", Fragment::new("<p>{{EMAIL}}</p>"));
        let mut value = design();
        value["components"] = json!(["contact"]);
        let err = engine().assemble(&sanitize(value), &graph, &injections()).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::UnresolvedSlot { reason: UnresolvedReason::Undeclared, .. }
        ));
    }

    #[test]
    fn unknown_component_and_layout() {
        let mut value = design();
        value["components"] = json!(["hero", "gallery"]);
        assert!(matches!(
            engine().assemble(&sanitize(value), &template(), &injections()),
            Err(AssemblyError::UnknownComponent { ref component }) if component == "gallery"
        ));

        let mut value = design();
        value["layout"] = json!("magazine");
        assert!(matches!(
            engine().assemble(&sanitize(value), &template(), &injections()),
            Err(AssemblyError::InvalidLayout { layout: Some(_) })
        ));
    }

    #[test]
    fn shell_without_marker_rejected() {
        let mut graph = template();
        graph.shell = "<main></main>".into();
        assert!(matches!(
            engine().assemble(&sanitize(design()), &graph, &injections()),
            Err(AssemblyError::MissingComponentMarker { found: 0, .. })
        ));
    }

    #[test]
    fn traversal_in_fragment_asset_rejected() {
        let graph = template().with_component(
            "hero",
            Fragment::new("<h1>{{HEADLINE}}</h1>").with_asset("../../etc/passwd"),
        );
        assert!(matches!(
            engine().assemble(&sanitize(design()), &graph, &injections()),
            Err(AssemblyError::PathTraversal { .. })
        ));
    }

    #[test]
    fn token_lookalike_values_are_not_expanded() {
        let mut value = design();
        value["headline"] = json!("{{PRICE}}");
        let artifact = engine()
            .assemble(&sanitize(value), &template(), &injections())
            .unwrap();
        assert!(!artifact.document().contains("{{"));
        assert!(artifact.document().contains("&#123;&#123;PRICE&#125;&#125;"));
    }

    #[test]
    fn shell_assets_come_first() {
        let graph = template().with_asset("./css/site.css");
        let artifact = engine()
            .assemble(&sanitize(design()), &graph, &injections())
            .unwrap();
        assert_eq!(artifact.assets(), ["css/site.css", "img/hero.webp"]);

        let graph = template().with_asset("../outside.css");
        assert!(matches!(
            engine().assemble(&sanitize(design()), &graph, &injections()),
            Err(AssemblyError::PathTraversal { .. })
        ));
    }

    #[test]
    fn relative_url_recorded_as_asset() {
        let sanitized = sanitize(design());
        let artifact = engine()
            .assemble(
                &sanitized,
                &template(),
                &injections().with("cta.url", "docs/brochure.pdf"),
            )
            .unwrap();
        assert_eq!(artifact.assets(), ["img/hero.webp", "docs/brochure.pdf"]);
    }
}
