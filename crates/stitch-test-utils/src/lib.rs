//! Testing utilities for the Stitcher workspace
//!
//! Scripted generators, fixture payloads and a landing-page template graph.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use stitch_assembly::{ComponentSlot, Fragment, InjectionMap, SlotType, TemplateGraph};
use stitch_core::{AgentRole, Generator, GeneratorError, PromptContext};

pub type Reply = Result<String, GeneratorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ScriptKey {
    Research,
    Variant(u8),
    Any,
}

/// Replays fixed replies and records every call
///
/// Research calls read the research script. Designer calls read the
/// variant's own script when one was given, otherwise the shared script.
/// An empty script answers with the fallback reply, or `Unavailable`.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<ScriptKey, VecDeque<Reply>>>,
    fallback: Option<Reply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<PromptContext>>,
}

impl ScriptedGenerator {
    /// Shared script for every designer call
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        let generator = Self::default();
        generator
            .scripts
            .lock()
            .insert(ScriptKey::Any, replies.into_iter().collect());
        generator
    }

    /// Answer every call with the same reply
    pub fn always(reply: Reply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::default()
        }
    }

    /// Script for one variant
    #[must_use]
    pub fn with_variant(self, variant: u8, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripts
            .lock()
            .insert(ScriptKey::Variant(variant), replies.into_iter().collect());
        self
    }

    /// Reply to the research call
    #[must_use]
    pub fn with_research(self, reply: Reply) -> Self {
        self.scripts
            .lock()
            .insert(ScriptKey::Research, VecDeque::from([reply]));
        self
    }

    /// Sleep before every reply
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total calls made
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Designer calls made for `variant`
    pub fn calls_for(&self, variant: u8) -> usize {
        self.prompts
            .lock()
            .iter()
            .filter(|p| p.role == AgentRole::Designer && p.variant.map(|v| v.get()) == Some(variant))
            .count()
    }

    /// Every prompt received, in call order
    pub fn prompts(&self) -> Vec<PromptContext> {
        self.prompts.lock().clone()
    }

    fn next_reply(&self, ctx: &PromptContext) -> Reply {
        let key = match (ctx.role, ctx.variant) {
            (AgentRole::Researcher, _) => ScriptKey::Research,
            (AgentRole::Designer, Some(v)) => ScriptKey::Variant(v.get()),
            (AgentRole::Designer, None) => ScriptKey::Any,
        };
        let mut scripts = self.scripts.lock();
        let key = if scripts.contains_key(&key) || key == ScriptKey::Research {
            key
        } else {
            ScriptKey::Any
        };
        scripts
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(GeneratorError::Unavailable("script exhausted".into())))
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, ctx: &PromptContext) -> Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(ctx.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply(ctx)
    }
}

/// Generator whose backend is always down
#[derive(Debug, Default)]
pub struct FailingGenerator {
    calls: AtomicUsize,
}

impl FailingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _ctx: &PromptContext) -> Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GeneratorError::Unavailable("connection refused".into()))
    }
}

/// A design variant that satisfies the built-in schema
pub fn valid_variant(name: &str) -> Value {
    json!({
        "variant_name": name,
        "layout": "bento_grid",
        "components": ["hero", "features", "pricing", "footer"],
        "colors": {"primary": "#00FF41", "secondary": "#1A1A1A", "bg": "#0D0D0D"},
        "typography": {"heading": "JetBrains Mono", "body": "Inter"},
        "border_radius": "4px",
        "headline": "Grooming, elevated"
    })
}

/// [`valid_variant`] as generator output
pub fn valid_variant_json(name: &str) -> String {
    valid_variant(name).to_string()
}

/// Well-formed JSON missing every required field but the name
pub fn incomplete_variant_json() -> String {
    json!({"variant_name": "Half done"}).to_string()
}

/// Landing page graph covering every allowlisted component
pub fn landing_template() -> TemplateGraph {
    TemplateGraph::new(
        "landing",
        1,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{{BRAND}}</title>\
         <link rel=\"stylesheet\" href=\"css/site.css\"></head>\n\
         <body id=\"top\" style=\"--primary: {{PRIMARY}}; --secondary: {{SECONDARY}}; --bg: {{BG}}; \
         --font-heading: {{HEADING_FONT}}; --font-body: {{BODY_FONT}}\">\n\
         <main class=\"{{@LAYOUT}}\">\n{{@COMPONENTS}}\n</main>\n</body>\n</html>\n",
    )
    .with_asset("css/site.css")
    .with_layout("bento_grid", "grid grid-cols-3 gap-4")
    .with_layout("single_column", "flex flex-col")
    .with_layout("split_hero", "grid grid-cols-2")
    .with_layout("magazine", "columns-2")
    .with_component(
        "hero",
        Fragment::new(
            "<section id=\"hero\" class=\"hero\"><h1>{{HEADLINE}}</h1>\
             <a class=\"cta\" href=\"{{CTA_URL}}\">Book now</a>\
             <img src=\"img/hero.webp\" alt=\"{{BRAND}}\"></section>",
        )
        .with_asset("img/hero.webp"),
    )
    .with_component(
        "features",
        Fragment::new(
            "<section id=\"features\"><h2>Why {{BRAND}}</h2>\
             <ul><li>Certified groomers</li><li>Organic products</li></ul></section>",
        ),
    )
    .with_component(
        "pricing",
        Fragment::new(
            "<section id=\"pricing\"><h2>Pricing</h2><p class=\"price\">${{PRICE}}</p></section>",
        ),
    )
    .with_component(
        "testimonials",
        Fragment::new("<section id=\"testimonials\"><blockquote>Five stars.</blockquote></section>"),
    )
    .with_component(
        "gallery",
        Fragment::new("<section id=\"gallery\"><img src=\"img/gallery-1.webp\" alt=\"Gallery\"></section>")
            .with_asset("img/gallery-1.webp"),
    )
    .with_component(
        "contact",
        Fragment::new("<section id=\"contact\"><a href=\"{{CONTACT_URL}}\">Contact us</a></section>"),
    )
    .with_component(
        "footer",
        Fragment::new("<footer><p>&copy; {{BRAND}}</p><a href=\"#top\">Back to top</a></footer>"),
    )
    .with_slot("HEADLINE", ComponentSlot::payload(SlotType::Text, "headline"))
    .with_slot("PRIMARY", ComponentSlot::payload(SlotType::Color, "colors.primary"))
    .with_slot("SECONDARY", ComponentSlot::payload(SlotType::Color, "colors.secondary"))
    .with_slot("BG", ComponentSlot::payload(SlotType::Color, "colors.bg"))
    .with_slot("HEADING_FONT", ComponentSlot::payload(SlotType::Text, "typography.heading"))
    .with_slot("BODY_FONT", ComponentSlot::payload(SlotType::Text, "typography.body"))
    .with_slot("BRAND", ComponentSlot::injection(SlotType::Text, "brand.name"))
    .with_slot("CTA_URL", ComponentSlot::injection(SlotType::Url, "cta.url"))
    .with_slot("PRICE", ComponentSlot::injection(SlotType::Numeric, "price.pro"))
    .with_slot("CONTACT_URL", ComponentSlot::injection(SlotType::Url, "contact.url"))
}

/// [`landing_template`] whose features fragment leaves a `<div>` open
pub fn landing_template_with_unclosed_tag() -> TemplateGraph {
    landing_template().with_component(
        "features",
        Fragment::new(
            "<section id=\"features\"><div class=\"grid\"><h2>Why {{BRAND}}</h2></section>",
        ),
    )
}

/// Injections every landing slot needs
pub fn landing_injections() -> InjectionMap {
    InjectionMap::new()
        .with("brand.name", "Luxury Pet Spa")
        .with("cta.url", "https://example.com/book")
        .with("price.pro", 85)
        .with("contact.url", "mailto:hello@example.com")
}
