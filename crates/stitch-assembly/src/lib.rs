//! Stitcher Assembly Engine
//!
//! Deterministic merge of a [`stitch_guardian::SanitizedPayload`] into a
//! [`TemplateGraph`].
//!
//! # Core Concepts
//!
//! - [`TemplateGraph`]: versioned shell, component fragments and slot declarations
//! - [`ComponentSlot`]: a `{{NAME}}` placeholder with a type and exactly one source
//! - [`InjectionMap`]: operator-supplied facts that bypass the generator
//! - [`AssetRoot`]: the only directory static assets may come from
//!
//! Assembling the same inputs twice yields byte-identical documents.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod assets;
mod engine;
mod error;
mod injection;
mod render;
mod template;

pub use assets::AssetRoot;
pub use engine::AssemblyEngine;
pub use error::{AssemblyError, TemplateError, UnresolvedReason};
pub use injection::InjectionMap;
pub use render::escape_text;
pub use template::{
    is_token_name, ComponentSlot, Fragment, SlotSource, SlotType, TemplateGraph,
    COMPONENTS_MARKER, LAYOUT_MARKER,
};
