#![doc(html_root_url = "https://docs.rs/cambium/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A retained-tree UI renderer.
//!
//! [`Element`]s describe what should be rendered. A [`Renderer`] reconciles them against the tree it rendered before
//! and commits the difference through an [`Adapter`], which owns the actual output nodes.
//!
//! [`Component`]s can render synchronously, asynchronously, or as (async) generators that keep state between updates.
//! Pending work is spawned onto a [`LocalSpawn`](`futures::task::LocalSpawn`), so any single-threaded executor can drive it.
//!
//! # Logging
//!
//! Diagnostics go through [`tracing`]. Without the `"dangerous-logging"` feature, warning and error messages only contain
//! structural information, but higher log levels may still leak rendered content.

mod adapter;
mod commit;
mod component;
mod context;
mod diff;
mod element;
mod error;
mod event;
mod renderer;
mod retainer;

#[cfg(feature = "dom")]
pub mod dom;
pub mod html;

pub use adapter::{Adapter, Arrange, Namespace, Patch};
pub use component::{AsyncGenerator, Component, Generator, Invocation, Step};
pub use context::Context;
pub use element::{Child, Element, ElementBuilder, Key, NodeRef, PropSelector, PropValue, Props, RawValue, Tag, Value};
pub use error::Error;
pub use event::{Event, EventPhase, ListenerId, ListenerOptions, NodeListener};
pub use renderer::{Rendered, Renderer};
