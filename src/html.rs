//! An in-memory markup tree adapter.
//!
//! Useful for rendering on servers and for testing, since its nodes can be inspected and serialized at any time.

use crate::{
	adapter::{Adapter, Arrange, Namespace, Patch},
	element::{Props, RawValue},
	event::{self, Event, NodeListener},
	Error,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter, Write as _},
	hash::{Hash, Hasher},
	iter,
};
use std::{
	collections::BTreeMap,
	rc::{Rc, Weak},
};
use tracing::{instrument, trace};

const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr"];

/// A node of an in-memory markup tree. Compares by identity.
#[derive(Clone)]
pub struct HtmlNode(Rc<NodeData>);

struct NodeData {
	kind: NodeKind,
	parent: RefCell<Weak<NodeData>>,
	listeners: RefCell<Vec<NodeListener>>,
}

enum NodeKind {
	Element {
		tag: Rc<str>,
		namespace: Namespace,
		attributes: RefCell<BTreeMap<Rc<str>, String>>,
		inner_html: RefCell<Option<Rc<str>>>,
		children: RefCell<Vec<HtmlNode>>,
	},
	Text(RefCell<String>),
	/// Markup inserted verbatim.
	Raw(Rc<str>),
}

impl PartialEq for HtmlNode {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for HtmlNode {}

impl Hash for HtmlNode {
	fn hash<H: Hasher>(&self, state: &mut H) {
		Rc::as_ptr(&self.0).hash(state);
	}
}

impl Debug for HtmlNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match &self.0.kind {
			NodeKind::Element { tag, .. } => write!(f, "HtmlNode(<{tag}>)"),
			NodeKind::Text(text) if cfg!(feature = "dangerous-logging") => write!(f, "HtmlNode({:?})", text.borrow()),
			NodeKind::Text(_) => f.write_str("HtmlNode(#text)"),
			NodeKind::Raw(_) => f.write_str("HtmlNode(#raw)"),
		}
	}
}

impl HtmlNode {
	fn new(kind: NodeKind) -> Self {
		Self(Rc::new(NodeData {
			kind,
			parent: RefCell::new(Weak::new()),
			listeners: RefCell::default(),
		}))
	}

	pub fn element(tag: impl Into<Rc<str>>) -> Self {
		Self::element_ns(tag, Namespace::Html)
	}

	pub fn element_ns(tag: impl Into<Rc<str>>, namespace: Namespace) -> Self {
		Self::new(NodeKind::Element {
			tag: tag.into(),
			namespace,
			attributes: RefCell::default(),
			inner_html: RefCell::new(None),
			children: RefCell::default(),
		})
	}

	pub fn text(text: impl Into<String>) -> Self {
		Self::new(NodeKind::Text(RefCell::new(text.into())))
	}

	pub fn raw(markup: impl Into<Rc<str>>) -> Self {
		Self::new(NodeKind::Raw(markup.into()))
	}

	#[must_use]
	pub fn tag(&self) -> Option<&str> {
		match &self.0.kind {
			NodeKind::Element { tag, .. } => Some(tag),
			_ => None,
		}
	}

	#[must_use]
	pub fn namespace(&self) -> Option<Namespace> {
		match &self.0.kind {
			NodeKind::Element { namespace, .. } => Some(*namespace),
			_ => None,
		}
	}

	#[must_use]
	pub fn is_text(&self) -> bool {
		matches!(self.0.kind, NodeKind::Text(_))
	}

	#[must_use]
	pub fn attribute(&self, name: &str) -> Option<String> {
		match &self.0.kind {
			NodeKind::Element { attributes, .. } => attributes.borrow().get(name).cloned(),
			_ => None,
		}
	}

	pub fn set_attribute(&self, name: impl Into<Rc<str>>, value: impl Into<String>) {
		if let NodeKind::Element { attributes, .. } = &self.0.kind {
			attributes.borrow_mut().insert(name.into(), value.into());
		}
	}

	pub fn remove_attribute(&self, name: &str) {
		if let NodeKind::Element { attributes, .. } = &self.0.kind {
			attributes.borrow_mut().remove(name);
		}
	}

	#[must_use]
	pub fn children(&self) -> Vec<HtmlNode> {
		match &self.0.kind {
			NodeKind::Element { children, .. } => children.borrow().clone(),
			_ => Vec::new(),
		}
	}

	#[must_use]
	pub fn parent(&self) -> Option<HtmlNode> {
		self.0.parent.borrow().upgrade().map(HtmlNode)
	}

	/// Moves `child` to the end of this node's children.
	pub fn append_child(&self, child: &HtmlNode) {
		let mut children = self.children();
		children.retain(|existing| existing != child);
		children.push(child.clone());
		self.set_children(&children);
	}

	/// Replaces this node's children, detaching `children` from wherever they were before.
	pub fn set_children(&self, new: &[HtmlNode]) {
		let NodeKind::Element { children, .. } = &self.0.kind else {
			return;
		};

		let old = children.replace(Vec::new());
		for child in &old {
			*child.0.parent.borrow_mut() = Weak::new();
		}
		for child in new {
			if let Some(parent) = child.parent() {
				parent.detach_child(child);
			}
			*child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
		}
		*children.borrow_mut() = new.to_vec();
	}

	/// Removes this node from its parent, if any.
	pub fn detach(&self) {
		if let Some(parent) = self.parent() {
			parent.detach_child(self);
		}
		*self.0.parent.borrow_mut() = Weak::new();
	}

	fn detach_child(&self, child: &HtmlNode) {
		if let NodeKind::Element { children, .. } = &self.0.kind {
			children.borrow_mut().retain(|existing| existing != child);
		}
	}

	/// Dispatches `event` at this node, capturing down from and bubbling up to the root of its tree.
	///
	/// Returns `false` iff a listener prevented the default.
	pub fn dispatch_event(&self, event: &Event) -> bool {
		let ancestors: Vec<_> = iter::successors(self.parent(), HtmlNode::parent).collect();
		event::propagate(self, &ancestors, event, HtmlNode::fire)
	}

	fn fire(&self, event: &Event, capture: Option<bool>) {
		let matching: Vec<_> = self
			.0
			.listeners
			.borrow()
			.iter()
			.filter(|listener| listener.ty() == event.ty() && capture.map_or(true, |capture| listener.capture() == capture))
			.cloned()
			.collect();
		for listener in matching {
			listener.call(event);
			if event.is_immediate_propagation_stopped() {
				break;
			}
		}
	}

	fn set_text(&self, value: &str) {
		if let NodeKind::Text(text) = &self.0.kind {
			let mut text = text.borrow_mut();
			if *text != value {
				text.clear();
				text.push_str(value);
			}
		}
	}

	fn set_inner_html(&self, value: Option<Rc<str>>) {
		if let NodeKind::Element { inner_html, .. } = &self.0.kind {
			*inner_html.borrow_mut() = value;
		}
	}

	/// The concatenated text of this node and its descendants.
	#[must_use]
	pub fn text_content(&self) -> String {
		match &self.0.kind {
			NodeKind::Element { children, .. } => children.borrow().iter().map(HtmlNode::text_content).collect(),
			NodeKind::Text(text) => text.borrow().clone(),
			NodeKind::Raw(markup) => markup.to_string(),
		}
	}

	#[must_use]
	pub fn inner_html(&self) -> String {
		let mut html = String::new();
		self.write_inner(&mut html);
		html
	}

	#[must_use]
	pub fn outer_html(&self) -> String {
		let mut html = String::new();
		self.write_outer(&mut html);
		html
	}

	fn write_inner(&self, html: &mut String) {
		if let NodeKind::Element { inner_html, children, .. } = &self.0.kind {
			if let Some(inner_html) = &*inner_html.borrow() {
				html.push_str(inner_html);
			} else {
				for child in children.borrow().iter() {
					child.write_outer(html);
				}
			}
		}
	}

	fn write_outer(&self, html: &mut String) {
		match &self.0.kind {
			NodeKind::Element { tag, attributes, .. } => {
				html.push('<');
				html.push_str(tag);
				for (name, value) in attributes.borrow().iter() {
					if value.is_empty() {
						let _ = write!(html, " {name}");
					} else {
						let _ = write!(html, " {name}=\"{}\"", escape(value, true));
					}
				}
				html.push('>');
				if VOID_ELEMENTS.contains(&&**tag) {
					return;
				}
				self.write_inner(html);
				let _ = write!(html, "</{tag}>");
			}
			NodeKind::Text(text) => html.push_str(&escape(&text.borrow(), false)),
			NodeKind::Raw(markup) => html.push_str(markup),
		}
	}
}

fn escape(text: &str, attribute: bool) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' if attribute => escaped.push_str("&quot;"),
			c => escaped.push(c),
		}
	}
	escaped
}

/// Renders into [`HtmlNode`] trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlAdapter;

impl Adapter for HtmlAdapter {
	type Node = HtmlNode;
	type Scope = Namespace;

	fn scope(&self, tag: &str, _props: &Props, scope: &Namespace) -> Namespace {
		scope.for_children(tag)
	}

	fn create(&self, tag: &str, _props: &Props, scope: &Namespace) -> Result<HtmlNode, Error> {
		if tag.is_empty() || tag.contains(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '/' | '"')) {
			return Err(Error::adapter(format!("invalid tag name {tag:?}")));
		}
		Ok(HtmlNode::element_ns(tag, scope.for_element(tag)))
	}

	fn adopt(&self, node: &HtmlNode) -> Vec<HtmlNode> {
		node.children()
	}

	#[instrument(skip_all, fields(tag = patch.tag))]
	fn patch(&self, patch: Patch<'_, Self>) {
		let Patch {
			node,
			props,
			old_props,
			copy_props,
			..
		} = patch;

		for (name, value) in props.iter() {
			if copy_props.contains(name) || old_props.and_then(|old| old.get(name)) == Some(value) {
				continue;
			}
			if &**name == "innerHTML" {
				node.set_inner_html(value.to_attribute().map(Into::into));
				continue;
			}
			match value.to_attribute() {
				Some(attribute) => node.set_attribute(name.clone(), attribute),
				None => node.remove_attribute(name),
			}
		}

		for name in old_props.into_iter().flat_map(|old| old.names()) {
			if !props.contains(name) && !copy_props.contains(name) {
				trace!(%name, "Removing prop.");
				if &**name == "innerHTML" {
					node.set_inner_html(None);
				} else {
					node.remove_attribute(name);
				}
			}
		}
	}

	fn arrange(&self, arrange: Arrange<'_, Self>) {
		if arrange.props.contains("innerHTML") {
			return;
		}
		arrange.node.set_children(arrange.children);
	}

	fn remove(&self, node: &HtmlNode, parent: Option<&HtmlNode>, is_nested: bool) {
		if is_nested {
			return;
		}
		match (node.parent(), parent) {
			(Some(actual), Some(expected)) if actual != *expected => trace!("Node was moved elsewhere. Not removing it."),
			_ => node.detach(),
		}
	}

	fn text(&self, value: &str, _scope: &Namespace, old: Option<&HtmlNode>) -> HtmlNode {
		match old {
			Some(old) if old.is_text() => {
				old.set_text(value);
				old.clone()
			}
			_ => HtmlNode::text(value),
		}
	}

	fn raw(&self, value: &RawValue<HtmlNode>, _scope: &Namespace) -> Result<Vec<HtmlNode>, Error> {
		Ok(match value {
			RawValue::Markup(markup) => vec![HtmlNode::raw(markup.clone())],
			RawValue::Nodes(nodes) => nodes.clone(),
		})
	}

	fn add_listener(&self, node: &HtmlNode, listener: &NodeListener) {
		let mut listeners = node.0.listeners.borrow_mut();
		if !listeners.iter().any(|existing| existing.is(listener)) {
			listeners.push(listener.clone());
		}
	}

	fn remove_listener(&self, node: &HtmlNode, listener: &NodeListener) {
		node.0.listeners.borrow_mut().retain(|existing| !existing.is(listener));
	}
}
