//! A browser DOM adapter on top of [`web_sys`].

use crate::{
	adapter::{Adapter, Arrange, Namespace, Patch},
	element::{Props, RawValue},
	event::{Event, EventPhase, NodeListener},
	Error,
};
use core::cell::RefCell;
use js_sys::Function;
use std::rc::Rc;
use tracing::{error, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::{Document, Element, HtmlTemplateElement, Node, NodeList, Text};

/// Renders into live [`web_sys::Node`]s of one [`Document`].
///
/// Clones share their event bindings.
#[derive(Debug, Clone)]
pub struct DomAdapter {
	document: Document,
	bindings: Rc<RefCell<Vec<Binding>>>,
}

/// A component listener attached to one DOM node.
#[derive(Debug)]
struct Binding {
	node: Node,
	listener: NodeListener,
	handler: Function,
}

impl DomAdapter {
	#[must_use]
	pub fn new(document: Document) -> Self {
		Self {
			document,
			bindings: Rc::default(),
		}
	}

	/// An adapter for the current window's document, if there is one.
	#[must_use]
	pub fn for_window() -> Option<Self> {
		web_sys::window().and_then(|window| window.document()).map(Self::new)
	}
}

impl Adapter for DomAdapter {
	type Node = Node;
	type Scope = Namespace;

	fn scope(&self, tag: &str, _props: &Props, scope: &Namespace) -> Namespace {
		scope.for_children(tag)
	}

	#[instrument(skip(self, props))]
	fn create(&self, tag: &str, props: &Props, scope: &Namespace) -> Result<Node, Error> {
		let document = &self.document;
		let namespace = scope.for_element(tag);
		// This isn't entirely modern, but is well-supported.
		match (namespace.uri(), props.get_str("is")) {
			(None, Some(is)) => document.create_element_with_str(tag, is),
			(None, None) => document.create_element(tag),
			(Some(uri), Some(is)) => document.create_element_ns_with_str(Some(uri), tag, is),
			(Some(uri), None) => document.create_element_ns(Some(uri), tag),
		}
		.map(Into::into)
		.map_err(|error| Error::adapter(format!("Failed to create element: {error:?}")))
	}

	fn adopt(&self, node: &Node) -> Vec<Node> {
		load_child_nodes(&node.child_nodes())
			.into_iter()
			.filter(|child| match child.dyn_ref::<Text>() {
				// Formatting whitespace between server-rendered elements.
				Some(text) => !text.data().trim().is_empty(),
				None => child.is_instance_of::<Element>(),
			})
			.collect()
	}

	#[instrument(skip_all, fields(tag = patch.tag))]
	fn patch(&self, patch: Patch<'_, Self>) {
		let Patch {
			node,
			props,
			old_props,
			copy_props,
			quiet_props,
			..
		} = patch;
		let Some(element) = node.dyn_ref::<Element>() else {
			error!("Tried to patch a node that isn't an element.");
			return;
		};

		for (name, value) in props.iter() {
			if copy_props.contains(name) || &**name == "is" {
				continue;
			}
			let attribute = value.to_attribute();
			if old_props.is_none() && !quiet_props.contains(name) {
				let existing = element.get_attribute(name);
				if existing.is_some() && existing != attribute && &**name != "innerHTML" {
					warn!(%name, "Hydration mismatch. Overwriting the attribute.");
				}
			}
			if old_props.and_then(|old| old.get(name)) == Some(value) {
				continue;
			}

			let span = trace_span!("Setting prop", %name);
			let _enter = span.enter();
			let result = match (&**name, attribute) {
				("innerHTML", attribute) => {
					element.set_inner_html(attribute.as_deref().unwrap_or_default());
					Ok(())
				}
				(_, Some(attribute)) => element.set_attribute(name, &attribute),
				(_, None) => element.remove_attribute(name),
			};
			if let Err(error) = result {
				error!("Failed to set attribute: {:?}", error);
			}
		}

		for name in old_props.into_iter().flat_map(|old| old.names()) {
			if props.contains(name) || copy_props.contains(name) {
				continue;
			}
			trace!(%name, "Removing prop.");
			if &**name == "innerHTML" {
				element.set_inner_html("");
			} else if let Err(error) = element.remove_attribute(name) {
				error!("Failed to remove attribute: {:?}", error);
			}
		}
	}

	/// Moves nodes only where their position changed, then drops whatever is left over.
	fn arrange(&self, arrange: Arrange<'_, Self>) {
		let Arrange { node: parent, props, children, .. } = arrange;
		if props.contains("innerHTML") {
			return;
		}

		let mut next_sibling = parent.first_child();
		for child in children {
			if next_sibling.as_ref() == Some(child) {
				next_sibling = child.next_sibling();
			} else if let Err(error) = parent.insert_before(child, next_sibling.as_ref()) {
				error!("Failed to insert node: {:?}", error);
			}
		}
		while let Some(extra) = next_sibling {
			next_sibling = extra.next_sibling();
			if let Err(error) = parent.remove_child(&extra) {
				error!("Failed to remove node: {:?}", error);
			}
		}
	}

	fn remove(&self, node: &Node, parent: Option<&Node>, is_nested: bool) {
		if is_nested {
			return;
		}
		let Some(actual) = node.parent_node() else {
			return;
		};
		if parent.map_or(false, |parent| *parent != actual) {
			trace!("Node was moved elsewhere. Not removing it.");
			return;
		}
		if let Err(error) = actual.remove_child(node) {
			error!("Failed to remove node: {:?}", error);
		}
	}

	fn text(&self, value: &str, _scope: &Namespace, old: Option<&Node>) -> Node {
		if let Some(text) = old.and_then(|old| old.dyn_ref::<Text>()) {
			if text.data() != value {
				text.set_data(value);
			}
			return text.clone().into();
		}
		self.document.create_text_node(value).into()
	}

	fn raw(&self, value: &RawValue<Node>, _scope: &Namespace) -> Result<Vec<Node>, Error> {
		match value {
			RawValue::Nodes(nodes) => Ok(nodes.clone()),
			RawValue::Markup(markup) => {
				let template = self
					.document
					.create_element("template")
					.map_err(|error| Error::adapter(format!("Failed to create template: {error:?}")))?
					.dyn_into::<HtmlTemplateElement>()
					.map_err(|_| Error::adapter("`template` is not an `HTMLTemplateElement`"))?;
				template.set_inner_html(markup);
				let content: Node = template.content().into();
				Ok(load_child_nodes(&content.child_nodes()))
			}
		}
	}

	#[instrument(skip_all, fields(ty = listener.ty()))]
	fn add_listener(&self, node: &Node, listener: &NodeListener) {
		let mut bindings = self.bindings.borrow_mut();
		if bindings.iter().any(|binding| binding.node == *node && binding.listener.is(listener)) {
			return;
		}
		let handler = dom_handler(listener.clone());
		if let Err(error) = node.add_event_listener_with_callback_and_bool(listener.ty(), &handler, listener.capture()) {
			error!("Failed to add event listener: {:?}", error);
			return;
		}
		bindings.push(Binding {
			node: node.clone(),
			listener: listener.clone(),
			handler,
		});
	}

	#[instrument(skip_all, fields(ty = listener.ty()))]
	fn remove_listener(&self, node: &Node, listener: &NodeListener) {
		let binding = {
			let mut bindings = self.bindings.borrow_mut();
			let Some(index) = bindings.iter().position(|binding| binding.node == *node && binding.listener.is(listener)) else {
				return;
			};
			bindings.swap_remove(index)
		};
		if let Err(error) = node.remove_event_listener_with_callback_and_bool(listener.ty(), &binding.handler, listener.capture()) {
			error!("Failed to remove event listener: {:?}", error);
		}
	}
}

/// Forwards DOM events to `listener` as [`Event`]s carrying the original as detail.
///
/// Ownership of the closure passes to the JavaScript garbage collector.
fn dom_handler(listener: NodeListener) -> Function {
	let handler = Closure::wrap(Box::new(move |dom_event: web_sys::Event| {
		let span = trace_span!("DOM event", ty = %dom_event.type_());
		let _enter = span.enter();

		let event = Event::new(dom_event.type_())
			.bubbles(dom_event.bubbles())
			.cancelable(dom_event.cancelable())
			.with_detail(dom_event.clone());
		event.set_phase(match dom_event.event_phase() {
			web_sys::Event::CAPTURING_PHASE => EventPhase::Capturing,
			web_sys::Event::AT_TARGET => EventPhase::AtTarget,
			web_sys::Event::BUBBLING_PHASE => EventPhase::Bubbling,
			_ => EventPhase::None,
		});
		listener.call(&event);

		if event.default_prevented() {
			dom_event.prevent_default();
		}
		if event.is_immediate_propagation_stopped() {
			dom_event.stop_immediate_propagation();
		} else if event.is_propagation_stopped() {
			dom_event.stop_propagation();
		}
	}) as Box<dyn Fn(web_sys::Event)>);
	handler.into_js_value().unchecked_into()
}

fn load_child_nodes(child_nodes: &NodeList) -> Vec<Node> {
	(0..child_nodes.length()).filter_map(|i| child_nodes.item(i)).collect()
}
