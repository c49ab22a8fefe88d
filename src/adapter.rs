//! The seam between the renderer and whatever it renders into.
//!
//! The renderer never touches output nodes itself. It only calls the [`Adapter`] methods below, in commit order.

use crate::{
	element::{Props, RawValue, Value},
	event::NodeListener,
	Error,
};
use core::fmt::Debug;
use hashbrown::HashSet;
use std::rc::Rc;

/// Markup namespace, used as the [`Adapter::Scope`] of the bundled adapters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Namespace {
	#[default]
	Html,
	Svg,
	MathMl,
}

impl Namespace {
	/// The namespace for children of `tag`, given the namespace `tag` itself lives in.
	#[must_use]
	pub fn for_children(self, tag: &str) -> Self {
		match tag {
			"svg" => Namespace::Svg,
			"math" => Namespace::MathMl,
			"foreignObject" => Namespace::Html,
			_ => self,
		}
	}

	/// The namespace `tag` itself is created in.
	#[must_use]
	pub fn for_element(self, tag: &str) -> Self {
		match tag {
			"svg" => Namespace::Svg,
			"math" => Namespace::MathMl,
			_ => self,
		}
	}

	#[must_use]
	pub fn uri(self) -> Option<&'static str> {
		match self {
			Namespace::Html => None,
			Namespace::Svg => Some("http://www.w3.org/2000/svg"),
			Namespace::MathMl => Some("http://www.w3.org/1998/Math/MathML"),
		}
	}
}

/// Arguments of [`Adapter::patch`].
pub struct Patch<'a, A: Adapter + ?Sized> {
	pub tag: &'a str,
	pub node: &'a A::Node,
	pub props: &'a Props,
	/// [`None`] on the first patch of a node, including hydrated ones.
	pub old_props: Option<&'a Props>,
	pub scope: &'a A::Scope,
	/// Props to leave as they currently are on the node.
	pub copy_props: &'a HashSet<Rc<str>>,
	/// Props whose mismatch against adopted nodes shouldn't be reported.
	pub quiet_props: &'a HashSet<Rc<str>>,
}

/// Arguments of [`Adapter::arrange`].
pub struct Arrange<'a, A: Adapter + ?Sized> {
	/// [`None`] for portal and render roots.
	pub tag: Option<&'a str>,
	pub node: &'a A::Node,
	pub props: &'a Props,
	pub old_props: Option<&'a Props>,
	/// The exact children `node` should have afterwards, in order.
	pub children: &'a [A::Node],
}

pub trait Adapter: 'static {
	type Node: Clone + PartialEq + Debug + 'static;
	type Scope: Clone + Default + Debug + 'static;

	/// The scope children of `tag` are rendered in.
	fn scope(&self, tag: &str, props: &Props, scope: &Self::Scope) -> Self::Scope {
		let _ = (tag, props);
		scope.clone()
	}

	/// # Errors
	///
	/// Iff the output can't represent `tag` in `scope`.
	fn create(&self, tag: &str, props: &Props, scope: &Self::Scope) -> Result<Self::Node, Error>;

	/// The existing children of `node`, in order, for hydration.
	fn adopt(&self, node: &Self::Node) -> Vec<Self::Node> {
		let _ = node;
		Vec::new()
	}

	fn patch(&self, patch: Patch<'_, Self>);

	fn arrange(&self, arrange: Arrange<'_, Self>);

	/// Detaches `node`.
	///
	/// `is_nested` is set when an ancestor of `node` is being removed too, in which case removing it separately is redundant.
	fn remove(&self, node: &Self::Node, parent: Option<&Self::Node>, is_nested: bool);

	/// A text node with `value`, reusing `old` where possible.
	fn text(&self, value: &str, scope: &Self::Scope, old: Option<&Self::Node>) -> Self::Node;

	/// # Errors
	///
	/// Iff `value` can't be turned into nodes.
	fn raw(&self, value: &RawValue<Self::Node>, scope: &Self::Scope) -> Result<Vec<Self::Node>, Error>;

	/// Attaches a component's `listener` to `node`, one of the nodes the component renders to.
	///
	/// Without this, component listeners are only reachable through [`Context::dispatch_event`](`crate::Context::dispatch_event`).
	fn add_listener(&self, node: &Self::Node, listener: &NodeListener) {
		let _ = (node, listener);
	}

	/// Undoes [`Adapter::add_listener`]. Listeners that aren't attached are ignored.
	fn remove_listener(&self, node: &Self::Node, listener: &NodeListener) {
		let _ = (node, listener);
	}

	/// How a component or render root sees a list of nodes.
	fn read(&self, nodes: Vec<Self::Node>) -> Value<Self::Node> {
		nodes.into()
	}

	/// Called on the render root once a render is committed.
	fn finalize(&self, root: &Self::Node) {
		let _ = root;
	}
}
