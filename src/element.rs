use crate::{adapter::Adapter, component::Component, Error};
use core::{
	any::Any,
	fmt::{self, Debug, Display, Formatter},
};
use hashbrown::HashSet;
use std::{collections::BTreeMap, rc::Rc};

/// Identity of an element among its siblings, stable across reorders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Str(Rc<str>),
	Int(i64),
}

impl Display for Key {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Key::Str(key) => Debug::fmt(key, f),
			Key::Int(key) => Display::fmt(key, f),
		}
	}
}

impl From<&str> for Key {
	fn from(key: &str) -> Self {
		Self::Str(key.into())
	}
}
impl From<String> for Key {
	fn from(key: String) -> Self {
		Self::Str(key.into())
	}
}
impl From<i64> for Key {
	fn from(key: i64) -> Self {
		Self::Int(key)
	}
}
impl From<i32> for Key {
	fn from(key: i32) -> Self {
		Self::Int(key.into())
	}
}
impl From<usize> for Key {
	fn from(key: usize) -> Self {
		#[allow(clippy::cast_possible_wrap)]
		Self::Int(key as i64)
	}
}

#[derive(Clone)]
pub enum PropValue {
	Str(Rc<str>),
	Number(f64),
	Bool(bool),
	/// Opaque data only an adapter (or a component) knows how to use.
	Any(Rc<dyn Any>),
}

impl PropValue {
	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			PropValue::Str(value) => Some(value),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_number(&self) -> Option<f64> {
		match *self {
			PropValue::Number(value) => Some(value),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match *self {
			PropValue::Bool(value) => Some(value),
			_ => None,
		}
	}

	#[must_use]
	pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
		match self {
			PropValue::Any(value) => value.downcast_ref(),
			_ => None,
		}
	}

	/// The attribute text for this value, or [`None`] if it shouldn't be an attribute at all.
	#[must_use]
	pub fn to_attribute(&self) -> Option<String> {
		match self {
			PropValue::Str(value) => Some(value.to_string()),
			PropValue::Number(value) => Some(format_number(*value)),
			PropValue::Bool(true) => Some(String::new()),
			PropValue::Bool(false) | PropValue::Any(_) => None,
		}
	}
}

impl PartialEq for PropValue {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(PropValue::Str(a), PropValue::Str(b)) => a == b,
			#[allow(clippy::float_cmp)]
			(PropValue::Number(a), PropValue::Number(b)) => a == b,
			(PropValue::Bool(a), PropValue::Bool(b)) => a == b,
			(PropValue::Any(a), PropValue::Any(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl Debug for PropValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			PropValue::Str(value) => Debug::fmt(value, f),
			PropValue::Number(value) => Debug::fmt(value, f),
			PropValue::Bool(value) => Debug::fmt(value, f),
			PropValue::Any(_) => f.write_str("Any(..)"),
		}
	}
}

impl From<&str> for PropValue {
	fn from(value: &str) -> Self {
		Self::Str(value.into())
	}
}
impl From<String> for PropValue {
	fn from(value: String) -> Self {
		Self::Str(value.into())
	}
}
impl From<Rc<str>> for PropValue {
	fn from(value: Rc<str>) -> Self {
		Self::Str(value)
	}
}
impl From<f64> for PropValue {
	fn from(value: f64) -> Self {
		Self::Number(value)
	}
}
impl From<i32> for PropValue {
	fn from(value: i32) -> Self {
		Self::Number(value.into())
	}
}
impl From<u32> for PropValue {
	fn from(value: u32) -> Self {
		Self::Number(value.into())
	}
}
impl From<bool> for PropValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

/// An element's props, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props(BTreeMap<Rc<str>, PropValue>);

impl Props {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
		self.insert(name, value);
		self
	}

	pub fn insert(&mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Option<PropValue> {
		self.0.insert(name.into(), value.into())
	}

	pub fn remove(&mut self, name: &str) -> Option<PropValue> {
		self.0.remove(name)
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&PropValue> {
		self.0.get(name)
	}

	#[must_use]
	pub fn get_str(&self, name: &str) -> Option<&str> {
		self.get(name).and_then(PropValue::as_str)
	}

	#[must_use]
	pub fn get_number(&self, name: &str) -> Option<f64> {
		self.get(name).and_then(PropValue::as_number)
	}

	#[must_use]
	pub fn contains(&self, name: &str) -> bool {
		self.0.contains_key(name)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &PropValue)> {
		self.0.iter()
	}

	pub fn names(&self) -> impl Iterator<Item = &Rc<str>> {
		self.0.keys()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<K: Into<Rc<str>>, V: Into<PropValue>> FromIterator<(K, V)> for Props {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}

/// Selects prop names for the `copy` and `hydrate` meta-props.
///
/// The string form is a list of names separated by commas and/or whitespace.
/// Either every name is negated with `!` ("everything except these") or none is ("only these").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropSelector {
	All,
	Nothing,
	Only(HashSet<Rc<str>>),
	Except(HashSet<Rc<str>>),
}

impl PropSelector {
	/// # Errors
	///
	/// Iff negated and plain names are mixed.
	pub fn parse(selector: &str) -> Result<Self, Error> {
		let mut plain = HashSet::new();
		let mut negated = HashSet::new();
		for name in selector.split(|c: char| c == ',' || c.is_whitespace()).filter(|name| !name.is_empty()) {
			match name.strip_prefix('!') {
				Some(name) if !name.is_empty() => negated.insert(Rc::from(name)),
				Some(_) => return Err(Error::msg(format!("Invalid prop selector {selector:?}: `!` without a name"))),
				None => plain.insert(Rc::from(name)),
			};
		}
		match (plain.is_empty(), negated.is_empty()) {
			(true, true) => Ok(Self::Nothing),
			(false, true) => Ok(Self::Only(plain)),
			(true, false) => Ok(Self::Except(negated)),
			(false, false) => Err(Error::msg(format!("Invalid prop selector {selector:?}: cannot mix negated and plain prop names"))),
		}
	}

	#[must_use]
	pub fn includes(&self, name: &str) -> bool {
		match self {
			PropSelector::All => true,
			PropSelector::Nothing => false,
			PropSelector::Only(names) => names.contains(name),
			PropSelector::Except(names) => !names.contains(name),
		}
	}

	/// The names of `props` this selector includes.
	#[must_use]
	pub fn select(&self, props: &Props) -> HashSet<Rc<str>> {
		props.names().filter(|name| self.includes(name)).cloned().collect()
	}
}

impl From<bool> for PropSelector {
	fn from(all: bool) -> Self {
		if all {
			Self::All
		} else {
			Self::Nothing
		}
	}
}

/// Content of a [`Tag::Raw`] element.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue<N> {
	/// Markup the adapter parses or passes through verbatim.
	Markup(Rc<str>),
	/// Nodes built outside of the renderer.
	Nodes(Vec<N>),
}

/// What a rendered position looks like from the outside.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<N> {
	Empty,
	Node(N),
	Nodes(Vec<N>),
}

impl<N> Value<N> {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		matches!(self, Value::Empty)
	}

	#[must_use]
	pub fn node(&self) -> Option<&N> {
		match self {
			Value::Node(node) => Some(node),
			Value::Nodes(nodes) => nodes.first(),
			Value::Empty => None,
		}
	}

	#[must_use]
	pub fn into_nodes(self) -> Vec<N> {
		match self {
			Value::Empty => Vec::new(),
			Value::Node(node) => vec![node],
			Value::Nodes(nodes) => nodes,
		}
	}
}

impl<N> From<Vec<N>> for Value<N> {
	fn from(mut nodes: Vec<N>) -> Self {
		match nodes.len() {
			0 => Value::Empty,
			1 => Value::Node(nodes.remove(0)),
			_ => Value::Nodes(nodes),
		}
	}
}

impl<N> Default for Value<N> {
	fn default() -> Self {
		Value::Empty
	}
}

pub enum Tag<A: Adapter> {
	Intrinsic(Rc<str>),
	/// Transparent grouping. `""` converts to this.
	Fragment,
	/// Renders its children into another root.
	Portal,
	/// Keeps whatever was rendered at this position before.
	Copy,
	Text,
	Raw,
	Component(Component<A>),
}

impl<A: Adapter> Tag<A> {
	#[must_use]
	pub fn name(&self) -> &str {
		match self {
			Tag::Intrinsic(name) => name,
			Tag::Fragment => "Fragment",
			Tag::Portal => "Portal",
			Tag::Copy => "Copy",
			Tag::Text => "Text",
			Tag::Raw => "Raw",
			Tag::Component(component) => component.name(),
		}
	}
}

impl<A: Adapter> Clone for Tag<A> {
	fn clone(&self) -> Self {
		match self {
			Tag::Intrinsic(name) => Tag::Intrinsic(name.clone()),
			Tag::Fragment => Tag::Fragment,
			Tag::Portal => Tag::Portal,
			Tag::Copy => Tag::Copy,
			Tag::Text => Tag::Text,
			Tag::Raw => Tag::Raw,
			Tag::Component(component) => Tag::Component(component.clone()),
		}
	}
}

impl<A: Adapter> PartialEq for Tag<A> {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Tag::Intrinsic(a), Tag::Intrinsic(b)) => a == b,
			(Tag::Component(a), Tag::Component(b)) => a == b,
			(Tag::Fragment, Tag::Fragment) | (Tag::Portal, Tag::Portal) | (Tag::Copy, Tag::Copy) | (Tag::Text, Tag::Text) | (Tag::Raw, Tag::Raw) => true,
			_ => false,
		}
	}
}

impl<A: Adapter> Debug for Tag<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Tag::Intrinsic(name) => write!(f, "<{name}>"),
			Tag::Component(component) => write!(f, "<{}/>", component.name()),
			other => f.write_str(other.name()),
		}
	}
}

impl<A: Adapter> From<&str> for Tag<A> {
	fn from(name: &str) -> Self {
		if name.is_empty() {
			Tag::Fragment
		} else {
			Tag::Intrinsic(name.into())
		}
	}
}

impl<A: Adapter> From<Component<A>> for Tag<A> {
	fn from(component: Component<A>) -> Self {
		Tag::Component(component)
	}
}

impl<A: Adapter> From<&Component<A>> for Tag<A> {
	fn from(component: &Component<A>) -> Self {
		Tag::Component(component.clone())
	}
}

/// Called with an element's value after its first commit.
pub type NodeRef<A> = Rc<dyn Fn(&Value<<A as Adapter>::Node>)>;

/// An immutable description of a node.
///
/// Cloning is cheap and keeps identity: an element rendered again as the *same* object is skipped like [`Tag::Copy`].
pub struct Element<A: Adapter>(Rc<ElementData<A>>);

pub(crate) struct ElementData<A: Adapter> {
	tag: Tag<A>,
	props: Props,
	key: Option<Key>,
	children: Child<A>,
	node_ref: Option<NodeRef<A>>,
	copy: Option<PropSelector>,
	hydrate: Option<PropSelector>,
	root: Option<A::Node>,
	raw: Option<RawValue<A::Node>>,
	text: Option<Rc<str>>,
}

impl<A: Adapter> Clone for ElementData<A> {
	fn clone(&self) -> Self {
		Self {
			tag: self.tag.clone(),
			props: self.props.clone(),
			key: self.key.clone(),
			children: self.children.clone(),
			node_ref: self.node_ref.clone(),
			copy: self.copy.clone(),
			hydrate: self.hydrate.clone(),
			root: self.root.clone(),
			raw: self.raw.clone(),
			text: self.text.clone(),
		}
	}
}

impl<A: Adapter> ElementData<A> {
	fn new(tag: Tag<A>) -> Self {
		Self {
			tag,
			props: Props::new(),
			key: None,
			children: Child::Null,
			node_ref: None,
			copy: None,
			hydrate: None,
			root: None,
			raw: None,
			text: None,
		}
	}
}

impl<A: Adapter> Clone for Element<A> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<A: Adapter> Debug for Element<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Element");
		debug.field("tag", &self.0.tag);
		if let Some(key) = &self.0.key {
			debug.field("key", key);
		}
		if cfg!(feature = "dangerous-logging") {
			debug.field("props", &self.0.props);
			if let Some(text) = &self.0.text {
				debug.field("text", text);
			}
		}
		debug.finish_non_exhaustive()
	}
}

impl<A: Adapter> Element<A> {
	pub fn build(tag: impl Into<Tag<A>>) -> ElementBuilder<A> {
		ElementBuilder(ElementData::new(tag.into()))
	}

	pub fn text(text: impl Into<Rc<str>>) -> Self {
		let mut data = ElementData::new(Tag::Text);
		data.text = Some(text.into());
		Self(Rc::new(data))
	}

	#[must_use]
	pub fn raw(value: RawValue<A::Node>) -> Self {
		let mut data = ElementData::new(Tag::Raw);
		data.raw = Some(value);
		Self(Rc::new(data))
	}

	pub fn portal(root: A::Node, children: impl Into<Child<A>>) -> Self {
		let mut data = ElementData::new(Tag::Portal);
		data.root = Some(root);
		data.children = children.into();
		Self(Rc::new(data))
	}

	pub fn fragment(children: impl Into<Child<A>>) -> Self {
		let mut data = ElementData::new(Tag::Fragment);
		data.children = children.into();
		Self(Rc::new(data))
	}

	#[must_use]
	pub fn copy() -> Self {
		Self(Rc::new(ElementData::new(Tag::Copy)))
	}

	#[must_use]
	pub fn tag(&self) -> &Tag<A> {
		&self.0.tag
	}

	#[must_use]
	pub fn props(&self) -> &Props {
		&self.0.props
	}

	#[must_use]
	pub fn key(&self) -> Option<&Key> {
		self.0.key.as_ref()
	}

	#[must_use]
	pub fn children(&self) -> &Child<A> {
		&self.0.children
	}

	#[must_use]
	pub fn node_ref(&self) -> Option<&NodeRef<A>> {
		self.0.node_ref.as_ref()
	}

	#[must_use]
	pub fn copy_selector(&self) -> Option<&PropSelector> {
		self.0.copy.as_ref()
	}

	#[must_use]
	pub fn hydrate_selector(&self) -> Option<&PropSelector> {
		self.0.hydrate.as_ref()
	}

	#[must_use]
	pub fn portal_root(&self) -> Option<&A::Node> {
		self.0.root.as_ref()
	}

	#[must_use]
	pub fn raw_value(&self) -> Option<&RawValue<A::Node>> {
		self.0.raw.as_ref()
	}

	#[must_use]
	pub fn text_value(&self) -> Option<&str> {
		self.0.text.as_deref()
	}

	/// Whether both handles point to the very same element.
	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}

	#[must_use]
	pub(crate) fn without_key(&self) -> Self {
		let mut data = (*self.0).clone();
		data.key = None;
		Self(Rc::new(data))
	}

	#[must_use]
	pub(crate) fn with_props(&self, props: Props) -> Self {
		let mut data = (*self.0).clone();
		data.props = props;
		Self(Rc::new(data))
	}
}

pub struct ElementBuilder<A: Adapter>(ElementData<A>);

impl<A: Adapter> ElementBuilder<A> {
	#[must_use]
	pub fn prop(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
		self.0.props.insert(name, value);
		self
	}

	#[must_use]
	pub fn props(mut self, props: Props) -> Self {
		self.0.props = props;
		self
	}

	#[must_use]
	pub fn key(mut self, key: impl Into<Key>) -> Self {
		self.0.key = Some(key.into());
		self
	}

	/// Appends a child.
	#[must_use]
	pub fn child(mut self, child: impl Into<Child<A>>) -> Self {
		let child = child.into();
		self.0.children = match core::mem::take(&mut self.0.children) {
			Child::Null => Child::List(vec![child]),
			Child::List(mut children) => {
				children.push(child);
				Child::List(children)
			}
			previous => Child::List(vec![previous, child]),
		};
		self
	}

	/// Replaces all children.
	#[must_use]
	pub fn children(mut self, children: impl Into<Child<A>>) -> Self {
		self.0.children = children.into();
		self
	}

	#[must_use]
	pub fn node_ref(mut self, node_ref: impl Fn(&Value<A::Node>) + 'static) -> Self {
		self.0.node_ref = Some(Rc::new(node_ref));
		self
	}

	#[must_use]
	pub fn copy(mut self, selector: impl Into<PropSelector>) -> Self {
		self.0.copy = Some(selector.into());
		self
	}

	#[must_use]
	pub fn hydrate(mut self, selector: impl Into<PropSelector>) -> Self {
		self.0.hydrate = Some(selector.into());
		self
	}

	#[must_use]
	pub fn build(self) -> Element<A> {
		Element(Rc::new(self.0))
	}
}

/// Anything that can appear where children are expected.
pub enum Child<A: Adapter> {
	Element(Element<A>),
	Text(Rc<str>),
	Number(f64),
	Bool(bool),
	Null,
	List(Vec<Child<A>>),
}

impl<A: Adapter> Child<A> {
	/// Collapses this child into what occupies a single retained slot.
	///
	/// Numbers become text, booleans and null leave the slot empty and nested lists become fragments.
	pub(crate) fn narrow(self) -> Option<Element<A>> {
		match self {
			Child::Element(element) => Some(element),
			Child::Text(text) => Some(Element::text(text)),
			Child::Number(number) => Some(Element::text(format_number(number))),
			Child::Bool(_) | Child::Null => None,
			Child::List(children) => Some(Element::fragment(Child::List(children))),
		}
	}

	/// The top-level slots of a children value. Only the outermost list is spread.
	pub(crate) fn into_slots(self) -> Vec<Option<Element<A>>> {
		match self {
			Child::List(children) => children.into_iter().map(Child::narrow).collect(),
			child => vec![child.narrow()],
		}
	}
}

impl<A: Adapter> Clone for Child<A> {
	fn clone(&self) -> Self {
		match self {
			Child::Element(element) => Child::Element(element.clone()),
			Child::Text(text) => Child::Text(text.clone()),
			Child::Number(number) => Child::Number(*number),
			Child::Bool(value) => Child::Bool(*value),
			Child::Null => Child::Null,
			Child::List(children) => Child::List(children.clone()),
		}
	}
}

impl<A: Adapter> Debug for Child<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Child::Element(element) => Debug::fmt(element, f),
			Child::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Child::Number(number) => f.debug_tuple("Number").field(number).finish(),
			Child::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
			Child::Null => f.write_str("Null"),
			Child::List(children) => f.debug_list().entries(children).finish(),
		}
	}
}

impl<A: Adapter> Default for Child<A> {
	fn default() -> Self {
		Child::Null
	}
}

impl<A: Adapter> From<Element<A>> for Child<A> {
	fn from(element: Element<A>) -> Self {
		Child::Element(element)
	}
}
impl<A: Adapter> From<ElementBuilder<A>> for Child<A> {
	fn from(builder: ElementBuilder<A>) -> Self {
		Child::Element(builder.build())
	}
}
impl<A: Adapter> From<&str> for Child<A> {
	fn from(text: &str) -> Self {
		Child::Text(text.into())
	}
}
impl<A: Adapter> From<String> for Child<A> {
	fn from(text: String) -> Self {
		Child::Text(text.into())
	}
}
impl<A: Adapter> From<Rc<str>> for Child<A> {
	fn from(text: Rc<str>) -> Self {
		Child::Text(text)
	}
}
impl<A: Adapter> From<f64> for Child<A> {
	fn from(number: f64) -> Self {
		Child::Number(number)
	}
}
impl<A: Adapter> From<i32> for Child<A> {
	fn from(number: i32) -> Self {
		Child::Number(number.into())
	}
}
impl<A: Adapter> From<u32> for Child<A> {
	fn from(number: u32) -> Self {
		Child::Number(number.into())
	}
}
impl<A: Adapter> From<usize> for Child<A> {
	fn from(number: usize) -> Self {
		#[allow(clippy::cast_precision_loss)]
		Child::Number(number as f64)
	}
}
impl<A: Adapter> From<bool> for Child<A> {
	fn from(value: bool) -> Self {
		Child::Bool(value)
	}
}
impl<A: Adapter> From<()> for Child<A> {
	fn from((): ()) -> Self {
		Child::Null
	}
}
impl<A: Adapter, T: Into<Child<A>>> From<Option<T>> for Child<A> {
	fn from(child: Option<T>) -> Self {
		child.map_or(Child::Null, Into::into)
	}
}
impl<A: Adapter, T: Into<Child<A>>> From<Vec<T>> for Child<A> {
	fn from(children: Vec<T>) -> Self {
		Child::List(children.into_iter().map(Into::into).collect())
	}
}
impl<A: Adapter> FromIterator<Child<A>> for Child<A> {
	fn from_iter<T: IntoIterator<Item = Child<A>>>(iter: T) -> Self {
		Child::List(iter.into_iter().collect())
	}
}

/// Formats numbers the way they read in markup: integral values without a fraction.
pub(crate) fn format_number(number: f64) -> String {
	if number.is_nan() {
		"NaN".to_owned()
	} else if number.is_infinite() {
		if number > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
	} else if number.fract() == 0.0 && number.abs() < 1e15 {
		#[allow(clippy::cast_possible_truncation)]
		let integer = number as i64;
		integer.to_string()
	} else {
		number.to_string()
	}
}
