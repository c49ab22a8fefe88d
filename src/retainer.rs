use crate::{
	adapter::Adapter,
	context::Context,
	element::{Element, RawValue, Tag},
	Error,
};
use bitflags::bitflags;
use futures::{
	channel::oneshot,
	future::{LocalBoxFuture, Shared},
};
use std::{cell::RefCell, rc::Rc};

/// Completion of pending rendering work, shareable between everyone waiting on it.
pub(crate) type Settled = Shared<LocalBoxFuture<'static, Result<(), Error>>>;

/// Completion of a component body, regardless of outcome.
pub(crate) type Block = Shared<LocalBoxFuture<'static, ()>>;

bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
	pub(crate) struct Flags: u32 {
		const DID_DIFF = 1 << 0;
		const DID_COMMIT = 1 << 1;
		const IS_UNMOUNTED = 1 << 2;
		/// The host node was adopted and not created.
		const IS_HYDRATED = 1 << 3;

		const IS_UPDATING = 1 << 4;
		const IS_EXECUTING = 1 << 5;
		const IS_REFRESHING = 1 << 6;
		const IS_SYNC_GEN = 1 << 7;
		const IS_ASYNC_GEN = 1 << 8;
		/// Props are pulled through `Context::pull_props`.
		const IS_IN_FOR_OF_LOOP = 1 << 9;
		/// Props are pulled through `Context::next_props`, which keeps the generator running between updates.
		const IS_IN_FOR_AWAIT_OF_LOOP = 1 << 10;
		const IS_PULLING = 1 << 11;
		/// Props were pulled in the current resumption.
		const NEEDS_TO_YIELD = 1 << 12;
		const PROPS_AVAILABLE = 1 << 13;
	}
}

pub(crate) type RetainerRef<A> = Rc<RefCell<Retainer<A>>>;

/// A component that was removed but still shows its nodes until its asynchronous cleanups finish.
pub(crate) struct Lingerer<A: Adapter> {
	/// Position in the host's previous arrangement.
	pub index: usize,
	pub retainer: RetainerRef<A>,
}

/// The persistent record behind one rendered position.
pub(crate) struct Retainer<A: Adapter> {
	pub element: Element<A>,
	pub ctx: Option<Context<A>>,
	pub children: Vec<Option<RetainerRef<A>>>,
	/// What was shown here before, until this retainer commits.
	pub fallback: Option<RetainerRef<A>>,
	/// Host, text and raw: the own nodes. Components: the last committed value.
	pub nodes: Vec<A::Node>,
	pub flags: Flags,
	pub scope: A::Scope,
	pub old_props: Option<crate::element::Props>,
	pub raw: Option<RawValue<A::Node>>,
	/// Portals: the root that was committed last.
	pub root: Option<A::Node>,
	pub graveyard: Vec<RetainerRef<A>>,
	pub lingerers: Vec<Lingerer<A>>,
	/// Hosts and portals: the children as last arranged.
	pub arranged: Vec<A::Node>,
	pub on_next_diff: Option<oneshot::Sender<Settled>>,
}

impl<A: Adapter> Retainer<A> {
	pub fn new(element: Element<A>, scope: A::Scope) -> RetainerRef<A> {
		Rc::new(RefCell::new(Self {
			element,
			ctx: None,
			children: Vec::new(),
			fallback: None,
			nodes: Vec::new(),
			flags: Flags::empty(),
			scope,
			old_props: None,
			raw: None,
			root: None,
			graveyard: Vec::new(),
			lingerers: Vec::new(),
			arranged: Vec::new(),
			on_next_diff: None,
		}))
	}

	pub fn is_committed(&self) -> bool {
		self.flags.contains(Flags::DID_COMMIT)
	}

	pub fn is_unmounted(&self) -> bool {
		self.flags.contains(Flags::IS_UNMOUNTED)
	}

	/// The node children of this host are arranged into.
	pub fn host_node(&self) -> Option<A::Node> {
		match self.element.tag() {
			Tag::Portal => self.root.clone().or_else(|| self.element.portal_root().cloned()),
			Tag::Intrinsic(_) => self.nodes.first().cloned(),
			_ => None,
		}
	}
}

/// The nodes a retained position currently contributes to its host.
pub(crate) fn value<A: Adapter>(ret: &RetainerRef<A>) -> Vec<A::Node> {
	let ret = ret.borrow();
	if !ret.is_committed() {
		if let Some(fallback) = &ret.fallback {
			return value(fallback);
		}
	}
	match ret.element.tag() {
		Tag::Intrinsic(_) | Tag::Text | Tag::Raw => ret.nodes.clone(),
		Tag::Portal => Vec::new(),
		Tag::Component(_) if ret.is_committed() => ret.nodes.clone(),
		Tag::Component(_) | Tag::Fragment | Tag::Copy => children_value(&ret.children),
	}
}

pub(crate) fn children_value<A: Adapter>(children: &[Option<RetainerRef<A>>]) -> Vec<A::Node> {
	children.iter().flatten().flat_map(value).collect()
}

/// Inserts the nodes of lingering components back at their previous positions.
pub(crate) fn splice_lingerers<A: Adapter>(host: &RetainerRef<A>, values: &mut Vec<A::Node>) {
	let host = host.borrow();
	if host.lingerers.is_empty() {
		return;
	}

	let mut lingerers: Vec<_> = host.lingerers.iter().map(|lingerer| (lingerer.index, value(&lingerer.retainer))).collect();
	lingerers.sort_by_key(|(index, _)| *index);
	for (index, nodes) in lingerers {
		let mut at = index.min(values.len());
		for node in nodes {
			if !values.contains(&node) {
				values.insert(at, node);
				at += 1;
			}
		}
	}
}
