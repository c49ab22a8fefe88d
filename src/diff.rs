//! Reconciliation of new children against retained ones.

use crate::{
	adapter::Adapter,
	component::update_component,
	context::Context,
	element::{Child, Element, Key, PropSelector, Props, Tag},
	renderer::RendererInner,
	retainer::{Flags, Retainer, RetainerRef, Settled},
	Error,
};
use core::mem;
use futures::{
	channel::oneshot,
	future::{self, Either},
	FutureExt, TryFutureExt,
};
use hashbrown::{HashMap, HashSet};
use std::{collections::VecDeque, rc::Rc};
use tracing::{error, instrument, trace, trace_span, warn};

/// Existing output nodes waiting to be claimed by a hydrating render, in document order.
pub(crate) struct Hydration<A: Adapter> {
	nodes: VecDeque<A::Node>,
	abandoned: bool,
}

impl<A: Adapter> Hydration<A> {
	pub fn new(nodes: Vec<A::Node>) -> Self {
		Self {
			nodes: nodes.into(),
			abandoned: false,
		}
	}

	pub fn next(&mut self) -> Option<A::Node> {
		if self.abandoned {
			None
		} else {
			self.nodes.pop_front()
		}
	}

	/// Stops claiming nodes. The rest of this host's children are created instead.
	pub fn abandon(&mut self) {
		self.abandoned = true;
	}
}

/// Brings `parent`'s retained children in line with `children`.
///
/// Nothing is committed here. Replaced and removed retainers are only queued for unmounting,
/// so that the previous output stays intact until the matching commit.
///
/// Pending work resolves at the earlier of its own completion or the completion of the next diff of the same `parent`.
#[allow(clippy::too_many_lines)]
#[instrument(skip_all)]
pub(crate) fn diff_children<A: Adapter>(
	renderer: &Rc<RendererInner<A>>,
	host: &RetainerRef<A>,
	ctx: Option<&Context<A>>,
	scope: &A::Scope,
	parent: &RetainerRef<A>,
	children: Child<A>,
	mut hydration: Option<&mut Hydration<A>>,
) -> Result<Option<Settled>, Error> {
	let (old, previous_diff) = {
		let mut parent = parent.borrow_mut();
		(mem::take(&mut parent.children), parent.on_next_diff.take())
	};

	let new = children.into_slots();
	let mut retained = Vec::with_capacity(new.len());
	let mut graveyard = Vec::new();
	let mut pending = Vec::new();
	let mut first_error = None;

	let mut seen_keys = HashSet::new();
	let mut by_key: Option<HashMap<Key, RetainerRef<A>>> = None;
	let mut i = 0;

	for child in new {
		let mut child = child;
		let mut ret = old.get(i).cloned().flatten();

		let mut new_key = child.as_ref().and_then(|child| child.key().cloned());
		if let Some(key) = &new_key {
			if seen_keys.contains(key) {
				if cfg!(feature = "dangerous-logging") {
					error!(%key, "Duplicate key. The element is treated as unkeyed.");
				} else {
					error!("Duplicate key. The element is treated as unkeyed.");
				}
				child = child.map(|child| child.without_key());
				new_key = None;
			}
		}
		let mut old_key = ret.as_ref().and_then(|ret| ret.borrow().element.key().cloned());

		if old_key == new_key {
			if let (Some(by_key), Some(key)) = (&mut by_key, &new_key) {
				by_key.remove(key);
			}
			i += 1;
		} else {
			let by_key = by_key.get_or_insert_with(|| children_by_key(&old, i));
			if let Some(key) = &new_key {
				ret = by_key.remove(key);
			} else {
				// Keyed retainers stay reachable through the map.
				while ret.is_some() && old_key.is_some() {
					i += 1;
					ret = old.get(i).cloned().flatten();
					old_key = ret.as_ref().and_then(|ret| ret.borrow().element.key().cloned());
				}
				i += 1;
			}
		}
		if let Some(key) = new_key {
			seen_keys.insert(key);
		}

		let Some(element) = child else {
			graveyard.extend(ret);
			retained.push(None);
			continue;
		};

		if *element.tag() == Tag::Copy {
			retained.push(ret);
			continue;
		}

		let ret = match ret {
			Some(ret) if is_static(&ret, &element) => {
				trace!("Element unchanged. Skipping.");
				retained.push(Some(ret));
				continue;
			}
			Some(ret) if ret.borrow().element.tag() == element.tag() => {
				{
					let mut ret = ret.borrow_mut();
					ret.element = merge_copied_props(&ret.element, element.clone());
				}
				ret
			}
			Some(old) => replace(old, element.clone(), scope),
			None => Retainer::new(element.clone(), scope.clone()),
		};
		ret.borrow_mut().flags.insert(Flags::DID_DIFF);

		let span = trace_span!("Diffing child", tag = element.tag().name());
		let _enter = span.enter();
		let outcome = match element.tag() {
			Tag::Fragment => diff_children(renderer, host, ctx, scope, &ret, element.children().clone(), hydration.as_deref_mut()),
			Tag::Portal => diff_children(renderer, &ret, ctx, &A::Scope::default(), &ret, element.children().clone(), None),
			Tag::Intrinsic(_) => diff_host(renderer, ctx, scope, &ret, hydration.as_deref_mut()),
			Tag::Component(_) => update_component(renderer, &ret, ctx, host, scope, hydration.as_deref_mut()),
			Tag::Text => {
				hydrate_text(&ret, hydration.as_deref_mut());
				Ok(None)
			}
			Tag::Raw | Tag::Copy => Ok(None),
		};
		match outcome {
			Ok(Some(settled)) => pending.push(settled),
			Ok(None) => (),
			Err(error) => {
				first_error.get_or_insert(error);
			}
		}
		retained.push(Some(ret));
	}

	let leftovers = old.into_iter().skip(i).flatten();
	match by_key {
		None => graveyard.extend(leftovers),
		Some(by_key) => {
			graveyard.extend(leftovers.filter(|ret| ret.borrow().element.key().is_none()));
			graveyard.extend(by_key.into_values());
		}
	}

	{
		let mut parent = parent.borrow_mut();
		parent.children = retained;
		parent.graveyard.extend(graveyard);
	}

	let outcome = if let Some(error) = first_error {
		Err(error)
	} else if pending.is_empty() {
		Ok(None)
	} else {
		let own = future::try_join_all(pending).map_ok(drop).boxed_local();
		let (sender, receiver) = oneshot::channel::<Settled>();
		parent.borrow_mut().on_next_diff = Some(sender);
		let next = async move {
			match receiver.await {
				Ok(next) => next.await,
				// Superseded by nothing: only the own outcome counts.
				Err(oneshot::Canceled) => future::pending().await,
			}
		}
		.boxed_local();
		Ok(Some(
			future::select(own, next)
				.map(|either| match either {
					Either::Left((outcome, _)) | Either::Right((outcome, _)) => outcome,
				})
				.boxed_local()
				.shared(),
		))
	};

	if let Some(previous_diff) = previous_diff {
		let settled = match &outcome {
			Ok(Some(settled)) => settled.clone(),
			Ok(None) => future::ready(Ok(())).boxed_local().shared(),
			Err(error) => future::ready(Err(error.clone())).boxed_local().shared(),
		};
		// The previous diff may have settled and dropped its receiver already.
		let _ = previous_diff.send(settled);
	}

	outcome
}

/// Whether `element` can be skipped entirely at `ret`.
fn is_static<A: Adapter>(ret: &RetainerRef<A>, element: &Element<A>) -> bool {
	let ret = ret.borrow();
	ret.is_committed()
		&& (ret.element.ptr_eq(element) || (ret.element.tag() == element.tag() && matches!(element.copy_selector(), Some(PropSelector::All))))
}

fn children_by_key<A: Adapter>(old: &[Option<RetainerRef<A>>], start: usize) -> HashMap<Key, RetainerRef<A>> {
	old.iter()
		.skip(start)
		.flatten()
		.filter_map(|ret| ret.borrow().element.key().cloned().map(|key| (key, ret.clone())))
		.collect()
}

/// Keeps the old values of props selected by `new`'s copy selector.
fn merge_copied_props<A: Adapter>(old: &Element<A>, new: Element<A>) -> Element<A> {
	let Some(selector) = new.copy_selector() else {
		return new;
	};
	let mut props: Props = new.props().clone();
	for (name, value) in old.props().iter() {
		if selector.includes(name) {
			props.insert(name.clone(), value.clone());
		}
	}
	new.with_props(props)
}

/// A retainer for `element` where `old` was, with `old` kept as fallback until it commits.
///
/// A retainer further down the fallback chain with the same tag is brought back instead of creating a new one.
fn replace<A: Adapter>(old: RetainerRef<A>, element: Element<A>, scope: &A::Scope) -> RetainerRef<A> {
	let mut previous = old.clone();
	loop {
		let next = previous.borrow().fallback.clone();
		let Some(candidate) = next else {
			break;
		};
		if candidate.borrow().element.tag() == element.tag() {
			trace!("Resurrecting a retainer from the fallback chain.");
			let rest = candidate.borrow_mut().fallback.take();
			previous.borrow_mut().fallback = rest;
			{
				let mut candidate = candidate.borrow_mut();
				candidate.element = element;
				candidate.fallback = Some(old);
			}
			return candidate;
		}
		previous = candidate;
	}

	let ret = Retainer::new(element, scope.clone());
	ret.borrow_mut().fallback = Some(old);
	ret
}

fn diff_host<A: Adapter>(renderer: &Rc<RendererInner<A>>, ctx: Option<&Context<A>>, scope: &A::Scope, ret: &RetainerRef<A>, hydration: Option<&mut Hydration<A>>) -> Result<Option<Settled>, Error> {
	let (element, fresh) = {
		let ret = ret.borrow();
		(ret.element.clone(), !ret.is_committed() && ret.nodes.is_empty())
	};
	let Tag::Intrinsic(tag) = element.tag() else {
		return Ok(None);
	};
	let child_scope = renderer.adapter.scope(tag, element.props(), scope);

	let mut own_hydration = None;
	if let (true, Some(hydration)) = (fresh, hydration) {
		match (hydration.next(), element.hydrate_selector()) {
			(Some(_), Some(PropSelector::Nothing)) => trace!("Hydration disabled. The existing node is replaced."),
			(Some(node), _) => {
				own_hydration = Some(Hydration::new(renderer.adapter.adopt(&node)));
				let mut ret = ret.borrow_mut();
				ret.nodes = vec![node];
				ret.flags.insert(Flags::IS_HYDRATED);
			}
			(None, _) => warn!(%tag, "No node left to hydrate. Creating one."),
		}
	}
	ret.borrow_mut().scope = scope.clone();

	if element.props().contains("innerHTML") {
		let mut ret = ret.borrow_mut();
		let children: Vec<_> = ret.children.drain(..).flatten().collect();
		ret.graveyard.extend(children);
		return Ok(None);
	}

	diff_children(renderer, ret, ctx, &child_scope, ret, element.children().clone(), own_hydration.as_mut())
}

fn hydrate_text<A: Adapter>(ret: &RetainerRef<A>, hydration: Option<&mut Hydration<A>>) {
	let mut ret = ret.borrow_mut();
	if ret.is_committed() || !ret.nodes.is_empty() {
		return;
	}
	if let Some(node) = hydration.and_then(Hydration::next) {
		ret.nodes = vec![node];
	}
}
