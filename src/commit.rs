//! Applying diffed retainers to the output, and tearing them down again.
//!
//! Hosts commit bottom-up: children first, then the host is patched and its children arranged.
//! Components commit themselves once their own children settle, so they are only *read* here.

use crate::{
	adapter::{Adapter, Arrange, Patch},
	component::Body,
	context::{Cleanup, Context},
	element::Tag,
	renderer::RendererInner,
	retainer::{self, splice_lingerers, Flags, Lingerer, RetainerRef},
};
use core::mem;
use futures::{future, FutureExt};
use hashbrown::HashSet;
use std::rc::Rc;
use tracing::{error, instrument, trace};

/// Commits the children of `parent`, then unmounts whatever its last diff discarded.
///
/// Returns the nodes `parent`'s children contribute to `host`.
pub(crate) fn commit_children<A: Adapter>(renderer: &Rc<RendererInner<A>>, parent: &RetainerRef<A>, host: &RetainerRef<A>) -> Vec<A::Node> {
	let children = parent.borrow().children.clone();
	let mut values = Vec::new();
	for child in children.iter().flatten() {
		values.extend(commit(renderer, child, host));
	}

	let graveyard = mem::take(&mut parent.borrow_mut().graveyard);
	for removed in graveyard {
		unmount(renderer, host, &removed, false);
	}
	values
}

fn commit<A: Adapter>(renderer: &Rc<RendererInner<A>>, ret: &RetainerRef<A>, host: &RetainerRef<A>) -> Vec<A::Node> {
	let (flags, tag) = {
		let ret = ret.borrow();
		(ret.flags, ret.element.tag().clone())
	};
	if flags.contains(Flags::DID_COMMIT) && !flags.contains(Flags::DID_DIFF) {
		return retainer::value(ret);
	}

	let values = match tag {
		Tag::Component(_) => return retainer::value(ret),
		Tag::Fragment | Tag::Copy => commit_children(renderer, ret, host),
		Tag::Portal => {
			commit_portal(renderer, ret);
			Vec::new()
		}
		Tag::Text => commit_text(renderer, ret),
		Tag::Raw => commit_raw(renderer, ret),
		Tag::Intrinsic(_) => commit_host(renderer, ret),
	};
	finish_commit(renderer, ret, host, &values);
	values
}

/// Marks `ret` committed and retires what it replaced.
pub(crate) fn finish_commit<A: Adapter>(renderer: &Rc<RendererInner<A>>, ret: &RetainerRef<A>, host: &RetainerRef<A>, values: &[A::Node]) {
	let (first, node_ref, root) = {
		let mut ret = ret.borrow_mut();
		let first = !ret.is_committed();
		ret.flags.insert(Flags::DID_COMMIT);
		ret.flags.remove(Flags::DID_DIFF | Flags::IS_HYDRATED);
		(first, ret.element.node_ref().cloned(), ret.root.clone())
	};
	retire_fallback(renderer, ret, host);

	if first {
		if let Some(node_ref) = node_ref {
			let nodes = match root {
				Some(root) => vec![root],
				None => values.to_vec(),
			};
			node_ref(&renderer.adapter.read(nodes));
		}
	}
}

/// Unmounts everything `ret` replaced.
pub(crate) fn retire_fallback<A: Adapter>(renderer: &Rc<RendererInner<A>>, ret: &RetainerRef<A>, host: &RetainerRef<A>) {
	let fallback = ret.borrow_mut().fallback.take();
	if let Some(fallback) = fallback {
		trace!("Retiring fallback.");
		unmount(renderer, host, &fallback, false);
	}
}

fn commit_text<A: Adapter>(renderer: &Rc<RendererInner<A>>, ret: &RetainerRef<A>) -> Vec<A::Node> {
	let (text, scope, old) = {
		let ret = ret.borrow();
		(ret.element.text_value().unwrap_or_default().to_owned(), ret.scope.clone(), ret.nodes.first().cloned())
	};
	let node = renderer.adapter.text(&text, &scope, old.as_ref());
	ret.borrow_mut().nodes = vec![node.clone()];
	vec![node]
}

fn commit_raw<A: Adapter>(renderer: &Rc<RendererInner<A>>, ret: &RetainerRef<A>) -> Vec<A::Node> {
	let (value, scope, unchanged) = {
		let ret = ret.borrow();
		let value = ret.element.raw_value().cloned();
		let unchanged = ret.is_committed() && ret.raw == value;
		(value, ret.scope.clone(), unchanged)
	};
	if unchanged {
		return ret.borrow().nodes.clone();
	}

	let nodes = match &value {
		Some(value) => renderer.adapter.raw(value, &scope).unwrap_or_else(|error| {
			error!(%error, "Failed to render raw value.");
			Vec::new()
		}),
		None => Vec::new(),
	};
	let mut ret = ret.borrow_mut();
	ret.raw = value;
	ret.nodes = nodes.clone();
	nodes
}

#[instrument(skip_all, fields(tag = %ret.borrow().element.tag().name()))]
fn commit_host<A: Adapter>(renderer: &Rc<RendererInner<A>>, ret: &RetainerRef<A>) -> Vec<A::Node> {
	let adapter = &renderer.adapter;
	let (element, scope, old_props, existing, hydrated) = {
		let ret = ret.borrow();
		(ret.element.clone(), ret.scope.clone(), ret.old_props.clone(), ret.nodes.first().cloned(), ret.flags.contains(Flags::IS_HYDRATED))
	};
	let Tag::Intrinsic(tag) = element.tag() else {
		return Vec::new();
	};
	let props = element.props();

	let node = match existing {
		Some(node) => node,
		None => match adapter.create(tag, props, &scope) {
			Ok(node) => node,
			Err(error) => {
				error!(%error, "Failed to create node.");
				return Vec::new();
			}
		},
	};
	ret.borrow_mut().nodes = vec![node.clone()];

	let copy_props = match (element.copy_selector(), &old_props) {
		(Some(selector), Some(_)) => selector.select(props),
		_ => HashSet::new(),
	};
	let quiet_props = match element.hydrate_selector() {
		Some(selector) if hydrated => props.names().filter(|name| !selector.includes(name)).cloned().collect(),
		_ => HashSet::new(),
	};
	adapter.patch(Patch {
		tag,
		node: &node,
		props,
		old_props: old_props.as_ref(),
		scope: &scope,
		copy_props: &copy_props,
		quiet_props: &quiet_props,
	});

	if props.contains("innerHTML") {
		let graveyard = mem::take(&mut ret.borrow_mut().graveyard);
		for removed in graveyard {
			unmount(renderer, ret, &removed, true);
		}
	} else {
		let mut children = commit_children(renderer, ret, ret);
		splice_lingerers(ret, &mut children);
		adapter.arrange(Arrange {
			tag: Some(tag),
			node: &node,
			props,
			old_props: old_props.as_ref(),
			children: &children,
		});
		ret.borrow_mut().arranged = children;
	}

	ret.borrow_mut().old_props = Some(props.clone());
	vec![node]
}

/// Commits a portal's children into its root.
pub(crate) fn commit_portal<A: Adapter>(renderer: &Rc<RendererInner<A>>, ret: &RetainerRef<A>) {
	let (element, old_root, old_props) = {
		let ret = ret.borrow();
		(ret.element.clone(), ret.root.clone(), ret.old_props.clone())
	};
	let Some(root) = element.portal_root() else {
		error!("Portal without a root.");
		return;
	};
	let props = element.props();

	if let Some(old_root) = old_root.filter(|old_root| old_root != root) {
		trace!("Portal root changed. Clearing the old one.");
		renderer.adapter.arrange(Arrange {
			tag: None,
			node: &old_root,
			props,
			old_props: old_props.as_ref(),
			children: &[],
		});
	}

	let mut children = commit_children(renderer, ret, ret);
	splice_lingerers(ret, &mut children);
	renderer.adapter.arrange(Arrange {
		tag: None,
		node: root,
		props,
		old_props: old_props.as_ref(),
		children: &children,
	});

	let mut ret = ret.borrow_mut();
	ret.root = Some(root.clone());
	ret.arranged = children;
	ret.old_props = Some(props.clone());
}

/// Re-arranges `host` from its retained children, after a component below it changed on its own.
pub(crate) fn arrange_host<A: Adapter>(renderer: &Rc<RendererInner<A>>, host: &RetainerRef<A>) {
	let (tag, node, props) = {
		let host = host.borrow();
		if host.is_unmounted() || !host.is_committed() || host.element.props().contains("innerHTML") {
			return;
		}
		let tag = match host.element.tag() {
			Tag::Intrinsic(tag) => Some(tag.clone()),
			_ => None,
		};
		let Some(node) = host.host_node() else {
			return;
		};
		(tag, node, host.element.props().clone())
	};

	let mut children = retainer::children_value(&host.borrow().children);
	splice_lingerers(host, &mut children);
	renderer.adapter.arrange(Arrange {
		tag: tag.as_deref(),
		node: &node,
		props: &props,
		old_props: Some(&props),
		children: &children,
	});
	host.borrow_mut().arranged = children;
}

/// Tears down `ret` and everything below it.
///
/// `is_nested` is set when an ancestor host node is removed as well, which makes removing nodes individually unnecessary.
#[instrument(skip_all, fields(tag = %ret.borrow().element.tag().name(), is_nested))]
pub(crate) fn unmount<A: Adapter>(renderer: &Rc<RendererInner<A>>, host: &RetainerRef<A>, ret: &RetainerRef<A>, is_nested: bool) {
	let (tag, fallback, graveyard) = {
		let mut ret = ret.borrow_mut();
		if ret.is_unmounted() {
			return;
		}
		(ret.element.tag().clone(), ret.fallback.take(), mem::take(&mut ret.graveyard))
	};
	if let Some(fallback) = fallback {
		unmount(renderer, host, &fallback, is_nested);
	}

	match tag {
		Tag::Component(_) => {
			unmount_component(renderer, host, ret, is_nested);
			for removed in graveyard {
				unmount(renderer, host, &removed, is_nested);
			}
			return;
		}
		Tag::Intrinsic(_) => {
			if !is_nested {
				let node = ret.borrow().nodes.first().cloned();
				if let Some(node) = node {
					renderer.adapter.remove(&node, host.borrow().host_node().as_ref(), false);
				}
			}
			unmount_children(renderer, ret, ret, true);
			for removed in graveyard {
				unmount(renderer, ret, &removed, true);
			}
		}
		Tag::Text | Tag::Raw => {
			if !is_nested {
				let nodes = ret.borrow().nodes.clone();
				let parent = host.borrow().host_node();
				for node in nodes {
					renderer.adapter.remove(&node, parent.as_ref(), false);
				}
			}
		}
		Tag::Fragment | Tag::Copy => {
			unmount_children(renderer, host, ret, is_nested);
			for removed in graveyard {
				unmount(renderer, host, &removed, is_nested);
			}
		}
		Tag::Portal => {
			unmount_children(renderer, ret, ret, true);
			for removed in graveyard {
				unmount(renderer, ret, &removed, true);
			}
			let (root, props) = {
				let ret = ret.borrow();
				(ret.root.clone(), ret.element.props().clone())
			};
			if let Some(root) = root {
				renderer.adapter.arrange(Arrange {
					tag: None,
					node: &root,
					props: &props,
					old_props: Some(&props),
					children: &[],
				});
			}
		}
	}
	ret.borrow_mut().flags.insert(Flags::IS_UNMOUNTED);
}

fn unmount_children<A: Adapter>(renderer: &Rc<RendererInner<A>>, host: &RetainerRef<A>, ret: &RetainerRef<A>, is_nested: bool) {
	let children = mem::take(&mut ret.borrow_mut().children);
	for child in children.iter().flatten() {
		unmount(renderer, host, child, is_nested);
	}
}

#[instrument(skip_all, fields(component = %ret.borrow().element.tag().name()))]
fn unmount_component<A: Adapter>(renderer: &Rc<RendererInner<A>>, host: &RetainerRef<A>, ret: &RetainerRef<A>, is_nested: bool) {
	let ctx = ret.borrow().ctx.clone();
	ret.borrow_mut().flags.insert(Flags::IS_UNMOUNTED);
	let Some(ctx) = ctx else {
		unmount_children(renderer, host, ret, is_nested);
		return;
	};

	let nodes = retainer::value(ret);
	let value = renderer.adapter.read(nodes.clone());
	ctx.insert(Flags::IS_UNMOUNTED);
	ctx.clear_listeners(&renderer.adapter);
	finish_body(renderer, &ctx);

	let pending: Vec<_> = mem::take(&mut *ctx.0.cleanups.borrow_mut())
		.into_iter()
		.filter_map(|cleanup| match cleanup {
			Cleanup::Sync(callback) => {
				callback(&value);
				None
			}
			Cleanup::Async(callback) => Some(callback(&value)),
		})
		.collect();

	if pending.is_empty() {
		unmount_children(renderer, host, ret, is_nested);
	} else if is_nested || nodes.is_empty() {
		renderer.spawn(future::join_all(pending).map(drop));
		unmount_children(renderer, host, ret, is_nested);
	} else {
		let index = {
			let host = host.borrow();
			host.arranged.iter().position(|node| *node == nodes[0]).unwrap_or(host.arranged.len())
		};
		trace!(index, "Lingering until async cleanups finish.");
		host.borrow_mut().lingerers.push(Lingerer { index, retainer: ret.clone() });

		let weak_renderer = Rc::downgrade(renderer);
		let (host, ret) = (host.clone(), ret.clone());
		renderer.spawn(async move {
			future::join_all(pending).await;
			host.borrow_mut().lingerers.retain(|lingerer| !Rc::ptr_eq(&lingerer.retainer, &ret));
			if let Some(renderer) = weak_renderer.upgrade() {
				unmount_children(&renderer, &host, &ret, false);
				arrange_host(&renderer, &host);
			}
		});
	}
}

/// Stops a component's generator, if it has one.
fn finish_body<A: Adapter>(renderer: &Rc<RendererInner<A>>, ctx: &Context<A>) {
	if let Some(waiter) = ctx.0.props_waiter.borrow_mut().take() {
		let _ = waiter.send(());
	}
	// A pull loop observes the unmount and finishes the generator itself.
	if ctx.has(Flags::IS_PULLING) || ctx.has(Flags::IS_EXECUTING) {
		return;
	}
	let body = ctx.0.body.borrow_mut().take();
	match body {
		Some(Body::Generator(mut generator)) => generator.finish(ctx),
		Some(Body::AsyncGenerator(mut generator)) => {
			let inflight = ctx.0.inflight.borrow().as_ref().map(|slot| slot.block.clone());
			let ctx = ctx.clone();
			renderer.spawn(async move {
				if let Some(inflight) = inflight {
					inflight.await;
				}
				generator.finish(&ctx).await;
			});
		}
		None => (),
	}
	for waiter in mem::take(&mut *ctx.0.pull_waiters.borrow_mut()) {
		let _ = waiter.send(Ok(()));
	}
}
