use crate::{
	adapter::Adapter,
	component::{enqueue_run, propagate_error, settle, Body, Kind, Slot},
	element::{Child, Props, Value},
	event::{self, Event, ListenerId, ListenerOptions, Listeners, NodeListener},
	renderer::{Rendered, RendererInner},
	retainer::{self, Flags, RetainerRef},
	Error,
};
use core::{
	any::Any,
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	future::Future,
	iter, mem,
};
use futures::{
	channel::oneshot,
	future::{self, LocalBoxFuture},
	FutureExt,
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::{error, instrument, trace};

pub(crate) type Callback<A> = Box<dyn FnOnce(&Value<<A as Adapter>::Node>)>;

pub(crate) enum Cleanup<A: Adapter> {
	Sync(Callback<A>),
	Async(Box<dyn FnOnce(&Value<A::Node>) -> LocalBoxFuture<'static, ()>>),
}

/// A component's handle to its own place in the tree.
///
/// Cloning is cheap. Clones refer to the same component.
pub struct Context<A: Adapter>(pub(crate) Rc<ContextInner<A>>);

pub(crate) struct ContextInner<A: Adapter> {
	pub renderer: Weak<RendererInner<A>>,
	pub retainer: Weak<RefCell<retainer::Retainer<A>>>,
	pub host: Weak<RefCell<retainer::Retainer<A>>>,
	pub parent: Option<Context<A>>,
	pub scope: RefCell<A::Scope>,
	pub flags: Cell<Flags>,
	pub kind: Cell<Option<Kind>>,
	pub body: RefCell<Option<Body<A>>>,
	pub inflight: RefCell<Option<Slot>>,
	pub enqueued: RefCell<Option<Slot>>,
	pub schedules: RefCell<Vec<Callback<A>>>,
	pub afters: RefCell<Vec<Callback<A>>>,
	pub cleanups: RefCell<Vec<Cleanup<A>>>,
	pub provisions: RefCell<HashMap<Rc<str>, Rc<dyn Any>>>,
	pub listeners: Listeners,
	/// The output side of `listeners`, attached to every node in `bound`.
	pub node_listeners: RefCell<Vec<(ListenerId, NodeListener)>>,
	/// The nodes the component rendered to at its last commit.
	pub bound: RefCell<Vec<A::Node>>,
	/// Wakes an async generator waiting for new props.
	pub props_waiter: RefCell<Option<oneshot::Sender<()>>>,
	/// Updates waiting for the next yield of an async generator in pull mode.
	pub pull_waiters: RefCell<Vec<oneshot::Sender<Result<(), Error>>>>,
}

impl<A: Adapter> Clone for Context<A> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<A: Adapter> Debug for Context<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Context")
			.field("flags", &self.0.flags.get())
			.field("kind", &self.0.kind.get())
			.finish_non_exhaustive()
	}
}

impl<A: Adapter> Context<A> {
	pub(crate) fn new(renderer: &Rc<RendererInner<A>>, retainer: &RetainerRef<A>, parent: Option<Context<A>>, host: &RetainerRef<A>, scope: A::Scope) -> Self {
		Self(Rc::new(ContextInner {
			renderer: Rc::downgrade(renderer),
			retainer: Rc::downgrade(retainer),
			host: Rc::downgrade(host),
			parent,
			scope: RefCell::new(scope),
			flags: Cell::new(Flags::empty()),
			kind: Cell::new(None),
			body: RefCell::new(None),
			inflight: RefCell::new(None),
			enqueued: RefCell::new(None),
			schedules: RefCell::default(),
			afters: RefCell::default(),
			cleanups: RefCell::default(),
			provisions: RefCell::default(),
			listeners: Listeners::default(),
			node_listeners: RefCell::default(),
			bound: RefCell::default(),
			props_waiter: RefCell::new(None),
			pull_waiters: RefCell::default(),
		}))
	}

	pub(crate) fn has(&self, flags: Flags) -> bool {
		self.0.flags.get().contains(flags)
	}

	pub(crate) fn insert(&self, flags: Flags) {
		let mut current = self.0.flags.get();
		current.insert(flags);
		self.0.flags.set(current);
	}

	pub(crate) fn remove(&self, flags: Flags) {
		let mut current = self.0.flags.get();
		current.remove(flags);
		self.0.flags.set(current);
	}

	pub(crate) fn renderer(&self) -> Option<Rc<RendererInner<A>>> {
		self.0.renderer.upgrade()
	}

	pub(crate) fn retainer(&self) -> Option<RetainerRef<A>> {
		self.0.retainer.upgrade()
	}

	pub(crate) fn host(&self) -> Option<RetainerRef<A>> {
		self.0.host.upgrade()
	}

	pub(crate) fn parent(&self) -> Option<Context<A>> {
		self.0.parent.clone()
	}

	/// The current props of this component.
	#[must_use]
	pub fn props(&self) -> Props {
		self.retainer().map(|ret| ret.borrow().element.props().clone()).unwrap_or_default()
	}

	/// The children this component's element was created with.
	#[must_use]
	pub fn children(&self) -> Child<A> {
		self.retainer().map(|ret| ret.borrow().element.children().clone()).unwrap_or_default()
	}

	/// The nodes this component currently renders to.
	#[must_use]
	pub fn value(&self) -> Value<A::Node> {
		match (self.renderer(), self.retainer()) {
			(Some(renderer), Some(ret)) => renderer.adapter.read(retainer::value(&ret)),
			_ => Value::Empty,
		}
	}

	#[must_use]
	pub fn is_unmounted(&self) -> bool {
		self.has(Flags::IS_UNMOUNTED) || self.retainer().is_none()
	}

	/// Re-runs this component with its current props.
	///
	/// Refreshing an unmounted or currently executing component logs an error and does nothing.
	/// Errors the component doesn't handle itself are offered to its ancestors.
	#[instrument(skip(self))]
	pub fn refresh(&self) -> Rendered<Result<Value<A::Node>, Error>> {
		if self.is_unmounted() {
			let error = Error::Unmounted;
			error!(%error, "Refresh ignored.");
			return Rendered::Ready(Ok(self.value()));
		}
		if self.has(Flags::IS_EXECUTING) {
			let error = Error::AlreadyExecuting;
			error!(%error, "Refresh ignored.");
			return Rendered::Ready(Ok(self.value()));
		}
		let Some(renderer) = self.renderer() else {
			return Rendered::Ready(Err(Error::Unmounted));
		};

		self.insert(Flags::IS_REFRESHING);
		let outcome = match enqueue_run(self, None) {
			Ok(settled) => settled,
			Err(error) => match propagate_error(self.parent(), error) {
				Ok(settled) => settled,
				Err(error) => {
					error!(%error, "Uncaught error during refresh.");
					return Rendered::Ready(Err(error));
				}
			},
		};

		let Some(settled) = outcome else {
			return Rendered::Ready(Ok(self.value()));
		};
		let ctx = self.clone();
		let future = async move {
			let outcome = match settled.await {
				Ok(()) => Ok(()),
				Err(error) => settle(propagate_error(ctx.parent(), error)).await,
			};
			match outcome {
				Ok(()) => Ok(ctx.value()),
				Err(error) => {
					error!(%error, "Uncaught error during refresh.");
					Err(error)
				}
			}
		}
		.boxed_local()
		.shared();
		renderer.spawn(future.clone().map(drop));
		Rendered::Pending(future)
	}

	/// Runs `callback` with the component's value after its next commit.
	pub fn schedule(&self, callback: impl FnOnce(&Value<A::Node>) + 'static) {
		self.0.schedules.borrow_mut().push(Box::new(callback));
	}

	/// Runs `callback` with the component's value once the whole render it is part of is committed.
	pub fn after(&self, callback: impl FnOnce(&Value<A::Node>) + 'static) {
		self.0.afters.borrow_mut().push(Box::new(callback));
	}

	/// Runs `callback` with the component's last value when it unmounts.
	///
	/// Already unmounted components run `callback` immediately.
	pub fn cleanup(&self, callback: impl FnOnce(&Value<A::Node>) + 'static) {
		if self.is_unmounted() {
			callback(&self.value());
		} else {
			self.0.cleanups.borrow_mut().push(Cleanup::Sync(Box::new(callback)));
		}
	}

	/// Like [`Context::cleanup`], but the component's nodes stay in place until the returned future completes.
	pub fn cleanup_async<F: Future<Output = ()> + 'static>(&self, callback: impl FnOnce(&Value<A::Node>) -> F + 'static) {
		if self.is_unmounted() {
			if let Some(renderer) = self.renderer() {
				renderer.spawn(callback(&self.value()));
			}
		} else {
			self.0
				.cleanups
				.borrow_mut()
				.push(Cleanup::Async(Box::new(move |value| callback(value).boxed_local())));
		}
	}

	/// Makes `value` available to descendants through [`Context::consume`].
	pub fn provide<T: 'static>(&self, key: impl Into<Rc<str>>, value: T) {
		self.0.provisions.borrow_mut().insert(key.into(), Rc::new(value));
	}

	/// The nearest value an *ancestor* provided for `key`.
	///
	/// Returns [`None`] if there is none or it isn't a `T`.
	#[must_use]
	pub fn consume<T: Clone + 'static>(&self, key: &str) -> Option<T> {
		iter::successors(self.parent(), Context::parent)
			.find_map(|ctx| ctx.0.provisions.borrow().get(key).cloned())
			.and_then(|value| value.downcast_ref::<T>().cloned())
	}

	/// Yields the current props once per resumption of a sync generator component.
	///
	/// # Errors
	///
	/// [`Error::DoubleIteration`] iff called again before the generator yields.
	pub fn pull_props(&self) -> Result<Props, Error> {
		if self.has(Flags::IS_ASYNC_GEN) {
			return Err(Error::msg("Use `next_props` in async generator components."));
		}
		if self.has(Flags::NEEDS_TO_YIELD) {
			return Err(Error::DoubleIteration);
		}
		self.insert(Flags::NEEDS_TO_YIELD | Flags::IS_IN_FOR_OF_LOOP);
		self.remove(Flags::PROPS_AVAILABLE);
		Ok(self.props())
	}

	/// Waits for the next props of an async generator component.
	///
	/// Calling this switches the component to pull mode: it keeps running between updates, and each
	/// update resolves once the generator yields next.
	/// Resolves to [`None`] after the component unmounts.
	pub fn next_props(&self) -> LocalBoxFuture<'static, Result<Option<Props>, Error>> {
		if self.has(Flags::IS_SYNC_GEN) {
			return future::ready(Err(Error::msg("Use `pull_props` in sync generator components."))).boxed_local();
		}
		if self.has(Flags::NEEDS_TO_YIELD) {
			return future::ready(Err(Error::DoubleIteration)).boxed_local();
		}
		self.insert(Flags::NEEDS_TO_YIELD | Flags::IS_IN_FOR_AWAIT_OF_LOOP);

		let ctx = self.clone();
		async move {
			loop {
				if ctx.is_unmounted() {
					return Ok(None);
				}
				if ctx.has(Flags::PROPS_AVAILABLE) {
					ctx.remove(Flags::PROPS_AVAILABLE);
					return Ok(Some(ctx.props()));
				}
				let (sender, receiver) = oneshot::channel();
				*ctx.0.props_waiter.borrow_mut() = Some(sender);
				trace!("Waiting for props.");
				// Cancellation only happens on replacement or unmount, both rechecked above.
				let _ = receiver.await;
			}
		}
		.boxed_local()
	}

	/// Listens for events dispatched on this component or its descendants, and for events the adapter raises on the
	/// nodes this component renders to.
	pub fn add_event_listener(&self, ty: impl Into<Rc<str>>, listener: impl Fn(&Event) + 'static, options: ListenerOptions) -> ListenerId {
		let ty = ty.into();
		let id = self.0.listeners.add(ty.clone(), Rc::new(listener), options);

		let weak = Rc::downgrade(&self.0);
		let node_listener = NodeListener::new(ty, options.capture, move |event| {
			let Some(ctx) = weak.upgrade().map(Context) else {
				return;
			};
			if !ctx.0.listeners.fire_one(id, event) {
				ctx.unbind_listener(id);
			}
		});
		if let Some(renderer) = self.renderer() {
			for node in self.0.bound.borrow().iter() {
				renderer.adapter.add_listener(node, &node_listener);
			}
		}
		self.0.node_listeners.borrow_mut().push((id, node_listener));
		id
	}

	/// Returns whether a listener was removed.
	pub fn remove_event_listener(&self, id: ListenerId) -> bool {
		self.unbind_listener(id);
		self.0.listeners.remove(id)
	}

	fn unbind_listener(&self, id: ListenerId) {
		let removed: Vec<_> = {
			let mut node_listeners = self.0.node_listeners.borrow_mut();
			let (removed, kept) = mem::take(&mut *node_listeners).into_iter().partition(|(listener_id, _)| *listener_id == id);
			*node_listeners = kept;
			removed
		};
		let Some(renderer) = self.renderer() else {
			return;
		};
		for (_, listener) in removed {
			for node in self.0.bound.borrow().iter() {
				renderer.adapter.remove_listener(node, &listener);
			}
		}
	}

	/// Moves the output side of this component's listeners to `nodes`.
	pub(crate) fn bind_nodes(&self, adapter: &A, nodes: &[A::Node]) {
		let old = mem::replace(&mut *self.0.bound.borrow_mut(), nodes.to_vec());
		if old == nodes {
			return;
		}
		let node_listeners = self.0.node_listeners.borrow().clone();
		if node_listeners.is_empty() {
			return;
		}
		trace!(listeners = node_listeners.len(), "Rebinding listeners.");
		for node in old.iter().filter(|node| !nodes.contains(node)) {
			for (_, listener) in &node_listeners {
				adapter.remove_listener(node, listener);
			}
		}
		for node in nodes.iter().filter(|node| !old.contains(node)) {
			for (_, listener) in &node_listeners {
				adapter.add_listener(node, listener);
			}
		}
	}

	/// Drops all listeners, detaching them from the output.
	pub(crate) fn clear_listeners(&self, adapter: &A) {
		self.bind_nodes(adapter, &[]);
		self.0.node_listeners.borrow_mut().clear();
		self.0.listeners.clear();
	}

	/// Dispatches `event` on this component, capturing down from and bubbling up to the root.
	///
	/// Returns `false` iff a listener prevented the default.
	pub fn dispatch_event(&self, event: &Event) -> bool {
		let ancestors: Vec<_> = iter::successors(self.parent(), Context::parent).collect();
		let listeners: Vec<_> = ancestors.iter().map(|ctx| &ctx.0.listeners).collect();
		event::dispatch(&self.0.listeners, &listeners, event)
	}
}
