use crate::{
	adapter::Adapter,
	commit::{commit_portal, finish_commit, unmount},
	context::Callback,
	diff::{diff_children, Hydration},
	element::{Child, Element, Value},
	retainer::{children_value, Flags, Retainer, RetainerRef},
	Error,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	future::{Future, IntoFuture},
	mem,
};
use futures::{
	future::{self, LocalBoxFuture, Shared},
	task::{LocalSpawn, LocalSpawnExt},
	FutureExt,
};
use std::rc::Rc;
use tracing::{error, instrument, trace, warn};

/// The outcome of a render or refresh, available either right away or once pending components settle.
///
/// Pending outcomes are driven by the spawner the [`Renderer`] was created with, whether or not they are awaited.
pub enum Rendered<T> {
	Ready(T),
	Pending(Shared<LocalBoxFuture<'static, T>>),
}

impl<T: Clone> Rendered<T> {
	#[must_use]
	pub fn is_pending(&self) -> bool {
		matches!(self, Rendered::Pending(_))
	}

	/// The outcome, if it's available already.
	#[must_use]
	pub fn now(&self) -> Option<T> {
		match self {
			Rendered::Ready(outcome) => Some(outcome.clone()),
			Rendered::Pending(pending) => pending.peek().cloned(),
		}
	}
}

impl<T: Clone + 'static> IntoFuture for Rendered<T> {
	type Output = T;
	type IntoFuture = LocalBoxFuture<'static, T>;

	fn into_future(self) -> Self::IntoFuture {
		match self {
			Rendered::Ready(outcome) => future::ready(outcome).boxed_local(),
			Rendered::Pending(pending) => pending.boxed_local(),
		}
	}
}

impl<T: Debug> Debug for Rendered<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Rendered::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
			Rendered::Pending(_) => f.write_str("Pending"),
		}
	}
}

/// Renders element trees into roots of an [`Adapter`], keeping one retained tree per root.
///
/// # Correct Use
///
/// Pending work is spawned onto `spawner`, which must be driven for asynchronous components to ever settle.
pub struct Renderer<A: Adapter>(Rc<RendererInner<A>>);

pub(crate) struct RendererInner<A: Adapter> {
	pub adapter: A,
	spawner: Box<dyn LocalSpawn>,
	roots: RefCell<Vec<(A::Node, RetainerRef<A>)>>,
	/// `after` callbacks waiting for the current render to commit.
	pub after: RefCell<Vec<(Callback<A>, Value<A::Node>)>>,
}

impl<A: Adapter + Debug> Debug for Renderer<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Renderer")
			.field("adapter", &self.0.adapter)
			.field("roots", &self.0.roots.borrow().len())
			.finish_non_exhaustive()
	}
}

impl<A: Adapter> Renderer<A> {
	pub fn new(adapter: A, spawner: impl LocalSpawn + 'static) -> Self {
		Self(Rc::new(RendererInner {
			adapter,
			spawner: Box::new(spawner),
			roots: RefCell::default(),
			after: RefCell::default(),
		}))
	}

	#[must_use]
	pub fn adapter(&self) -> &A {
		&self.0.adapter
	}

	/// Renders `children` into `root`, reconciling against what was rendered there before.
	///
	/// Rendering [`Child::Null`] unmounts the root's tree and forgets the root.
	///
	/// # Errors
	///
	/// Errors no component handled surface in the returned outcome.
	#[instrument(skip_all)]
	pub fn render(&self, children: impl Into<Child<A>>, root: &A::Node) -> Rendered<Result<Value<A::Node>, Error>> {
		self.0.render(children.into(), root, None)
	}

	/// Like [`Renderer::render`], but adopts the nodes already present in `root` instead of creating new ones.
	#[instrument(skip_all)]
	pub fn hydrate(&self, children: impl Into<Child<A>>, root: &A::Node) -> Rendered<Result<Value<A::Node>, Error>> {
		let nodes = self.0.adapter.adopt(root);
		trace!(count = nodes.len(), "Hydrating.");
		self.0.render(children.into(), root, Some(Hydration::new(nodes)))
	}
}

impl<A: Adapter> RendererInner<A> {
	pub fn spawn(&self, future: impl Future<Output = ()> + 'static) {
		if let Err(error) = self.spawner.spawn_local(future) {
			let error = Error::Spawn(error.to_string().into());
			error!(%error, "Pending work was dropped.");
		}
	}

	pub fn flush_after(&self) {
		let after = mem::take(&mut *self.after.borrow_mut());
		for (callback, value) in after {
			callback(&value);
		}
	}

	fn render(self: &Rc<Self>, children: Child<A>, root: &A::Node, mut hydration: Option<Hydration<A>>) -> Rendered<Result<Value<A::Node>, Error>> {
		let existing = self
			.roots
			.borrow()
			.iter()
			.find(|(node, _)| node == root)
			.map(|(_, ret)| ret.clone());

		if matches!(children, Child::Null) {
			if let Some(ret) = existing {
				trace!("Unmounting root.");
				self.roots.borrow_mut().retain(|(node, _)| node != root);
				unmount(self, &ret, &ret, false);
				self.flush_after();
			}
			return Rendered::Ready(Ok(Value::Empty));
		}

		let element = Element::portal(root.clone(), children.clone());
		let ret = match existing {
			Some(ret) => {
				if hydration.take().is_some() {
					warn!("Root is rendered already. Hydrating as a regular render.");
				}
				ret.borrow_mut().element = element;
				ret
			}
			None => {
				let ret = Retainer::new(element, A::Scope::default());
				self.roots.borrow_mut().push((root.clone(), ret.clone()));
				ret
			}
		};
		ret.borrow_mut().flags.insert(Flags::DID_DIFF);

		match diff_children(self, &ret, None, &A::Scope::default(), &ret, children, hydration.as_mut()) {
			Err(error) => {
				error!(%error, "Uncaught error during render.");
				Rendered::Ready(Err(error))
			}
			Ok(None) => Rendered::Ready(Ok(self.commit_root(&ret))),
			Ok(Some(settled)) => {
				let renderer = Rc::downgrade(self);
				let future = async move {
					if let Err(error) = settled.await {
						error!(%error, "Uncaught error during render.");
						return Err(error);
					}
					match renderer.upgrade() {
						Some(renderer) => Ok(renderer.commit_root(&ret)),
						None => Err(Error::Unmounted),
					}
				}
				.boxed_local()
				.shared();
				self.spawn(future.clone().map(drop));
				Rendered::Pending(future)
			}
		}
	}

	fn commit_root(self: &Rc<Self>, ret: &RetainerRef<A>) -> Value<A::Node> {
		if ret.borrow().is_unmounted() {
			return Value::Empty;
		}

		commit_portal(self, ret);
		finish_commit(self, ret, ret, &[]);
		self.flush_after();

		let (root, values) = {
			let ret = ret.borrow();
			(ret.root.clone(), children_value(&ret.children))
		};
		if let Some(root) = root {
			self.adapter.finalize(&root);
		}
		self.adapter.read(values)
	}
}
