#![allow(dead_code)]

use cambium::{
	html::{HtmlAdapter, HtmlNode},
	Child, Element, Renderer,
};
use futures::{channel::oneshot, executor::LocalPool, future::LocalBoxFuture, FutureExt};
use std::{
	cell::{Cell, RefCell},
	future::Future,
	rc::Rc,
};

pub type Html = HtmlAdapter;
pub type E = Element<Html>;
pub type C = Child<Html>;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub struct Harness {
	pub pool: LocalPool,
	pub renderer: Renderer<Html>,
	pub root: HtmlNode,
}

impl Harness {
	pub fn new() -> Self {
		init_tracing();
		let pool = LocalPool::new();
		let renderer = Renderer::new(HtmlAdapter, pool.spawner());
		Self {
			pool,
			renderer,
			root: HtmlNode::element("body"),
		}
	}

	pub fn render(&self, children: impl Into<C>) -> cambium::Rendered<Result<cambium::Value<HtmlNode>, cambium::Error>> {
		self.renderer.render(children, &self.root)
	}

	pub fn html(&self) -> String {
		self.root.inner_html()
	}

	/// Runs spawned work until nothing can make progress anymore.
	pub fn settle(&mut self) {
		self.pool.run_until_stalled();
	}

	pub fn run<F: Future>(&mut self, future: F) -> F::Output {
		self.pool.run_until(future)
	}
}

/// A delay that ends when the test says so.
#[derive(Clone, Default)]
pub struct Gate(Rc<GateInner>);

#[derive(Default)]
struct GateInner {
	open: Cell<bool>,
	waiters: RefCell<Vec<oneshot::Sender<()>>>,
}

impl Gate {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn wait(&self) -> LocalBoxFuture<'static, ()> {
		if self.0.open.get() {
			return futures::future::ready(()).boxed_local();
		}
		let (sender, receiver) = oneshot::channel();
		self.0.waiters.borrow_mut().push(sender);
		async move {
			let _ = receiver.await;
		}
		.boxed_local()
	}

	pub fn open(&self) {
		self.0.open.set(true);
		for waiter in self.0.waiters.borrow_mut().drain(..) {
			let _ = waiter.send(());
		}
	}
}

/// Shared call counter.
#[derive(Clone, Default)]
pub struct Counter(Rc<Cell<usize>>);

impl Counter {
	pub fn bump(&self) -> usize {
		self.0.set(self.0.get() + 1);
		self.0.get()
	}

	pub fn get(&self) -> usize {
		self.0.get()
	}
}

/// Shared log of events, in order.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
	pub fn push(&self, entry: impl Into<String>) {
		self.0.borrow_mut().push(entry.into());
	}

	pub fn entries(&self) -> Vec<String> {
		self.0.borrow().clone()
	}
}
