//! Running component bodies and scheduling their updates.
//!
//! Every component has at most one run *inflight* and at most one *enqueued* behind it.
//! Updates arriving while both are taken share the enqueued run, so bursts coalesce into one re-render with the latest props.

use crate::{
	adapter::Adapter,
	commit::{arrange_host, commit_children, retire_fallback},
	context::Context,
	diff::{diff_children, Hydration},
	element::{Child, Props, Value},
	renderer::RendererInner,
	retainer::{children_value, Block, Flags, RetainerRef, Settled},
	Error,
};
use core::{
	fmt::{self, Debug, Formatter},
	future::Future,
	mem,
};
use futures::{
	channel::oneshot,
	future::{self, LocalBoxFuture},
	FutureExt,
};
use std::rc::Rc;
use tracing::{error, instrument, trace, warn};

/// One resumption's worth of a generator component.
pub enum Step<A: Adapter> {
	/// Render these children and resume later.
	Yield(Child<A>),
	/// Render these children. The next update invokes the component anew.
	Return(Child<A>),
}

impl<A: Adapter> Step<A> {
	#[must_use]
	pub fn is_return(&self) -> bool {
		matches!(self, Step::Return(_))
	}

	#[must_use]
	pub fn into_children(self) -> Child<A> {
		match self {
			Step::Yield(children) | Step::Return(children) => children,
		}
	}
}

impl<A: Adapter> Clone for Step<A> {
	fn clone(&self) -> Self {
		match self {
			Step::Yield(children) => Step::Yield(children.clone()),
			Step::Return(children) => Step::Return(children.clone()),
		}
	}
}

impl<A: Adapter> Debug for Step<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Step::Yield(children) => f.debug_tuple("Yield").field(children).finish(),
			Step::Return(children) => f.debug_tuple("Return").field(children).finish(),
		}
	}
}

/// A stateful component body that is resumed once per update.
pub trait Generator<A: Adapter> {
	/// Runs until the next [`Step`]. `previous` is what the last step rendered to.
	///
	/// # Errors
	///
	/// Errors end the generator and propagate to the parent component.
	fn resume(&mut self, ctx: &Context<A>, previous: Value<A::Node>) -> Result<Step<A>, Error>;

	/// Receives errors from the children of the last step.
	///
	/// # Errors
	///
	/// Rethrows by default.
	fn throw(&mut self, ctx: &Context<A>, error: Error) -> Result<Step<A>, Error> {
		let _ = ctx;
		Err(error)
	}

	/// Called when the component unmounts while the generator is unfinished.
	fn finish(&mut self, ctx: &Context<A>) {
		let _ = ctx;
	}
}

impl<A: Adapter, F: FnMut(&Context<A>, Value<A::Node>) -> Result<Step<A>, Error>> Generator<A> for F {
	fn resume(&mut self, ctx: &Context<A>, previous: Value<A::Node>) -> Result<Step<A>, Error> {
		self(ctx, previous)
	}
}

/// The asynchronous counterpart to [`Generator`].
pub trait AsyncGenerator<A: Adapter> {
	fn resume(&mut self, ctx: &Context<A>, previous: Value<A::Node>) -> LocalBoxFuture<'static, Result<Step<A>, Error>>;

	fn throw(&mut self, ctx: &Context<A>, error: Error) -> LocalBoxFuture<'static, Result<Step<A>, Error>> {
		let _ = ctx;
		future::ready(Err(error)).boxed_local()
	}

	fn finish(&mut self, ctx: &Context<A>) -> LocalBoxFuture<'static, ()> {
		let _ = ctx;
		future::ready(()).boxed_local()
	}
}

impl<A: Adapter, F: FnMut(&Context<A>, Value<A::Node>) -> LocalBoxFuture<'static, Result<Step<A>, Error>>> AsyncGenerator<A> for F {
	fn resume(&mut self, ctx: &Context<A>, previous: Value<A::Node>) -> LocalBoxFuture<'static, Result<Step<A>, Error>> {
		self(ctx, previous)
	}
}

/// What calling a component produced.
pub enum Invocation<A: Adapter> {
	Children(Result<Child<A>, Error>),
	Future(LocalBoxFuture<'static, Result<Child<A>, Error>>),
	Generator(Box<dyn Generator<A>>),
	AsyncGenerator(Box<dyn AsyncGenerator<A>>),
}

impl<A: Adapter> Invocation<A> {
	fn kind(&self) -> Kind {
		match self {
			Invocation::Children(_) => Kind::Function,
			Invocation::Future(_) => Kind::AsyncFunction,
			Invocation::Generator(_) => Kind::Generator,
			Invocation::AsyncGenerator(_) => Kind::AsyncGenerator,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
	Function,
	AsyncFunction,
	Generator,
	AsyncGenerator,
}

impl Kind {
	fn name(self) -> &'static str {
		match self {
			Kind::Function => "function",
			Kind::AsyncFunction => "async function",
			Kind::Generator => "generator",
			Kind::AsyncGenerator => "async generator",
		}
	}
}

pub(crate) enum Body<A: Adapter> {
	Generator(Box<dyn Generator<A>>),
	AsyncGenerator(Box<dyn AsyncGenerator<A>>),
}

type Call<A> = dyn Fn(&Context<A>, &Props) -> Invocation<A>;

/// A user-defined element type.
///
/// Components compare by identity: clones are the same component, separately constructed ones never are.
pub struct Component<A: Adapter>(Rc<ComponentDef<A>>);

struct ComponentDef<A: Adapter> {
	name: Rc<str>,
	call: Box<Call<A>>,
}

impl<A: Adapter> Clone for Component<A> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<A: Adapter> PartialEq for Component<A> {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl<A: Adapter> Debug for Component<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Component").field(&self.0.name).finish()
	}
}

impl<A: Adapter> Component<A> {
	pub fn new(name: impl Into<Rc<str>>, call: impl Fn(&Context<A>, &Props) -> Invocation<A> + 'static) -> Self {
		Self(Rc::new(ComponentDef {
			name: name.into(),
			call: Box::new(call),
		}))
	}

	/// A component that renders synchronously and keeps no state between updates.
	pub fn function(name: impl Into<Rc<str>>, render: impl Fn(&Context<A>, &Props) -> Result<Child<A>, Error> + 'static) -> Self {
		Self::new(name, move |ctx, props| Invocation::Children(render(ctx, props)))
	}

	pub fn future<F: Future<Output = Result<Child<A>, Error>> + 'static>(name: impl Into<Rc<str>>, render: impl Fn(&Context<A>, &Props) -> F + 'static) -> Self {
		Self::new(name, move |ctx, props| Invocation::Future(render(ctx, props).boxed_local()))
	}

	/// `start` runs once per mount. The generator it returns is resumed for every update after that.
	pub fn generator<G: Generator<A> + 'static>(name: impl Into<Rc<str>>, start: impl Fn(&Context<A>, &Props) -> G + 'static) -> Self {
		Self::new(name, move |ctx, props| Invocation::Generator(Box::new(start(ctx, props))))
	}

	pub fn async_generator<G: AsyncGenerator<A> + 'static>(name: impl Into<Rc<str>>, start: impl Fn(&Context<A>, &Props) -> G + 'static) -> Self {
		Self::new(name, move |ctx, props| Invocation::AsyncGenerator(Box::new(start(ctx, props))))
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.0.name
	}

	fn call(&self, ctx: &Context<A>, props: &Props) -> Invocation<A> {
		(self.0.call)(ctx, props)
	}
}

/// A scheduled run: `block` gates the next run, `value` settles once its render is committed.
pub(crate) struct Slot {
	pub block: Block,
	pub value: Option<Settled>,
}

struct Run {
	block: Option<Block>,
	value: Option<Settled>,
}

impl Run {
	fn sync(value: Option<Settled>) -> Self {
		let block = value.clone().map(|value| value.map(drop).boxed_local().shared());
		Self { block, value }
	}
}

pub(crate) async fn settle(outcome: Result<Option<Settled>, Error>) -> Result<(), Error> {
	match outcome {
		Ok(None) => Ok(()),
		Ok(Some(settled)) => settled.await,
		Err(error) => Err(error),
	}
}

/// Re-renders the component at `ret` with its element's current props, creating its context first if needed.
#[instrument(skip_all, fields(component = %ret.borrow().element.tag().name()))]
pub(crate) fn update_component<A: Adapter>(
	renderer: &Rc<RendererInner<A>>,
	ret: &RetainerRef<A>,
	parent: Option<&Context<A>>,
	host: &RetainerRef<A>,
	scope: &A::Scope,
	hydration: Option<&mut Hydration<A>>,
) -> Result<Option<Settled>, Error> {
	let existing = ret.borrow().ctx.clone();
	let ctx = match existing {
		Some(ctx) => {
			if ctx.has(Flags::IS_EXECUTING) {
				let error = Error::AlreadyExecuting;
				error!(%error, "Update ignored.");
				return Ok(None);
			}
			*ctx.0.scope.borrow_mut() = scope.clone();
			ctx
		}
		None => {
			let ctx = Context::new(renderer, ret, parent.cloned(), host, scope.clone());
			ret.borrow_mut().ctx = Some(ctx.clone());
			ctx
		}
	};

	ctx.insert(Flags::IS_UPDATING | Flags::PROPS_AVAILABLE);
	enqueue_run(&ctx, hydration)
}

pub(crate) fn enqueue_run<A: Adapter>(ctx: &Context<A>, hydration: Option<&mut Hydration<A>>) -> Result<Option<Settled>, Error> {
	let Some(renderer) = ctx.renderer() else {
		return Ok(None);
	};

	let inflight = ctx.0.inflight.borrow().as_ref().map(|slot| slot.block.clone());
	let Some(inflight) = inflight else {
		let run = run_component(ctx, hydration)?;
		if let Some(block) = run.block {
			let block = advance(ctx, block);
			renderer.spawn(block.clone());
			*ctx.0.inflight.borrow_mut() = Some(Slot { block, value: run.value.clone() });
		}
		if let Some(value) = &run.value {
			renderer.spawn(value.clone().map(drop));
		}
		return Ok(run.value);
	};

	if let Some(enqueued) = &*ctx.0.enqueued.borrow() {
		trace!("Coalescing with the enqueued run.");
		return Ok(enqueued.value.clone());
	}

	if hydration.is_some() {
		warn!("Component is still busy. Its children won't be hydrated.");
	}

	let (sender, receiver) = oneshot::channel::<Option<Block>>();
	let weak = Rc::downgrade(&ctx.0);
	let value: Settled = async move {
		inflight.await;
		let Some(ctx) = weak.upgrade().map(Context) else {
			return Ok(());
		};
		if ctx.is_unmounted() {
			return Ok(());
		}
		match run_component(&ctx, None) {
			Ok(run) => {
				// The block future may already be gone if the component was dropped.
				let _ = sender.send(run.block);
				settle(Ok(run.value)).await
			}
			Err(error) => Err(error),
		}
	}
	.boxed_local()
	.shared();

	let block = async move {
		if let Ok(Some(block)) = receiver.await {
			block.await;
		}
	}
	.boxed_local()
	.shared();
	let block = advance(ctx, block);

	renderer.spawn(block.clone());
	renderer.spawn(value.clone().map(drop));
	*ctx.0.enqueued.borrow_mut() = Some(Slot { block, value: Some(value.clone()) });
	Ok(Some(value))
}

/// Promotes the enqueued run once `block` completes.
fn advance<A: Adapter>(ctx: &Context<A>, block: Block) -> Block {
	let weak = Rc::downgrade(&ctx.0);
	async move {
		block.await;
		if let Some(inner) = weak.upgrade() {
			let next = inner.enqueued.borrow_mut().take();
			*inner.inflight.borrow_mut() = next;
		}
	}
	.boxed_local()
	.shared()
}

fn run_component<A: Adapter>(ctx: &Context<A>, hydration: Option<&mut Hydration<A>>) -> Result<Run, Error> {
	let kind = ctx.0.kind.get();
	let has_body = ctx.0.body.borrow().is_some();
	match kind {
		Some(Kind::Generator) if has_body => resume_generator(ctx, hydration),
		Some(Kind::AsyncGenerator) if has_body => {
			if let Some(hydration) = hydration {
				hydration.abandon();
			}
			if ctx.has(Flags::IS_IN_FOR_AWAIT_OF_LOOP) {
				Ok(request_pull(ctx))
			} else {
				Ok(resume_async_generator(ctx))
			}
		}
		_ => invoke(ctx, kind, hydration),
	}
}

fn invoke<A: Adapter>(ctx: &Context<A>, previous: Option<Kind>, hydration: Option<&mut Hydration<A>>) -> Result<Run, Error> {
	let Some(ret) = ctx.retainer() else {
		return Ok(Run::sync(None));
	};
	let (component, props) = {
		let ret = ret.borrow();
		match ret.element.tag() {
			crate::element::Tag::Component(component) => (component.clone(), ret.element.props().clone()),
			other => return Err(Error::msg(format!("{other:?} is not a component"))),
		}
	};

	ctx.insert(Flags::IS_EXECUTING);
	let invocation = component.call(ctx, &props);
	ctx.remove(Flags::IS_EXECUTING);

	let kind = invocation.kind();
	if let Some(previous) = previous {
		if previous != kind {
			return Err(Error::KindMismatch {
				name: component.name().into(),
				from: previous.name(),
				to: kind.name(),
			});
		}
	}
	ctx.0.kind.set(Some(kind));

	match invocation {
		Invocation::Children(Ok(children)) => Ok(Run {
			block: None,
			value: update_children(ctx, children, hydration)?,
		}),
		Invocation::Children(Err(error)) => Err(error),
		Invocation::Future(body) => {
			if let Some(hydration) = hydration {
				warn!("Async component can't be hydrated synchronously. Creating its nodes instead.");
				hydration.abandon();
			}
			let body = body.shared();
			let block = body.clone().map(drop).boxed_local().shared();
			let ctx = ctx.clone();
			let value = async move {
				match body.await {
					Ok(children) => settle(update_children(&ctx, children, None)).await,
					Err(error) => Err(error),
				}
			}
			.boxed_local()
			.shared();
			Ok(Run { block: Some(block), value: Some(value) })
		}
		Invocation::Generator(generator) => {
			*ctx.0.body.borrow_mut() = Some(Body::Generator(generator));
			ctx.insert(Flags::IS_SYNC_GEN);
			resume_generator(ctx, hydration)
		}
		Invocation::AsyncGenerator(generator) => {
			if let Some(hydration) = hydration {
				warn!("Async generator component can't be hydrated synchronously. Creating its nodes instead.");
				hydration.abandon();
			}
			*ctx.0.body.borrow_mut() = Some(Body::AsyncGenerator(generator));
			ctx.insert(Flags::IS_ASYNC_GEN);
			Ok(resume_async_generator(ctx))
		}
	}
}

fn resume_generator<A: Adapter>(ctx: &Context<A>, hydration: Option<&mut Hydration<A>>) -> Result<Run, Error> {
	ctx.remove(Flags::NEEDS_TO_YIELD);
	let previous = ctx.value();

	let mut body = ctx.0.body.borrow_mut().take();
	let Some(Body::Generator(generator)) = body.as_mut() else {
		*ctx.0.body.borrow_mut() = body;
		return Err(Error::msg("Component has no sync generator to resume."));
	};
	ctx.insert(Flags::IS_EXECUTING);
	let step = generator.resume(ctx, previous);
	ctx.remove(Flags::IS_EXECUTING);

	match step {
		Ok(step) => {
			if step.is_return() {
				finish_generator(ctx);
			} else {
				if ctx.has(Flags::IS_IN_FOR_OF_LOOP) && !ctx.has(Flags::NEEDS_TO_YIELD) {
					warn!("Generator yielded without pulling props. It will keep seeing stale ones.");
				}
				*ctx.0.body.borrow_mut() = body;
			}
			Ok(Run::sync(update_children(ctx, step.into_children(), hydration)?))
		}
		Err(error) => {
			finish_generator(ctx);
			Err(error)
		}
	}
}

/// Starts one iteration of an async generator outside of pull mode.
fn resume_async_generator<A: Adapter>(ctx: &Context<A>) -> Run {
	let Some(iteration) = resume_async(ctx) else {
		return Run::sync(None);
	};
	let iteration = iteration.shared();
	let block = iteration.clone().map(drop).boxed_local().shared();
	let ctx = ctx.clone();
	let value = async move { after_async_step(ctx, iteration.await).await }.boxed_local().shared();
	Run { block: Some(block), value: Some(value) }
}

fn resume_async<A: Adapter>(ctx: &Context<A>) -> Option<LocalBoxFuture<'static, Result<Step<A>, Error>>> {
	ctx.remove(Flags::NEEDS_TO_YIELD);
	let previous = ctx.value();

	let mut body = ctx.0.body.borrow_mut().take();
	let iteration = match body.as_mut() {
		Some(Body::AsyncGenerator(generator)) => {
			ctx.insert(Flags::IS_EXECUTING);
			let iteration = generator.resume(ctx, previous);
			ctx.remove(Flags::IS_EXECUTING);
			Some(iteration)
		}
		_ => None,
	};
	*ctx.0.body.borrow_mut() = body;
	iteration
}

fn after_async_step<A: Adapter>(ctx: Context<A>, step: Result<Step<A>, Error>) -> LocalBoxFuture<'static, Result<(), Error>> {
	async move {
		let step = match step {
			Ok(step) => step,
			Err(error) => {
				finish_generator(&ctx);
				return Err(error);
			}
		};

		let done = step.is_return();
		if done {
			finish_generator(&ctx);
		}
		let outcome = settle(update_children(&ctx, step.into_children(), None)).await;

		if !done && ctx.has(Flags::IS_IN_FOR_AWAIT_OF_LOOP) && !ctx.has(Flags::IS_PULLING) && !ctx.is_unmounted() {
			if let Some(renderer) = ctx.renderer() {
				renderer.spawn(pull(ctx.clone()));
			}
		}
		outcome
	}
	.boxed_local()
}

/// Drops a completed generator, so that the next update invokes the component anew.
fn finish_generator<A: Adapter>(ctx: &Context<A>) {
	drop(ctx.0.body.borrow_mut().take());
	ctx.remove(Flags::IS_SYNC_GEN | Flags::IS_ASYNC_GEN | Flags::IS_IN_FOR_OF_LOOP | Flags::IS_IN_FOR_AWAIT_OF_LOOP | Flags::NEEDS_TO_YIELD);
}

/// Hands new props to a generator in pull mode. Settles with its next yield.
fn request_pull<A: Adapter>(ctx: &Context<A>) -> Run {
	ctx.insert(Flags::PROPS_AVAILABLE);
	if let Some(waiter) = ctx.0.props_waiter.borrow_mut().take() {
		// The waiter is gone iff the generator stopped waiting already.
		let _ = waiter.send(());
	}

	let (sender, receiver) = oneshot::channel();
	ctx.0.pull_waiters.borrow_mut().push(sender);
	let value = async move { receiver.await.unwrap_or(Ok(())) }.boxed_local().shared();
	Run { block: None, value: Some(value) }
}

/// Keeps resuming an async generator that waits for its own props.
fn pull<A: Adapter>(ctx: Context<A>) -> LocalBoxFuture<'static, ()> {
	async move {
		ctx.insert(Flags::IS_PULLING);
		loop {
			if ctx.is_unmounted() {
				break;
			}
			let Some(iteration) = resume_async(&ctx) else {
				break;
			};
			let step = iteration.await;
			let done = !matches!(step, Ok(Step::Yield(_)));
			let outcome = after_async_step(ctx.clone(), step).await;

			let waiters = mem::take(&mut *ctx.0.pull_waiters.borrow_mut());
			if waiters.is_empty() {
				if let Err(error) = outcome {
					if let Err(error) = settle(propagate_error(ctx.parent(), error)).await {
						error!(%error, "Uncaught error in async generator component.");
					}
				}
			} else {
				for waiter in waiters {
					let _ = waiter.send(outcome.clone());
				}
			}

			if done {
				break;
			}
		}
		ctx.remove(Flags::IS_PULLING);

		if ctx.is_unmounted() {
			let body = ctx.0.body.borrow_mut().take();
			if let Some(Body::AsyncGenerator(mut generator)) = body {
				generator.finish(&ctx).await;
			}
		}
		for waiter in mem::take(&mut *ctx.0.pull_waiters.borrow_mut()) {
			let _ = waiter.send(Ok(()));
		}
	}
	.boxed_local()
}

/// Diffs `children` into the component and commits them once they settle.
pub(crate) fn update_children<A: Adapter>(ctx: &Context<A>, children: Child<A>, hydration: Option<&mut Hydration<A>>) -> Result<Option<Settled>, Error> {
	if ctx.is_unmounted() {
		return Ok(None);
	}
	let (Some(renderer), Some(ret), Some(host)) = (ctx.renderer(), ctx.retainer(), ctx.host()) else {
		return Ok(None);
	};
	let scope = ctx.0.scope.borrow().clone();

	match diff_children(&renderer, &host, Some(ctx), &scope, &ret, children, hydration) {
		Err(error) => handle_child_error(ctx, error),
		Ok(None) => {
			commit_component(&renderer, ctx);
			Ok(None)
		}
		Ok(Some(diff)) => {
			let ctx = ctx.clone();
			Ok(Some(
				async move {
					match diff.await {
						Ok(()) => {
							if let Some(renderer) = ctx.renderer() {
								commit_component(&renderer, &ctx);
							}
							Ok(())
						}
						Err(error) => settle(handle_child_error(&ctx, error)).await,
					}
				}
				.boxed_local()
				.shared(),
			))
		}
	}
}

/// Offers an error raised by a child to the component's generator.
///
/// Components without a running generator rethrow it.
pub(crate) fn handle_child_error<A: Adapter>(ctx: &Context<A>, error: Error) -> Result<Option<Settled>, Error> {
	if ctx.is_unmounted() {
		return Err(error);
	}

	let mut body = ctx.0.body.borrow_mut().take();
	match body.as_mut() {
		Some(Body::Generator(generator)) => {
			ctx.insert(Flags::IS_EXECUTING);
			let step = generator.throw(ctx, error);
			ctx.remove(Flags::IS_EXECUTING);
			match step {
				Ok(step) => {
					if step.is_return() {
						finish_generator(ctx);
					} else {
						*ctx.0.body.borrow_mut() = body;
					}
					update_children(ctx, step.into_children(), None)
				}
				Err(error) => {
					finish_generator(ctx);
					Err(error)
				}
			}
		}
		Some(Body::AsyncGenerator(generator)) => {
			ctx.insert(Flags::IS_EXECUTING);
			let step = generator.throw(ctx, error);
			ctx.remove(Flags::IS_EXECUTING);
			*ctx.0.body.borrow_mut() = body;
			let ctx = ctx.clone();
			Ok(Some(async move { after_async_step(ctx, step.await).await }.boxed_local().shared()))
		}
		None => Err(error),
	}
}

/// Walks up from `parent` until some component handles `error`.
pub(crate) fn propagate_error<A: Adapter>(parent: Option<Context<A>>, mut error: Error) -> Result<Option<Settled>, Error> {
	let mut current = parent;
	while let Some(ctx) = current {
		match handle_child_error(&ctx, error) {
			Ok(settled) => return Ok(settled),
			Err(unhandled) => {
				error = unhandled;
				current = ctx.parent();
			}
		}
	}
	Err(error)
}

/// Commits the component's children and updates its value.
///
/// Refreshes that didn't come from the parent also rearrange the host, since no ancestor commit follows them.
pub(crate) fn commit_component<A: Adapter>(renderer: &Rc<RendererInner<A>>, ctx: &Context<A>) {
	if ctx.is_unmounted() {
		return;
	}
	let (Some(ret), Some(host)) = (ctx.retainer(), ctx.host()) else {
		return;
	};

	let values = commit_children(renderer, &ret, &host);
	let (first, node_ref, old) = {
		let mut ret = ret.borrow_mut();
		let first = !ret.is_committed();
		ret.flags.insert(Flags::DID_COMMIT);
		ret.flags.remove(Flags::DID_DIFF);
		let old = mem::replace(&mut ret.nodes, values.clone());
		(first, ret.element.node_ref().cloned(), old)
	};
	retire_fallback(renderer, &ret, &host);
	ctx.bind_nodes(&renderer.adapter, &values);

	let value = renderer.adapter.read(values.clone());
	if first {
		if let Some(node_ref) = node_ref {
			node_ref(&value);
		}
	}

	let refreshing = ctx.has(Flags::IS_REFRESHING) || !ctx.has(Flags::IS_UPDATING);
	ctx.remove(Flags::IS_UPDATING | Flags::IS_REFRESHING);
	if refreshing {
		refresh_ancestors(renderer, ctx, &host);
		if old != values {
			arrange_host(renderer, &host);
		}
	}

	let schedules = mem::take(&mut *ctx.0.schedules.borrow_mut());
	for callback in schedules {
		callback(&value);
	}

	let afters = mem::take(&mut *ctx.0.afters.borrow_mut());
	renderer.after.borrow_mut().extend(afters.into_iter().map(|callback| (callback, value.clone())));
	if refreshing {
		renderer.flush_after();
	}
}

/// Recomputes the cached values of ancestor components that render into the same host.
fn refresh_ancestors<A: Adapter>(renderer: &Rc<RendererInner<A>>, ctx: &Context<A>, host: &RetainerRef<A>) {
	let mut current = ctx.parent();
	while let Some(ancestor) = current {
		match (ancestor.host(), ancestor.retainer()) {
			(Some(ancestor_host), Some(ret)) if Rc::ptr_eq(&ancestor_host, host) => {
				let values = children_value(&ret.borrow().children);
				ancestor.bind_nodes(&renderer.adapter, &values);
				ret.borrow_mut().nodes = values;
			}
			_ => break,
		}
		current = ancestor.parent();
	}
}
