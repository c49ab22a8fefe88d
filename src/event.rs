use core::{
	any::Any,
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;
use tracing::{instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
	None,
	Capturing,
	AtTarget,
	Bubbling,
}

/// A synthetic event dispatched along the component tree.
pub struct Event {
	ty: Rc<str>,
	detail: Option<Rc<dyn Any>>,
	bubbles: bool,
	cancelable: bool,
	phase: Cell<EventPhase>,
	propagation_stopped: Cell<bool>,
	immediate_propagation_stopped: Cell<bool>,
	default_prevented: Cell<bool>,
}

impl Debug for Event {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event")
			.field("ty", &self.ty)
			.field("bubbles", &self.bubbles)
			.field("phase", &self.phase.get())
			.finish_non_exhaustive()
	}
}

impl Event {
	/// A bubbling, cancelable event without detail.
	pub fn new(ty: impl Into<Rc<str>>) -> Self {
		Self {
			ty: ty.into(),
			detail: None,
			bubbles: true,
			cancelable: true,
			phase: Cell::new(EventPhase::None),
			propagation_stopped: Cell::new(false),
			immediate_propagation_stopped: Cell::new(false),
			default_prevented: Cell::new(false),
		}
	}

	#[must_use]
	pub fn with_detail(mut self, detail: impl Any) -> Self {
		self.detail = Some(Rc::new(detail));
		self
	}

	#[must_use]
	pub fn bubbles(mut self, bubbles: bool) -> Self {
		self.bubbles = bubbles;
		self
	}

	#[must_use]
	pub fn cancelable(mut self, cancelable: bool) -> Self {
		self.cancelable = cancelable;
		self
	}

	#[must_use]
	pub fn ty(&self) -> &str {
		&self.ty
	}

	#[must_use]
	pub fn detail<T: 'static>(&self) -> Option<&T> {
		self.detail.as_deref().and_then(<dyn Any>::downcast_ref)
	}

	#[must_use]
	pub fn phase(&self) -> EventPhase {
		self.phase.get()
	}

	pub fn stop_propagation(&self) {
		self.propagation_stopped.set(true);
	}

	pub fn stop_immediate_propagation(&self) {
		self.propagation_stopped.set(true);
		self.immediate_propagation_stopped.set(true);
	}

	/// Has no effect on events that aren't cancelable.
	pub fn prevent_default(&self) {
		if self.cancelable {
			self.default_prevented.set(true);
		}
	}

	#[must_use]
	pub fn default_prevented(&self) -> bool {
		self.default_prevented.get()
	}

	#[cfg(feature = "dom")]
	pub(crate) fn set_phase(&self, phase: EventPhase) {
		self.phase.set(phase);
	}

	#[cfg(feature = "dom")]
	pub(crate) fn is_propagation_stopped(&self) -> bool {
		self.propagation_stopped.get()
	}

	pub(crate) fn is_immediate_propagation_stopped(&self) -> bool {
		self.immediate_propagation_stopped.get()
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
	/// Listen during the capturing phase instead of the bubbling one.
	pub capture: bool,
	/// Remove the listener after its first call.
	pub once: bool,
}

impl ListenerOptions {
	#[must_use]
	pub fn capture() -> Self {
		Self { capture: true, once: false }
	}

	#[must_use]
	pub fn once() -> Self {
		Self { capture: false, once: true }
	}
}

/// Handle returned by [`Context::add_event_listener`](`crate::Context::add_event_listener`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A component's event listener as [`Adapter`](`crate::Adapter`)s see it.
///
/// The renderer attaches it to each node the component currently renders to and detaches it when that changes.
/// Adapters whose output raises events should [`call`](`NodeListener::call`) it with them.
#[derive(Clone)]
pub struct NodeListener {
	ty: Rc<str>,
	capture: bool,
	callback: Rc<dyn Fn(&Event)>,
}

impl Debug for NodeListener {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("NodeListener")
			.field("ty", &self.ty)
			.field("capture", &self.capture)
			.finish_non_exhaustive()
	}
}

impl NodeListener {
	pub(crate) fn new(ty: Rc<str>, capture: bool, callback: impl Fn(&Event) + 'static) -> Self {
		Self {
			ty,
			capture,
			callback: Rc::new(callback),
		}
	}

	#[must_use]
	pub fn ty(&self) -> &str {
		&self.ty
	}

	/// Whether to listen during the capturing phase.
	#[must_use]
	pub fn capture(&self) -> bool {
		self.capture
	}

	pub fn call(&self, event: &Event) {
		(self.callback)(event);
	}

	/// Whether `self` and `other` are clones of the same listener.
	#[must_use]
	pub fn is(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.callback, &other.callback)
	}
}

struct Listener {
	id: ListenerId,
	ty: Rc<str>,
	callback: Rc<dyn Fn(&Event)>,
	options: ListenerOptions,
}

#[derive(Default)]
pub(crate) struct Listeners {
	next_id: Cell<u64>,
	entries: RefCell<Vec<Listener>>,
}

impl Listeners {
	pub fn add(&self, ty: Rc<str>, callback: Rc<dyn Fn(&Event)>, options: ListenerOptions) -> ListenerId {
		let id = ListenerId(self.next_id.get());
		self.next_id.set(id.0 + 1);
		self.entries.borrow_mut().push(Listener { id, ty, callback, options });
		id
	}

	pub fn remove(&self, id: ListenerId) -> bool {
		let mut entries = self.entries.borrow_mut();
		let len = entries.len();
		entries.retain(|listener| listener.id != id);
		entries.len() != len
	}

	pub fn clear(&self) {
		self.entries.borrow_mut().clear();
	}

	/// Calls the listener `id` for an event raised by an output node.
	///
	/// Returns whether the listener is still registered afterwards.
	pub fn fire_one(&self, id: ListenerId, event: &Event) -> bool {
		let found = self
			.entries
			.borrow()
			.iter()
			.find(|listener| listener.id == id)
			.map(|listener| (listener.options.once, listener.callback.clone()));
		let Some((once, callback)) = found else {
			return false;
		};
		if once {
			self.remove(id);
		}
		callback(event);
		!once
	}

	/// Calls matching listeners. `capture` limits them to one phase; [`None`] calls all of them.
	fn fire(&self, event: &Event, capture: Option<bool>) {
		let matching: Vec<_> = self
			.entries
			.borrow()
			.iter()
			.filter(|listener| *listener.ty == *event.ty && capture.map_or(true, |capture| listener.options.capture == capture))
			.map(|listener| (listener.id, listener.options.once, listener.callback.clone()))
			.collect();

		for (id, once, callback) in matching {
			if once {
				self.remove(id);
			}
			callback(event);
			if event.immediate_propagation_stopped.get() {
				break;
			}
		}
	}
}

pub(crate) fn dispatch(target: &Listeners, ancestors: &[&Listeners], event: &Event) -> bool {
	propagate(&target, ancestors, event, |listeners, event, capture| listeners.fire(event, capture))
}

/// Runs capture top-down over `ancestors`, then the target, then bubbling bottom-up.
///
/// `ancestors` are ordered nearest first. `fire` receives the phase filter: capturing listeners only, bubbling
/// listeners only, or [`None`] for all of them at the target.
///
/// Returns `false` iff the default was prevented.
#[instrument(skip_all, fields(ty = %event.ty))]
pub(crate) fn propagate<T>(target: &T, ancestors: &[T], event: &Event, fire: impl Fn(&T, &Event, Option<bool>)) -> bool {
	event.phase.set(EventPhase::Capturing);
	for current in ancestors.iter().rev() {
		fire(current, event, Some(true));
		if event.propagation_stopped.get() {
			return finish(event);
		}
	}

	event.phase.set(EventPhase::AtTarget);
	fire(target, event, None);

	if event.bubbles && !event.propagation_stopped.get() {
		event.phase.set(EventPhase::Bubbling);
		for current in ancestors {
			fire(current, event, Some(false));
			if event.propagation_stopped.get() {
				break;
			}
		}
	}

	finish(event)
}

fn finish(event: &Event) -> bool {
	event.phase.set(EventPhase::None);
	let prevented = event.default_prevented.get();
	trace!(prevented, "Dispatch finished.");
	!prevented
}

#[cfg(test)]
mod tests {
	use super::*;

	fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, entry: &'static str) -> Rc<dyn Fn(&Event)> {
		let log = log.clone();
		Rc::new(move |_| log.borrow_mut().push(entry))
	}

	#[test]
	fn phases_in_order() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let (root, parent, target) = (Listeners::default(), Listeners::default(), Listeners::default());
		root.add("ping".into(), recorder(&log, "root capture"), ListenerOptions::capture());
		root.add("ping".into(), recorder(&log, "root bubble"), ListenerOptions::default());
		parent.add("ping".into(), recorder(&log, "parent bubble"), ListenerOptions::default());
		target.add("ping".into(), recorder(&log, "target"), ListenerOptions::default());
		target.add("pong".into(), recorder(&log, "wrong type"), ListenerOptions::default());

		assert!(dispatch(&target, &[&parent, &root], &Event::new("ping")));
		assert_eq!(*log.borrow(), ["root capture", "target", "parent bubble", "root bubble"]);
	}

	#[test]
	fn stopping_and_once() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let (parent, target) = (Listeners::default(), Listeners::default());
		parent.add("ping".into(), recorder(&log, "parent"), ListenerOptions::default());
		target.add("ping".into(), Rc::new(Event::stop_immediate_propagation), ListenerOptions::once());
		target.add("ping".into(), recorder(&log, "target"), ListenerOptions::default());

		dispatch(&target, &[&parent], &Event::new("ping"));
		assert!(log.borrow().is_empty());

		dispatch(&target, &[&parent], &Event::new("ping"));
		assert_eq!(*log.borrow(), ["target", "parent"]);
	}

	#[test]
	fn fire_one_respects_once() {
		let log = Rc::new(RefCell::new(Vec::new()));
		let listeners = Listeners::default();
		let once = listeners.add("ping".into(), recorder(&log, "once"), ListenerOptions::once());
		let kept = listeners.add("ping".into(), recorder(&log, "kept"), ListenerOptions::default());

		assert!(!listeners.fire_one(once, &Event::new("ping")));
		assert!(!listeners.fire_one(once, &Event::new("ping")));
		assert!(listeners.fire_one(kept, &Event::new("ping")));
		assert_eq!(*log.borrow(), ["once", "kept"]);
	}

	#[test]
	fn prevent_default() {
		let target = Listeners::default();
		target.add("submit".into(), Rc::new(Event::prevent_default), ListenerOptions::default());
		assert!(!dispatch(&target, &[], &Event::new("submit")));
		assert!(dispatch(&target, &[], &Event::new("submit").cancelable(false)));
	}
}
