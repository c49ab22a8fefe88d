use cambium::{html::HtmlNode, Component, Context, Error, Event, ListenerOptions, Props, Step, Value};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

mod harness_;
use harness_::{Counter, Gate, Harness, Html, Log, C, E};

type Slot = Rc<RefCell<Option<Context<Html>>>>;

/// A generator component that hands out its context and yields `children`.
fn exposed(name: &str, slot: &Slot, children: impl Fn() -> C + 'static) -> Component<Html> {
	let slot = slot.clone();
	let children = Rc::new(children);
	Component::generator(name, move |ctx: &Context<Html>, _props: &Props| {
		*slot.borrow_mut() = Some(ctx.clone());
		let children = children.clone();
		move |_ctx: &Context<Html>, _previous: Value<HtmlNode>| -> Result<Step<Html>, Error> { Ok(Step::Yield(children())) }
	})
}

fn take(slot: &Slot) -> Context<Html> {
	slot.borrow().clone().expect("component ran")
}

#[test]
fn provide_and_consume() {
	let harness = Harness::new();
	let consumer: Component<Html> = Component::function("Consumer", |ctx, _props| Ok(C::from(ctx.consume::<String>("theme").unwrap_or_else(|| "plain".to_owned()))));
	let provider: Component<Html> = Component::function("Provider", {
		let consumer = consumer.clone();
		move |ctx: &Context<Html>, props: &Props| {
			ctx.provide("theme", props.get_str("theme").unwrap_or_default().to_owned());
			assert_eq!(ctx.consume::<String>("theme"), None, "providers don't see their own values");
			Ok(E::build("div").child(E::build(&consumer)).into())
		}
	});

	harness.render(E::build(&provider).prop("theme", "dark"));
	assert_eq!(harness.html(), "<div>dark</div>");

	harness.render(E::build(&provider).prop("theme", "light"));
	assert_eq!(harness.html(), "<div>light</div>");

	harness.render(E::build(&consumer));
	assert_eq!(harness.html(), "plain");
}

#[test]
fn consume_checks_the_type() {
	let harness = Harness::new();
	let seen = Log::default();
	let consumer: Component<Html> = Component::function("Consumer", {
		let seen = seen.clone();
		move |ctx: &Context<Html>, _props: &Props| {
			seen.push(format!("{:?}", ctx.consume::<u32>("answer")));
			Ok(C::Null)
		}
	});
	let provider: Component<Html> = Component::function("Provider", move |ctx, _props| {
		ctx.provide("answer", "forty-two");
		Ok(E::build(&consumer).into())
	});

	harness.render(E::build(&provider));
	assert_eq!(seen.entries(), ["None"]);
}

#[test]
fn children_are_passed_through() {
	let harness = Harness::new();
	let wrapper: Component<Html> = Component::function("Wrapper", |ctx, _props| Ok(E::build("section").children(ctx.children()).into()));
	harness.render(E::build(&wrapper).child("inner").child(E::build("i")));
	assert_eq!(harness.html(), "<section>inner<i></i></section>");
}

#[test]
fn events_capture_and_bubble() {
	let harness = Harness::new();
	let log = Log::default();
	let (parent_slot, child_slot) = (Slot::default(), Slot::default());
	let child = exposed("Child", &child_slot, || C::Null);
	let parent = exposed("Parent", &parent_slot, move || E::build(&child).into());

	harness.render(E::build(&parent));
	let (parent, target) = (take(&parent_slot), take(&child_slot));

	let entry = |entry: &'static str| {
		let log = log.clone();
		move |_: &Event| log.push(entry)
	};
	parent.add_event_listener("ping", entry("parent bubble"), ListenerOptions::default());
	parent.add_event_listener("ping", entry("parent capture"), ListenerOptions::capture());
	target.add_event_listener("ping", entry("target"), ListenerOptions::default());

	assert!(target.dispatch_event(&Event::new("ping")));
	assert_eq!(log.entries(), ["parent capture", "target", "parent bubble"]);

	assert!(parent.dispatch_event(&Event::new("ping").bubbles(false)));
	assert_eq!(log.entries()[3..], ["parent bubble", "parent capture"]);
}

#[test]
fn events_carry_detail_and_can_be_prevented() {
	let harness = Harness::new();
	let (parent_slot, child_slot) = (Slot::default(), Slot::default());
	let child = exposed("Child", &child_slot, || C::Null);
	let parent = exposed("Parent", &parent_slot, move || E::build(&child).into());
	harness.render(E::build(&parent));
	let (parent, target) = (take(&parent_slot), take(&child_slot));

	let total = Counter::default();
	let id = parent.add_event_listener(
		"add",
		{
			let total = total.clone();
			move |event: &Event| {
				for _ in 0..*event.detail::<usize>().unwrap_or(&0) {
					total.bump();
				}
				event.prevent_default();
			}
		},
		ListenerOptions::default(),
	);

	assert!(!target.dispatch_event(&Event::new("add").with_detail(3_usize)));
	assert_eq!(total.get(), 3);

	assert!(parent.remove_event_listener(id));
	assert!(!parent.remove_event_listener(id));
	assert!(target.dispatch_event(&Event::new("add").with_detail(3_usize)));
	assert_eq!(total.get(), 3);
}

#[test]
fn unmounting_removes_listeners() {
	let harness = Harness::new();
	let slot = Slot::default();
	let component = exposed("Target", &slot, || C::Null);
	harness.render(E::build(&component));
	let ctx = take(&slot);

	let calls = Counter::default();
	ctx.add_event_listener(
		"ping",
		{
			let calls = calls.clone();
			move |_: &Event| {
				calls.bump();
			}
		},
		ListenerOptions::default(),
	);
	ctx.dispatch_event(&Event::new("ping"));
	harness.render(C::Null);
	ctx.dispatch_event(&Event::new("ping"));
	assert_eq!(calls.get(), 1);
	assert!(ctx.is_unmounted());
}

#[test]
fn listeners_follow_the_rendered_nodes() {
	let harness = Harness::new();
	let log = Log::default();
	let slot = Slot::default();
	let tag = Rc::new(Cell::new("button"));
	let clickable = {
		let tag = tag.clone();
		exposed("Clickable", &slot, move || E::build(tag.get()).child(E::build("b")).into())
	};

	harness.render(E::build("div").child(E::build(&clickable)));
	let ctx = take(&slot);
	let id = ctx.add_event_listener(
		"click",
		{
			let log = log.clone();
			move |event: &Event| log.push(format!("{:?}", event.phase()))
		},
		ListenerOptions::default(),
	);

	let button = harness.root.children()[0].children()[0].clone();
	assert!(button.children()[0].dispatch_event(&Event::new("click")));
	assert_eq!(log.entries(), ["Bubbling"]);

	tag.set("a");
	assert!(!ctx.refresh().is_pending());
	let link = harness.root.children()[0].children()[0].clone();
	assert_eq!(link.tag(), Some("a"));
	button.dispatch_event(&Event::new("click"));
	link.dispatch_event(&Event::new("click"));
	assert_eq!(log.entries(), ["Bubbling", "AtTarget"]);

	assert!(ctx.remove_event_listener(id));
	link.dispatch_event(&Event::new("click"));
	assert_eq!(log.entries().len(), 2);
}

#[test]
fn listeners_added_while_rendering_are_attached_on_commit() {
	let harness = Harness::new();
	let form: Component<Html> = Component::generator("Form", |ctx: &Context<Html>, _props: &Props| {
		ctx.add_event_listener("submit", Event::prevent_default, ListenerOptions::default());
		|_ctx: &Context<Html>, _previous: Value<HtmlNode>| -> Result<Step<Html>, Error> { Ok(Step::Yield(E::build("form").into())) }
	});

	harness.render(E::build(&form));
	let node = harness.root.children()[0].clone();
	assert!(!node.dispatch_event(&Event::new("submit")));

	harness.render(C::Null);
	assert!(node.dispatch_event(&Event::new("submit")));
}

#[test]
fn once_listeners_detach_from_nodes() {
	let harness = Harness::new();
	let slot = Slot::default();
	let component = exposed("Button", &slot, || E::build("button").into());
	harness.render(E::build(&component));
	let ctx = take(&slot);

	let calls = Counter::default();
	ctx.add_event_listener(
		"click",
		{
			let calls = calls.clone();
			move |_: &Event| {
				calls.bump();
			}
		},
		ListenerOptions::once(),
	);
	let button = harness.root.children()[0].clone();
	button.dispatch_event(&Event::new("click"));
	button.dispatch_event(&Event::new("click"));
	ctx.dispatch_event(&Event::new("click"));
	assert_eq!(calls.get(), 1);
}

#[test]
fn schedule_after_and_cleanup() {
	let harness = Harness::new();
	let log = Log::default();
	let component: Component<Html> = Component::generator("Lifecycle", {
		let log = log.clone();
		move |ctx: &Context<Html>, _props: &Props| {
			let cleanup_log = log.clone();
			ctx.cleanup(move |value| cleanup_log.push(format!("cleanup {}", value.node().and_then(HtmlNode::tag).unwrap_or("-"))));
			let log = log.clone();
			move |ctx: &Context<Html>, _previous: Value<HtmlNode>| -> Result<Step<Html>, Error> {
				let (schedule_log, after_log) = (log.clone(), log.clone());
				ctx.schedule(move |value| schedule_log.push(format!("schedule {}", value.node().and_then(HtmlNode::tag).unwrap_or("-"))));
				ctx.after(move |value| {
					let attached = value.node().and_then(HtmlNode::parent).is_some();
					after_log.push(format!("after attached={attached}"));
				});
				Ok(Step::Yield(E::build("div").into()))
			}
		}
	});

	harness.render(E::build(&component));
	assert_eq!(log.entries(), ["schedule div", "after attached=true"]);

	harness.render(E::build(&component));
	assert_eq!(log.entries().len(), 4);

	harness.render(C::Null);
	harness.render(C::Null);
	assert_eq!(log.entries()[4..], ["cleanup div"]);
}

#[test]
fn cleanup_runs_once_per_instance() {
	let harness = Harness::new();
	let log = Log::default();
	let item: Component<Html> = Component::generator("Item", {
		let log = log.clone();
		move |ctx: &Context<Html>, props: &Props| {
			let name = props.get_str("name").unwrap_or_default().to_owned();
			let log = log.clone();
			ctx.cleanup(move |_| log.push(format!("cleanup {name}")));
			|_ctx: &Context<Html>, _previous: Value<HtmlNode>| -> Result<Step<Html>, Error> { Ok(Step::Yield(E::build("i").into())) }
		}
	});
	let items = |names: &[&str]| {
		E::build("div")
			.children(names.iter().map(|name| C::from(E::build(&item).key(*name).prop("name", *name))).collect::<C>())
			.build()
	};

	harness.render(items(&["a", "b"]));
	assert!(log.entries().is_empty());

	harness.render(items(&["b"]));
	assert_eq!(log.entries(), ["cleanup a"]);

	harness.render(items(&["a", "b"]));
	harness.render(items(&["b", "a"]));
	assert_eq!(log.entries(), ["cleanup a"]);
	assert_eq!(harness.html(), "<div><i></i><i></i></div>");

	harness.render(C::Null);
	let mut entries = log.entries();
	entries.sort();
	assert_eq!(entries, ["cleanup a", "cleanup a", "cleanup b"]);
}

#[test]
fn cleanup_after_unmount_runs_immediately() {
	let harness = Harness::new();
	let slot = Slot::default();
	let component = exposed("Gone", &slot, || C::Null);
	harness.render(E::build(&component));
	let ctx = take(&slot);
	harness.render(C::Null);

	let calls = Counter::default();
	ctx.cleanup({
		let calls = calls.clone();
		move |_| {
			calls.bump();
		}
	});
	assert_eq!(calls.get(), 1);
}

#[test]
fn async_cleanup_keeps_nodes_until_done() {
	let mut harness = Harness::new();
	let gate = Gate::new();
	let fading: Component<Html> = Component::generator("Fading", {
		let gate = gate.clone();
		move |ctx: &Context<Html>, _props: &Props| {
			let gate = gate.clone();
			ctx.cleanup_async(move |_| gate.wait());
			|_ctx: &Context<Html>, _previous: Value<HtmlNode>| -> Result<Step<Html>, Error> { Ok(Step::Yield(E::build("span").into())) }
		}
	});

	harness.render(E::build("div").children(vec![C::from(E::build(&fading).key("fading")), C::from(E::build("b").key("b"))]));
	assert_eq!(harness.html(), "<div><span></span><b></b></div>");

	harness.render(E::build("div").children(vec![C::from(E::build("b").key("b"))]));
	assert_eq!(harness.html(), "<div><span></span><b></b></div>");

	gate.open();
	harness.settle();
	assert_eq!(harness.html(), "<div><b></b></div>");
}

#[test]
fn refresh_rerenders_in_place() {
	let harness = Harness::new();
	let slot = Slot::default();
	let clicks = Rc::new(RefCell::new(1_usize));
	let counter = {
		let clicks = clicks.clone();
		exposed("Clicks", &slot, move || (0..*clicks.borrow()).map(|_| C::from(E::build("i"))).collect())
	};

	harness.render(E::build("p").children(vec![C::from(E::build(&counter)), C::from("tail")]));
	assert_eq!(harness.html(), "<p><i></i>tail</p>");
	let ctx = take(&slot);

	*clicks.borrow_mut() = 3;
	let value = ctx.refresh().now().unwrap().unwrap();
	assert_eq!(harness.html(), "<p><i></i><i></i><i></i>tail</p>");
	assert_eq!(value.into_nodes().len(), 3);

	*clicks.borrow_mut() = 0;
	assert!(!ctx.refresh().is_pending());
	assert_eq!(harness.html(), "<p>tail</p>");
}

#[test]
fn refresh_after_unmount_does_nothing() {
	let harness = Harness::new();
	let slot = Slot::default();
	let runs = Counter::default();
	let component = {
		let runs = runs.clone();
		exposed("Gone", &slot, move || {
			runs.bump();
			C::Null
		})
	};
	harness.render(E::build(&component));
	let ctx = take(&slot);
	harness.render(C::Null);

	let outcome = ctx.refresh();
	assert!(!outcome.is_pending());
	assert!(matches!(outcome.now(), Some(Ok(value)) if value.is_empty()));
	assert_eq!(runs.get(), 1);
}
