use cambium::{Child, Component, Context, Error, PropSelector, Props, RawValue, Value};
use std::{
	io,
	sync::{Arc, Mutex},
};

mod harness_;
use harness_::{Gate, Harness, Html, C, E};

/// An async component that renders `text` once `gate` opens.
fn late(gate: &Gate, text: &'static str) -> Component<Html> {
	let gate = gate.clone();
	Component::future("Late", move |_ctx: &Context<Html>, _props: &Props| {
		let wait = gate.wait();
		async move {
			wait.await;
			Ok::<_, Error>(C::from(text))
		}
	})
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.lock().unwrap().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

fn list(keys: &[&str]) -> E {
	E::build("ul")
		.children(keys.iter().map(|key| C::from(E::build("li").key(*key).child(*key))).collect::<C>())
		.build()
}

#[test]
fn text_numbers_and_holes() {
	let harness = Harness::new();
	let rendered = harness.render(E::build("p").children(vec![C::from("a"), C::from(1), C::from(true), C::Null, C::from(2.5)]));
	assert!(!rendered.is_pending());
	assert_eq!(harness.html(), "<p>a12.5</p>");
}

#[test]
fn nested_lists_become_fragments() {
	let harness = Harness::new();
	harness.render(E::build("div").children(vec![C::from("a"), C::List(vec![C::from("b"), C::from("c")]), C::from("d")]));
	assert_eq!(harness.html(), "<div>abcd</div>");

	harness.render(E::build("div").children(vec![C::from("a"), C::List(vec![]), C::from("d")]));
	assert_eq!(harness.html(), "<div>ad</div>");
}

#[test]
fn props_are_patched() {
	let harness = Harness::new();
	harness.render(E::build("a").prop("href", "/x").prop("hidden", true).prop("tabindex", 1));
	assert_eq!(harness.html(), r#"<a hidden href="/x" tabindex="1"></a>"#);
	let node = harness.root.children()[0].clone();

	harness.render(E::build("a").prop("href", "/y").prop("hidden", false));
	assert_eq!(harness.html(), r#"<a href="/y"></a>"#);
	assert_eq!(harness.root.children()[0], node);
}

#[test]
fn keyed_children_keep_their_nodes() {
	let harness = Harness::new();
	harness.render(list(&["a", "b", "c"]));
	let ul = harness.root.children()[0].clone();
	let before = ul.children();

	harness.render(list(&["c", "a", "b"]));
	assert_eq!(harness.html(), "<ul><li>c</li><li>a</li><li>b</li></ul>");
	let after = ul.children();
	assert_eq!(after, vec![before[2].clone(), before[0].clone(), before[1].clone()]);

	harness.render(list(&["b", "d"]));
	assert_eq!(harness.html(), "<ul><li>b</li><li>d</li></ul>");
	assert_eq!(ul.children()[0], before[1]);
	assert!(before[0].parent().is_none());
	assert!(before[2].parent().is_none());
}

#[test]
fn unkeyed_children_skip_keyed_ones() {
	let harness = Harness::new();
	harness.render(E::build("div").children(vec![C::from(E::build("span").key("k").child("keyed")), C::from(E::build("span").child("plain"))]));
	let plain = harness.root.children()[0].children()[1].clone();

	harness.render(E::build("div").children(vec![C::from(E::build("span").child("plain"))]));
	assert_eq!(harness.html(), "<div><span>plain</span></div>");
	assert_eq!(harness.root.children()[0].children()[0], plain);
}

#[test]
fn duplicate_keys_are_treated_as_unkeyed() {
	let harness = Harness::new();
	harness.render(list(&["a", "a", "b"]));
	assert_eq!(harness.html(), "<ul><li>a</li><li>a</li><li>b</li></ul>");
}

#[test]
fn duplicate_keys_are_logged_without_content() {
	let capture = Capture::default();
	let subscriber = tracing_subscriber::fmt()
		.with_ansi(false)
		.with_max_level(tracing::Level::ERROR)
		.with_writer({
			let capture = capture.clone();
			move || capture.clone()
		})
		.finish();

	let harness = Harness::new();
	tracing::subscriber::with_default(subscriber, || {
		harness.render(E::build("ul").children(vec![C::from(E::build("li").key("private")), C::from(E::build("li").key("private"))]));
	});

	let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
	assert!(logs.contains("Duplicate key"));
	assert_eq!(logs.contains("private"), cfg!(feature = "dangerous-logging"));
}

#[test]
fn replaced_output_stays_until_the_replacement_settles() {
	let mut harness = Harness::new();
	let gate = Gate::new();
	let late = late(&gate, "new");

	harness.render(E::build("div").child(E::build("span").child("old")));
	let span = harness.root.children()[0].children()[0].clone();

	let rendered = harness.render(E::build("div").child(E::build(&late)));
	assert!(rendered.is_pending());
	assert_eq!(harness.html(), "<div><span>old</span></div>");
	assert_eq!(harness.root.children()[0].children(), [span.clone()]);

	gate.open();
	harness.settle();
	assert!(matches!(rendered.now(), Some(Ok(_))));
	assert_eq!(harness.html(), "<div>new</div>");
	assert!(span.parent().is_none());
}

#[test]
fn pending_replacements_can_be_undone() {
	let mut harness = Harness::new();
	let gate = Gate::new();
	let late = late(&gate, "new");

	harness.render(E::build("div").child(E::build("span").child("old")));
	let span = harness.root.children()[0].children()[0].clone();

	harness.render(E::build("div").child(E::build(&late)));
	assert_eq!(harness.html(), "<div><span>old</span></div>");

	harness.render(E::build("div").child(E::build("span").child("again")));
	assert_eq!(harness.html(), "<div><span>again</span></div>");
	assert_eq!(harness.root.children()[0].children(), [span.clone()]);

	gate.open();
	harness.settle();
	assert_eq!(harness.html(), "<div><span>again</span></div>");
	assert_eq!(harness.root.children()[0].children(), [span]);
}

#[test]
fn tag_change_replaces_the_node() {
	let harness = Harness::new();
	harness.render(E::build("div").child("x"));
	let div = harness.root.children()[0].clone();

	harness.render(E::build("span").child("x"));
	assert_eq!(harness.html(), "<span>x</span>");
	assert!(div.parent().is_none());
}

#[test]
fn copy_keeps_what_was_there() {
	let harness = Harness::new();
	harness.render(E::build("div").children(vec![C::from(E::build("b").child("kept")), C::from("changing")]));
	let b = harness.root.children()[0].children()[0].clone();

	harness.render(E::build("div").children(vec![C::from(E::copy()), C::from("changed")]));
	assert_eq!(harness.html(), "<div><b>kept</b>changed</div>");
	assert_eq!(harness.root.children()[0].children()[0], b);

	harness.render(E::build("div").children(vec![C::from(E::build("i").child("new")), C::from("changed")]));
	assert_eq!(harness.html(), "<div><i>new</i>changed</div>");
}

#[test]
fn copy_in_an_empty_slot_renders_nothing() {
	let harness = Harness::new();
	harness.render(E::build("div").child(E::copy()));
	assert_eq!(harness.html(), "<div></div>");
}

#[test]
fn same_element_is_skipped() {
	let harness = Harness::new();
	let element = E::build("em").child("static").build();
	harness.render(E::build("div").children(vec![C::from(element.clone()), C::from("1")]));
	let em = harness.root.children()[0].children()[0].clone();

	harness.render(E::build("div").children(vec![C::from(element), C::from("2")]));
	assert_eq!(harness.html(), "<div><em>static</em>2</div>");
	assert_eq!(harness.root.children()[0].children()[0], em);
}

#[test]
fn copy_selected_props() {
	let harness = Harness::new();
	harness.render(E::build("input").prop("value", "typed").prop("class", "a"));

	harness.render(
		E::build("input")
			.prop("value", "reset")
			.prop("class", "b")
			.copy(PropSelector::parse("value").unwrap()),
	);
	assert_eq!(harness.html(), r#"<input class="b" value="typed">"#);

	harness.render(E::build("input").prop("value", "reset").prop("class", "c").copy(true));
	assert_eq!(harness.html(), r#"<input class="b" value="typed">"#);
}

#[test]
fn inner_html_owns_the_children() {
	let harness = Harness::new();
	harness.render(E::build("div").child("child"));
	harness.render(E::build("div").prop("innerHTML", "<i>raw</i>").child("ignored"));
	assert_eq!(harness.html(), "<div><i>raw</i></div>");

	harness.render(E::build("div").child("back"));
	assert_eq!(harness.html(), "<div>back</div>");
}

#[test]
fn raw_markup() {
	let harness = Harness::new();
	harness.render(E::build("div").child(E::raw(RawValue::Markup("<hr>".into()))));
	assert_eq!(harness.html(), "<div><hr></div>");
}

#[test]
fn node_refs_fire_once() {
	let harness = Harness::new();
	let seen = harness_::Log::default();
	let element = |seen: &harness_::Log| {
		let seen = seen.clone();
		E::build("div").node_ref(move |value: &Value<_>| seen.push(value.node().and_then(|node| node.tag().map(str::to_owned)).unwrap_or_default()))
	};

	harness.render(element(&seen));
	harness.render(element(&seen));
	assert_eq!(seen.entries(), ["div"]);
}

#[test]
fn render_value_and_unmount() {
	let harness = Harness::new();
	let value = harness.render(vec![C::from(E::build("a")), C::from(E::build("b"))]).now().unwrap().unwrap();
	assert!(matches!(value, Value::Nodes(nodes) if nodes.len() == 2));

	let value = harness.render(Child::Null).now().unwrap().unwrap();
	assert_eq!(value, Value::Empty);
	assert_eq!(harness.html(), "");
}

#[test]
fn svg_namespace() {
	let harness = Harness::new();
	harness.render(E::build("svg").child(E::build("circle")));
	let svg = harness.root.children()[0].clone();
	assert_eq!(svg.namespace(), Some(cambium::Namespace::Svg));
	assert_eq!(svg.children()[0].namespace(), Some(cambium::Namespace::Svg));
}
