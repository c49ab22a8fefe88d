use cambium::{html::HtmlNode, Component, PropSelector};

mod harness_;
use harness_::{Harness, Html, C, E};

/// `<div id="app"><p>hello</p></div>`, as a server would have rendered it.
fn prerendered(harness: &Harness) -> (HtmlNode, HtmlNode, HtmlNode) {
	let div = HtmlNode::element("div");
	div.set_attribute("id", "app");
	let p = HtmlNode::element("p");
	let text = HtmlNode::text("hello");
	p.set_children(&[text.clone()]);
	div.set_children(&[p.clone()]);
	harness.root.set_children(&[div.clone()]);
	(div, p, text)
}

fn app(text: &str) -> E {
	E::build("div").prop("id", "app").child(E::build("p").child(text)).build()
}

#[test]
fn hydration_adopts_existing_nodes() {
	let harness = Harness::new();
	let (div, p, text) = prerendered(&harness);

	let rendered = harness.renderer.hydrate(app("hello"), &harness.root);
	assert!(matches!(rendered.now(), Some(Ok(_))));
	assert_eq!(harness.html(), r#"<div id="app"><p>hello</p></div>"#);
	assert_eq!(harness.root.children(), [div.clone()]);
	assert_eq!(div.children(), [p.clone()]);
	assert_eq!(p.children(), [text.clone()]);

	harness.render(app("goodbye"));
	assert_eq!(harness.html(), r#"<div id="app"><p>goodbye</p></div>"#);
	assert_eq!(p.children(), [text]);
}

#[test]
fn mismatched_content_is_patched() {
	let harness = Harness::new();
	let (div, _, text) = prerendered(&harness);

	harness
		.renderer
		.hydrate(E::build("div").prop("id", "app").prop("class", "main").child(E::build("p").child("changed")), &harness.root);
	assert_eq!(harness.html(), r#"<div class="main" id="app"><p>changed</p></div>"#);
	assert_eq!(harness.root.children(), [div]);
	assert_eq!(text.text_content(), "changed");
}

#[test]
fn components_hydrate_their_children() {
	let harness = Harness::new();
	let (div, p, _) = prerendered(&harness);
	let inner: Component<Html> = Component::function("Inner", |_ctx, _props| Ok(E::build("p").child("hello").into()));

	harness.renderer.hydrate(E::build("div").prop("id", "app").child(E::build(&inner)), &harness.root);
	assert_eq!(harness.root.children(), [div.clone()]);
	assert_eq!(div.children(), [p]);
}

#[test]
fn hydrate_false_replaces_the_node() {
	let harness = Harness::new();
	let (div, _, _) = prerendered(&harness);

	harness
		.renderer
		.hydrate(E::build("div").prop("id", "app").hydrate(PropSelector::Nothing).child(C::from("fresh")), &harness.root);
	assert_eq!(harness.html(), r#"<div id="app">fresh</div>"#);
	assert_ne!(harness.root.children(), [div.clone()]);
	assert!(div.parent().is_none());
}

#[test]
fn missing_nodes_are_created() {
	let harness = Harness::new();
	let (div, _, _) = prerendered(&harness);

	harness.renderer.hydrate(vec![C::from(app("hello")), C::from(E::build("footer"))], &harness.root);
	assert_eq!(harness.html(), r#"<div id="app"><p>hello</p></div><footer></footer>"#);
	assert_eq!(harness.root.children()[0], div);
}
