use cambium::{html::HtmlNode, Component, Context, Props};

mod harness_;
use harness_::{Harness, Html, C, E};

#[test]
fn portal_renders_elsewhere() {
	let harness = Harness::new();
	let overlay = HtmlNode::element("aside");

	harness.render(E::build("main").child(E::portal(overlay.clone(), E::build("p").child("over"))));
	assert_eq!(harness.html(), "<main></main>");
	assert_eq!(overlay.inner_html(), "<p>over</p>");
	let p = overlay.children()[0].clone();

	harness.render(E::build("main").child(E::portal(overlay.clone(), E::build("p").child("still over"))));
	assert_eq!(overlay.inner_html(), "<p>still over</p>");
	assert_eq!(overlay.children()[0], p);

	harness.render(C::Null);
	assert_eq!(overlay.inner_html(), "");
}

#[test]
fn portal_root_can_change() {
	let harness = Harness::new();
	let (first, second) = (HtmlNode::element("aside"), HtmlNode::element("aside"));

	harness.render(E::portal(first.clone(), "moving"));
	assert_eq!(first.inner_html(), "moving");

	harness.render(E::portal(second.clone(), "moving"));
	assert_eq!(first.inner_html(), "");
	assert_eq!(second.inner_html(), "moving");
}

#[test]
fn context_reaches_through_portals() {
	let harness = Harness::new();
	let overlay = HtmlNode::element("aside");
	let consumer: Component<Html> = Component::function("Consumer", |ctx, _props| Ok(C::from(ctx.consume::<&'static str>("label").unwrap_or("none"))));
	let provider: Component<Html> = Component::function("Provider", {
		let overlay = overlay.clone();
		move |ctx: &Context<Html>, _props: &Props| {
			ctx.provide("label", "provided");
			Ok(E::portal(overlay.clone(), E::build(&consumer)).into())
		}
	});

	harness.render(E::build(&provider));
	assert_eq!(harness.html(), "");
	assert_eq!(overlay.inner_html(), "provided");
}

#[test]
fn portals_into_separate_roots_are_independent() {
	let harness = Harness::new();
	let other = HtmlNode::element("body");

	harness.render(E::build("p").child("main"));
	harness.renderer.render(E::build("p").child("other"), &other);
	assert_eq!(harness.html(), "<p>main</p>");
	assert_eq!(other.inner_html(), "<p>other</p>");

	harness.render(C::Null);
	assert_eq!(harness.html(), "");
	assert_eq!(other.inner_html(), "<p>other</p>");
}
