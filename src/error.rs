use std::{error::Error as StdError, fmt::Display, rc::Rc};
use thiserror::Error;

/// Everything that can go wrong while rendering.
///
/// Cheap to clone, since pending renders share their outcome between every awaiting caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// Raised by a component body (or anything it awaited).
	#[error("component error: {0}")]
	Component(Rc<dyn StdError>),

	/// A free-form error, usually raised by a component body through [`Error::msg`].
	#[error("{0}")]
	Message(Rc<str>),

	/// A generator component pulled props twice within the same resumption.
	#[error("context iterated twice without a yield")]
	DoubleIteration,

	/// A component switched calling conventions between invocations.
	#[error("component `{name}` changed from {from} to {to}")]
	KindMismatch { name: Rc<str>, from: &'static str, to: &'static str },

	/// The targeted component is no longer part of any tree.
	#[error("component is unmounted")]
	Unmounted,

	/// The targeted component is running its body right now.
	#[error("component is already executing")]
	AlreadyExecuting,

	/// The output adapter could not apply a mutation.
	#[error("adapter error: {0}")]
	Adapter(Rc<str>),

	/// Pending work could not be handed to the spawner.
	#[error("failed to spawn pending work: {0}")]
	Spawn(Rc<str>),
}

impl Error {
	pub fn msg(message: impl Display) -> Self {
		Self::Message(message.to_string().into())
	}

	pub fn component(error: impl StdError + 'static) -> Self {
		Self::Component(Rc::new(error))
	}

	pub fn adapter(message: impl Display) -> Self {
		Self::Adapter(message.to_string().into())
	}
}
