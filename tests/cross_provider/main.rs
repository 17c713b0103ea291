//! Adapters against a mock vendor: request shape, stream decoding, transport behavior.

mod function_calling_e2e;
mod providers;
mod stream_behavior;
