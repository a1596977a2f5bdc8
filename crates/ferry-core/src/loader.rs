// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Contracts for the collaborators the pipeline invokes but does not implement.
//!
//! - [`Loader`] runs on worker threads: locator in, plain payload out.
//! - [`Decoder`] is the bytes-to-payload half of a loader, for loaders that
//!   separate reading from decoding.
//! - [`Finalize`] runs on the owning thread only and is the one place where
//!   payloads become context-bound resources.

use crate::context::ContextToken;
use crate::error::LoadError;
use crate::request::Locator;
use std::error::Error;
use std::marker::PhantomData;

/// Turns a locator into a payload. This is the "data plane" part of loading.
///
/// Implementors do the potentially slow work (I/O, parsing, decoding) and are
/// called concurrently from every worker thread. They must not touch the
/// exclusive context; the absence of a [`ContextToken`] parameter enforces it.
///
/// Any `Fn(&Locator) -> Result<P, LoadError>` closure that is `Send + Sync`
/// is a loader.
pub trait Loader<P>: Send + Sync + 'static {
    /// Loads the resource named by `locator`.
    fn load(&self, locator: &Locator) -> Result<P, LoadError>;
}

impl<P, F> Loader<P> for F
where
    F: Fn(&Locator) -> Result<P, LoadError> + Send + Sync + 'static,
{
    fn load(&self, locator: &Locator) -> Result<P, LoadError> {
        self(locator)
    }
}

/// Parses raw bytes into a payload of type `P`.
///
/// Each decoder is specialized for a single payload type. The error must be
/// thread-safe because decoding happens on worker threads.
pub trait Decoder<P>: Send + Sync + 'static {
    /// Decodes `bytes` into a payload.
    fn decode(&self, bytes: &[u8]) -> Result<P, Box<dyn Error + Send + Sync>>;
}

impl<P, F> Decoder<P> for F
where
    F: Fn(&[u8]) -> Result<P, Box<dyn Error + Send + Sync>> + Send + Sync + 'static,
{
    fn decode(&self, bytes: &[u8]) -> Result<P, Box<dyn Error + Send + Sync>> {
        self(bytes)
    }
}

/// Turns a payload into a resource bound to the exclusive context.
///
/// Only reachable through [`ExclusiveContext::finalize`](crate::ExclusiveContext::finalize),
/// which supplies the token of the owning thread.
pub trait Finalize<P> {
    /// The exclusive context the resource is created in.
    type Context;
    /// What the payload becomes, e.g. a texture handle.
    type Resource;

    /// Creates the context-bound resource for `payload`.
    fn finalize(
        &mut self,
        token: &ContextToken,
        context: &mut Self::Context,
        payload: P,
    ) -> Self::Resource;
}

/// [`Finalize`] implementation backed by a closure. Built by [`finalize_fn`].
pub struct FinalizeFn<F, C, R> {
    f: F,
    _marker: PhantomData<fn(&mut C) -> R>,
}

/// Adapts a closure into a [`Finalize`] implementation.
pub fn finalize_fn<C, P, R, F>(f: F) -> FinalizeFn<F, C, R>
where
    F: FnMut(&ContextToken, &mut C, P) -> R,
{
    FinalizeFn {
        f,
        _marker: PhantomData,
    }
}

impl<P, C, R, F> Finalize<P> for FinalizeFn<F, C, R>
where
    F: FnMut(&ContextToken, &mut C, P) -> R,
{
    type Context = C;
    type Resource = R;

    fn finalize(&mut self, token: &ContextToken, context: &mut C, payload: P) -> R {
        (self.f)(token, context, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Decoder<String> for Upper {
        fn decode(&self, bytes: &[u8]) -> Result<String, Box<dyn Error + Send + Sync>> {
            Ok(std::str::from_utf8(bytes)?.to_uppercase())
        }
    }

    #[test]
    fn closures_are_loaders() {
        let loader = |locator: &Locator| -> Result<usize, LoadError> {
            match locator.as_str() {
                "missing" => Err(LoadError::not_found(locator)),
                other => Ok(other.len()),
            }
        };
        assert_eq!(loader.load(&Locator::from("four")), Ok(4));
        assert!(loader.load(&Locator::from("missing")).is_err());
    }

    #[test]
    fn decoders_report_errors() {
        assert_eq!(Upper.decode(b"abc").ok(), Some("ABC".to_string()));
        assert!(Upper.decode(&[0xff, 0xfe]).is_err());

        let length = |bytes: &[u8]| -> Result<usize, Box<dyn Error + Send + Sync>> {
            Ok(bytes.len())
        };
        assert_eq!(length.decode(b"12345").ok(), Some(5));
    }
}
