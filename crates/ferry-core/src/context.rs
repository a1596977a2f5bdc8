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

//! Thread affinity of the exclusive context.
//!
//! A rendering context (or any other resource that must only be used from one
//! thread) is wrapped in an [`ExclusiveContext`]. The wrapper remembers the
//! thread that created it and hands out a [`ContextToken`] as proof of being on
//! that thread. Both types are `!Send` and `!Sync`, so neither can be moved or
//! shared into a worker thread: using the context off its thread is rejected
//! by the compiler rather than detected at runtime.
//!
//! ```compile_fail
//! use ferry_core::ExclusiveContext;
//!
//! let context = ExclusiveContext::new(0u32);
//! // error: `*const ()` cannot be sent between threads safely
//! std::thread::spawn(move || drop(context));
//! ```

use crate::loader::Finalize;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

/// Capability proving that the holder runs on the thread that owns the
/// exclusive context.
///
/// It can only be borrowed from an [`ExclusiveContext`], and it cannot leave
/// that thread.
#[derive(Debug)]
pub struct ContextToken {
    owner: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl ContextToken {
    fn bind_current_thread() -> Self {
        Self {
            owner: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    /// The thread the context is bound to.
    pub fn owner_thread(&self) -> ThreadId {
        self.owner
    }

    /// Checks, in debug builds only, that the caller is the owning thread.
    ///
    /// The type system already makes the failure unreachable from safe code;
    /// release builds pay nothing for it.
    #[inline]
    pub fn debug_assert_owner(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "exclusive context used off its owning thread"
        );
    }
}

/// Owns a context that may only be used by the thread that created it.
#[derive(Debug)]
pub struct ExclusiveContext<C> {
    inner: C,
    token: ContextToken,
}

impl<C> ExclusiveContext<C> {
    /// Binds `inner` to the calling thread.
    pub fn new(inner: C) -> Self {
        let token = ContextToken::bind_current_thread();
        log::debug!(
            "ExclusiveContext bound to thread {:?}.",
            token.owner_thread()
        );
        Self { inner, token }
    }

    /// The capability for the owning thread.
    pub fn token(&self) -> &ContextToken {
        &self.token
    }

    /// The thread the context is bound to.
    pub fn owner_thread(&self) -> ThreadId {
        self.token.owner
    }

    /// Shared access to the wrapped context.
    pub fn get(&self) -> &C {
        &self.inner
    }

    /// Exclusive access to the wrapped context.
    pub fn get_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    /// Runs `f` with the token and the context.
    pub fn with<R>(&mut self, f: impl FnOnce(&ContextToken, &mut C) -> R) -> R {
        self.token.debug_assert_owner();
        f(&self.token, &mut self.inner)
    }

    /// Turns a payload into a context-bound resource.
    pub fn finalize<P, F>(&mut self, finalizer: &mut F, payload: P) -> F::Resource
    where
        F: Finalize<P, Context = C>,
    {
        self.token.debug_assert_owner();
        finalizer.finalize(&self.token, &mut self.inner, payload)
    }

    /// Releases the wrapped context.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::finalize_fn;

    #[test]
    fn token_is_bound_to_the_creating_thread() {
        let context = ExclusiveContext::new(Vec::<u32>::new());
        assert_eq!(context.owner_thread(), thread::current().id());
        assert_eq!(context.token().owner_thread(), thread::current().id());
        context.token().debug_assert_owner();
    }

    #[test]
    fn finalize_runs_with_the_context() {
        let mut context = ExclusiveContext::new(Vec::<u32>::new());
        let mut upload = finalize_fn(|token: &ContextToken, gpu: &mut Vec<u32>, value: u32| {
            token.debug_assert_owner();
            gpu.push(value);
            gpu.len() - 1
        });

        assert_eq!(context.finalize(&mut upload, 10), 0);
        assert_eq!(context.finalize(&mut upload, 20), 1);
        assert_eq!(context.get(), &vec![10, 20]);

        let sum = context.with(|_, gpu| gpu.iter().sum::<u32>());
        assert_eq!(sum, 30);
        assert_eq!(context.into_inner(), vec![10, 20]);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn debug_assert_owner_fires_on_a_foreign_thread() {
        // Built by hand: safe code cannot move a real token across threads.
        let owner = thread::current().id();
        let outcome = thread::spawn(move || {
            std::panic::catch_unwind(|| {
                let token = ContextToken {
                    owner,
                    _not_send: PhantomData,
                };
                token.debug_assert_owner();
            })
            .is_err()
        })
        .join()
        .expect("foreign thread panicked");
        assert!(outcome);
    }
}
