// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2018-2026 Meridian Systems Pty Ltd. All rights reserved.
//  https://meridian.systems
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Message handler functionality for the message bus.
//!
//! Handlers are synchronous one-argument callables identified by a unique
//! [`Ustr`] id. Identity survives closure capture: two equivalent closures
//! receive distinct generated ids unless the caller supplies an explicit one.

use std::{
    any::{Any, type_name},
    fmt::Debug,
    marker::PhantomData,
    rc::Rc,
};

use meridian_core::UUID4;
use ustr::Ustr;

/// A handler for messages dispatched by the message bus.
pub trait MessageHandler: Any {
    /// Returns the unique identifier for this handler.
    fn id(&self) -> Ustr;
    /// Handles a message of any type.
    fn handle(&self, message: &dyn Any);
    /// Returns this handler as an [`Any`] trait object.
    fn as_any(&self) -> &dyn Any;
}

/// A handler which downcasts messages to `T` before forwarding to a callback.
///
/// Messages of any other concrete type are logged and dropped.
#[derive(Debug)]
pub struct TypedMessageHandler<T: 'static + ?Sized, F: Fn(&T) + 'static> {
    id: Ustr,
    callback: F,
    _phantom: PhantomData<T>,
}

impl<T: 'static, F: Fn(&T) + 'static> TypedMessageHandler<T, F> {
    /// Creates a new handler, generating an id when none is given.
    pub fn new<S: AsRef<str>>(id: Option<S>, callback: F) -> Self {
        let id = id.map_or_else(
            || generate_handler_id(&callback),
            |s| Ustr::from(s.as_ref()),
        );

        Self {
            id,
            callback,
            _phantom: PhantomData,
        }
    }

    /// Creates a new handler with an auto-generated id.
    pub fn from(callback: F) -> Self {
        Self::new::<&str>(None, callback)
    }
}

impl<T: 'static, F: Fn(&T) + 'static> MessageHandler for TypedMessageHandler<T, F> {
    fn id(&self) -> Ustr {
        self.id
    }

    fn handle(&self, message: &dyn Any) {
        if let Some(typed) = message.downcast_ref::<T>() {
            (self.callback)(typed);
        } else {
            log::error!("Expected message of type {}", type_name::<T>());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<F: Fn(&dyn Any) + 'static> TypedMessageHandler<dyn Any, F> {
    /// Creates a new handler for dynamic messages, generating an id when none
    /// is given.
    pub fn new_any<S: AsRef<str>>(id: Option<S>, callback: F) -> Self {
        let id = id.map_or_else(
            || generate_handler_id(&callback),
            |s| Ustr::from(s.as_ref()),
        );

        Self {
            id,
            callback,
            _phantom: PhantomData,
        }
    }

    /// Creates a new handler for dynamic messages with an auto-generated id.
    pub fn with_any(callback: F) -> Self {
        Self::new_any::<&str>(None, callback)
    }
}

impl<F: Fn(&dyn Any) + 'static> MessageHandler for TypedMessageHandler<dyn Any, F> {
    fn id(&self) -> Ustr {
        self.id
    }

    fn handle(&self, message: &dyn Any) {
        (self.callback)(message);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn generate_handler_id<T: 'static + ?Sized, F: 'static + Fn(&T)>(callback: &F) -> Ustr {
    let callback_ptr = std::ptr::from_ref(callback);
    Ustr::from(&format!("<{callback_ptr:?}>-{}", UUID4::new()))
}

/// A shareable handle to a [`MessageHandler`].
///
/// Holds an `Rc` rather than an `Arc`: handlers are designed for
/// single-threaded use within the owning thread's message bus.
#[repr(transparent)]
#[derive(Clone)]
pub struct ShareableMessageHandler(pub Rc<dyn MessageHandler>);

impl ShareableMessageHandler {
    /// Returns the unique identifier for the underlying handler.
    #[must_use]
    pub fn id(&self) -> Ustr {
        self.0.id()
    }
}

impl PartialEq for ShareableMessageHandler {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ShareableMessageHandler {}

impl Debug for ShareableMessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ShareableMessageHandler))
            .field("id", &self.0.id())
            .finish()
    }
}

impl From<Rc<dyn MessageHandler>> for ShareableMessageHandler {
    fn from(value: Rc<dyn MessageHandler>) -> Self {
        Self(value)
    }
}
