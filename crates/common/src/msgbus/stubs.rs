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

//! Stub handlers, sinks, and serializers for testing scenarios.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::Rc,
};

use bytes::Bytes;
use meridian_core::UUID4;
use serde::{Deserialize, Serialize};
use ustr::Ustr;

use super::{
    database::MessageBusDatabase,
    handler::{MessageHandler, ShareableMessageHandler},
    message::BusMessage,
    serializer::MessageSerializer,
};

// Stub message handler which ignores the messages it receives
#[derive(Debug)]
pub struct StubMessageHandler {
    id: Ustr,
}

impl MessageHandler for StubMessageHandler {
    fn id(&self) -> Ustr {
        self.id
    }

    fn handle(&self, _message: &dyn Any) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Returns a do-nothing handler, generating a unique id when none is given.
#[must_use]
pub fn get_stub_shareable_handler(id: Option<Ustr>) -> ShareableMessageHandler {
    let unique_id = id.unwrap_or_else(|| Ustr::from(&UUID4::new().to_string()));
    ShareableMessageHandler(Rc::new(StubMessageHandler { id: unique_id }))
}

// Stub message handler which records whether handle was called
#[derive(Debug)]
pub struct CallCheckMessageHandler {
    id: Ustr,
    called: Rc<Cell<bool>>,
}

impl CallCheckMessageHandler {
    #[must_use]
    pub fn was_called(&self) -> bool {
        self.called.get()
    }
}

impl MessageHandler for CallCheckMessageHandler {
    fn id(&self) -> Ustr {
        self.id
    }

    fn handle(&self, _message: &dyn Any) {
        self.called.set(true);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Returns a call-check handler, generating a unique id when none is given.
#[must_use]
pub fn get_call_check_shareable_handler(id: Option<Ustr>) -> ShareableMessageHandler {
    let unique_id = id.unwrap_or_else(|| Ustr::from(&UUID4::new().to_string()));
    ShareableMessageHandler(Rc::new(CallCheckMessageHandler {
        id: unique_id,
        called: Rc::new(Cell::new(false)),
    }))
}

/// Returns whether the given [`CallCheckMessageHandler`] has been invoked at
/// least once.
///
/// # Panics
///
/// Panics if the provided `handler` is not a `CallCheckMessageHandler`.
#[must_use]
pub fn check_handler_was_called(call_check_handler: ShareableMessageHandler) -> bool {
    call_check_handler
        .0
        .as_ref()
        .as_any()
        .downcast_ref::<CallCheckMessageHandler>()
        .unwrap()
        .was_called()
}

// Handler which saves the messages it receives
#[derive(Debug, Clone)]
pub struct MessageSavingHandler<T> {
    id: Ustr,
    messages: Rc<RefCell<Vec<T>>>,
}

impl<T: Clone + 'static> MessageSavingHandler<T> {
    #[must_use]
    pub fn get_messages(&self) -> Vec<T> {
        self.messages.borrow().clone()
    }
}

impl<T: Clone + 'static> MessageHandler for MessageSavingHandler<T> {
    fn id(&self) -> Ustr {
        self.id
    }

    /// Handles an incoming message by saving it.
    ///
    /// # Panics
    ///
    /// Panics if the provided `message` is not of the expected type `T`.
    fn handle(&self, message: &dyn Any) {
        let mut messages = self.messages.borrow_mut();
        match message.downcast_ref::<T>() {
            Some(m) => messages.push(m.clone()),
            None => panic!("MessageSavingHandler: message type mismatch {message:?}"),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Returns a message-saving handler, generating a unique id when none is
/// given.
#[must_use]
pub fn get_message_saving_handler<T: Clone + 'static>(id: Option<Ustr>) -> ShareableMessageHandler {
    let unique_id = id.unwrap_or_else(|| Ustr::from(&UUID4::new().to_string()));
    ShareableMessageHandler(Rc::new(MessageSavingHandler::<T> {
        id: unique_id,
        messages: Rc::new(RefCell::new(Vec::new())),
    }))
}

/// Retrieves the messages saved by a [`MessageSavingHandler`].
///
/// # Panics
///
/// Panics if the provided `handler` is not a `MessageSavingHandler<T>`.
#[must_use]
pub fn get_saved_messages<T: Clone + 'static>(handler: ShareableMessageHandler) -> Vec<T> {
    handler
        .0
        .as_ref()
        .as_any()
        .downcast_ref::<MessageSavingHandler<T>>()
        .unwrap()
        .get_messages()
}

#[derive(Debug, Default)]
struct StubDatabaseInner {
    published: Vec<BusMessage>,
    closed: bool,
}

/// A recording external sink capturing every `(topic, payload)` pair handed
/// to it, with shared interior state so a clone can observe emissions after
/// the bus has taken ownership of the original.
#[derive(Clone, Debug, Default)]
pub struct StubMessageBusDatabase {
    inner: Rc<RefCell<StubDatabaseInner>>,
}

impl StubMessageBusDatabase {
    /// Returns the messages published to this sink so far.
    #[must_use]
    pub fn published(&self) -> Vec<BusMessage> {
        self.inner.borrow().published.clone()
    }

    /// Returns whether the sink has been closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.inner.borrow().closed
    }
}

impl MessageBusDatabase for StubMessageBusDatabase {
    fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    fn publish(&self, topic: Ustr, payload: Bytes) {
        self.inner
            .borrow_mut()
            .published
            .push(BusMessage::new(topic, payload));
    }

    fn close(&mut self) {
        self.inner.borrow_mut().closed = true;
    }
}

/// A stub quote message standing in for the platform's `QuoteTick` data type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StubQuoteTick {
    pub instrument: String,
    pub bid: f64,
    pub ask: f64,
}

/// A stub trade message standing in for the platform's `TradeTick` data type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StubTradeTick {
    pub instrument: String,
    pub price: f64,
    pub size: f64,
}

/// A serializer recognizing the stub data types, encoding payloads as JSON.
#[derive(Debug, Default)]
pub struct StubMessageSerializer;

impl MessageSerializer for StubMessageSerializer {
    fn type_name(&self, message: &dyn Any) -> Option<Ustr> {
        if message.is::<StubQuoteTick>() {
            Some(Ustr::from("QuoteTick"))
        } else if message.is::<StubTradeTick>() {
            Some(Ustr::from("TradeTick"))
        } else {
            None
        }
    }

    fn serialize(&self, message: &dyn Any) -> anyhow::Result<Bytes> {
        let json = if let Some(quote) = message.downcast_ref::<StubQuoteTick>() {
            serde_json::to_vec(quote)?
        } else if let Some(trade) = message.downcast_ref::<StubTradeTick>() {
            serde_json::to_vec(trade)?
        } else {
            anyhow::bail!("unsupported message type for serialization");
        };

        Ok(Bytes::from(json))
    }
}
