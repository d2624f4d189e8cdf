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

//! A common in-memory `MessageBus` for loosely coupled message passing patterns.
//!
//! The bus multiplexes three messaging patterns over a single registry:
//! point-to-point [`send`], [`request`]/[`response`] with correlation, and
//! topic-based [`publish`]/[`subscribe`] with hierarchical wildcard patterns.
//!
//! Dispatch runs through the free functions in this module, which operate on
//! the current thread's owning bus instance. Handlers are invoked with no bus
//! borrow held, so they may freely re-enter the bus; a handler mutating
//! subscriptions during a publish observes the pre-mutation resolution for the
//! in-flight dispatch and the post-mutation state afterwards.

pub mod core;
pub mod database;
pub mod handler;
pub mod matching;
pub mod message;
pub mod serializer;
pub mod stubs;

#[cfg(test)]
mod tests;

use std::{
    any::Any,
    cell::{OnceCell, RefCell},
    rc::Rc,
};

use meridian_core::UUID4;

pub use crate::msgbus::{
    core::{Endpoint, MStr, MessageBus, Pattern, Subscription, Topic},
    database::{DatabaseConfig, MessageBusConfig, MessageBusDatabase},
    handler::{MessageHandler, ShareableMessageHandler, TypedMessageHandler},
    message::{BusMessage, Request, Response},
    serializer::{EXTERNAL_PUBLISHING_TYPES, MessageSerializer},
};

thread_local! {
    static MESSAGE_BUS: OnceCell<Rc<RefCell<MessageBus>>> = const { OnceCell::new() };
}

/// Sets the message bus for the current thread.
///
/// # Panics
///
/// Panics if a message bus has already been set or initialized for this
/// thread.
pub fn set_message_bus(msgbus: Rc<RefCell<MessageBus>>) {
    MESSAGE_BUS.with(|bus| {
        if bus.set(msgbus).is_err() {
            panic!("Message bus already initialized for this thread");
        }
    });
}

/// Returns the message bus for the current thread, initializing a default
/// instance on first access.
#[must_use]
pub fn get_message_bus() -> Rc<RefCell<MessageBus>> {
    MESSAGE_BUS.with(|bus| {
        bus.get_or_init(|| Rc::new(RefCell::new(MessageBus::default())))
            .clone()
    })
}

/// Registers the `handler` at the `endpoint` address.
///
/// # Errors
///
/// Returns an error if a handler is already registered at the `endpoint`.
pub fn register(endpoint: MStr<Endpoint>, handler: ShareableMessageHandler) -> anyhow::Result<()> {
    log::debug!(
        "Registering endpoint '{endpoint}' with handler ID {} at {}",
        handler.id(),
        get_message_bus().borrow().mem_address(),
    );

    get_message_bus().borrow_mut().register(endpoint, handler)
}

/// Deregisters the `handler` from the `endpoint` address.
///
/// # Errors
///
/// Returns an error if no handler is registered at the `endpoint`, or if the
/// registered handler is not the given `handler`.
pub fn deregister(
    endpoint: MStr<Endpoint>,
    handler: &ShareableMessageHandler,
) -> anyhow::Result<()> {
    log::debug!(
        "Deregistering endpoint '{endpoint}' at {}",
        get_message_bus().borrow().mem_address(),
    );

    get_message_bus()
        .borrow_mut()
        .deregister(endpoint, handler)
}

/// Sends the `message` to the handler registered at the `endpoint`.
///
/// An unknown endpoint is logged and the message dropped.
pub fn send(endpoint: MStr<Endpoint>, message: &dyn Any) {
    let handler = get_message_bus().borrow().get_endpoint(endpoint).cloned();
    match handler {
        Some(handler) => {
            handler.0.handle(message);
            get_message_bus().borrow_mut().sent_count += 1;
        }
        None => log::error!("Cannot send message: no registered endpoint '{endpoint}'"),
    }
}

/// Sends the `request` to the handler registered at the `endpoint`, recording
/// its callback against the request ID for the matching [`response`].
///
/// A duplicate live request ID is logged and the request dropped. An unknown
/// endpoint is logged and the request dropped, with the correlation entry
/// deliberately retained.
pub fn request(endpoint: MStr<Endpoint>, request: Request) {
    if let Err(e) = get_message_bus()
        .borrow_mut()
        .register_response_handler(&request.request_id, request.callback.clone())
    {
        log::error!("Cannot handle request: {e}");
        return;
    }

    let handler = get_message_bus().borrow().get_endpoint(endpoint).cloned();
    match handler {
        Some(handler) => {
            handler.0.handle(&request);
            get_message_bus().borrow_mut().req_count += 1;
        }
        None => log::error!("Cannot handle request: no registered endpoint '{endpoint}'"),
    }
}

/// Delivers the `response` to the callback recorded for its correlation ID,
/// removing the correlation entry.
///
/// An unknown correlation ID is logged and the response dropped.
pub fn response(response: Response) {
    let callback = get_message_bus()
        .borrow_mut()
        .pop_response_handler(&response.correlation_id);
    match callback {
        Some(callback) => {
            callback.0.handle(&response);
            get_message_bus().borrow_mut().res_count += 1;
        }
        None => log::error!(
            "Cannot handle response: no pending request for correlation ID {}",
            response.correlation_id
        ),
    }
}

/// Subscribes the `handler` to the `pattern` with an optional `priority`.
pub fn subscribe(pattern: MStr<Pattern>, handler: ShareableMessageHandler, priority: Option<u8>) {
    log::debug!(
        "Subscribing to pattern '{pattern}' at {}",
        get_message_bus().borrow().mem_address(),
    );

    get_message_bus()
        .borrow_mut()
        .subscribe(pattern, handler, priority);
}

/// Subscribes the `handler` to the string-like `pattern`.
///
/// # Panics
///
/// Panics if `pattern` is not a valid pattern string.
pub fn subscribe_str<T: AsRef<str>>(
    pattern: T,
    handler: ShareableMessageHandler,
    priority: Option<u8>,
) {
    subscribe(pattern.as_ref().into(), handler, priority);
}

/// Unsubscribes the `handler` from the `pattern`.
pub fn unsubscribe(pattern: MStr<Pattern>, handler: ShareableMessageHandler) {
    log::debug!(
        "Unsubscribing from pattern '{pattern}' at {}",
        get_message_bus().borrow().mem_address(),
    );

    get_message_bus().borrow_mut().unsubscribe(pattern, handler);
}

/// Unsubscribes the `handler` from the string-like `pattern`.
///
/// # Panics
///
/// Panics if `pattern` is not a valid pattern string.
pub fn unsubscribe_str<T: AsRef<str>>(pattern: T, handler: ShareableMessageHandler) {
    unsubscribe(pattern.as_ref().into(), handler);
}

/// Publishes the `message` to all subscriptions matching the `topic`.
///
/// Handlers are invoked synchronously in priority order over a snapshot of
/// the topic's cached resolution. When an external sink and serializer are
/// configured and the message's concrete type is publishable, the serialized
/// payload is emitted after all in-process handlers have returned.
pub fn publish(topic: MStr<Topic>, message: &dyn Any) {
    log::trace!(
        "Publishing topic '{topic}' at {}",
        get_message_bus().borrow().mem_address(),
    );
    let matching_subs = get_message_bus().borrow_mut().matching_subscriptions(topic);

    log::trace!("Matched {} subscriptions", matching_subs.len());

    for sub in &matching_subs {
        sub.handler.0.handle(message);
    }

    let msgbus = get_message_bus();
    let mut msgbus_ref_mut = msgbus.borrow_mut();
    msgbus_ref_mut.publish_external(topic, message);
    msgbus_ref_mut.pub_count += 1;
}

/// Returns whether the `handler` is subscribed to the `pattern` on the
/// current thread's bus.
#[must_use]
pub fn is_subscribed(pattern: MStr<Pattern>, handler: ShareableMessageHandler) -> bool {
    get_message_bus().borrow().is_subscribed(pattern, handler)
}

/// Returns whether the `endpoint` is registered on the current thread's bus.
#[must_use]
pub fn is_registered(endpoint: MStr<Endpoint>) -> bool {
    get_message_bus().borrow().is_registered(endpoint)
}

/// Returns whether there is a pending request for the `request_id` on the
/// current thread's bus.
#[must_use]
pub fn is_pending_request(request_id: &UUID4) -> bool {
    get_message_bus().borrow().is_pending_request(request_id)
}

/// Returns the count of subscribers matched by the `pattern` on the current
/// thread's bus.
#[must_use]
pub fn subscriptions_count(pattern: MStr<Pattern>) -> usize {
    get_message_bus().borrow().subscriptions_count(pattern)
}
