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

use std::{
    any::Any,
    fmt::{Debug, Display},
    rc::Rc,
};

use bytes::Bytes;
use meridian_core::UUID4;
use serde::{Deserialize, Serialize};
use ustr::Ustr;

use super::handler::ShareableMessageHandler;

/// Represents a bus message including a topic and serialized payload.
///
/// This is the envelope handed to external sinks once a published message has
/// been serialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    /// The topic the message was published on.
    pub topic: Ustr,
    /// The serialized payload for the message.
    pub payload: Bytes,
}

impl BusMessage {
    /// Creates a new [`BusMessage`] instance.
    pub fn new(topic: Ustr, payload: Bytes) -> Self {
        debug_assert!(!topic.is_empty());
        Self { topic, payload }
    }

    /// Creates a new [`BusMessage`] instance with a string-like topic.
    pub fn with_str_topic<T: AsRef<str>>(topic: T, payload: Bytes) -> Self {
        Self::new(Ustr::from(topic.as_ref()), payload)
    }
}

impl Display for BusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.topic,
            String::from_utf8_lossy(&self.payload)
        )
    }
}

/// A correlated request dispatched to an endpoint.
///
/// Carries the identifier the matching response must echo as its correlation
/// id, and the handler that response will be delivered to. The payload is
/// opaque to the bus.
#[derive(Clone)]
pub struct Request {
    /// The unique identifier for the request.
    pub request_id: UUID4,
    /// The handler to receive the matching response.
    pub callback: ShareableMessageHandler,
    /// The request payload.
    pub payload: Rc<dyn Any>,
}

impl Request {
    /// Creates a new [`Request`] instance.
    pub fn new(request_id: UUID4, callback: ShareableMessageHandler, payload: Rc<dyn Any>) -> Self {
        Self {
            request_id,
            callback,
            payload,
        }
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Request))
            .field("request_id", &self.request_id)
            .field("callback", &self.callback)
            .finish_non_exhaustive()
    }
}

/// A response correlated with a prior request.
#[derive(Clone)]
pub struct Response {
    /// The identifier of the request this response answers.
    pub correlation_id: UUID4,
    /// The response payload.
    pub payload: Rc<dyn Any>,
}

impl Response {
    /// Creates a new [`Response`] instance.
    pub fn new(correlation_id: UUID4, payload: Rc<dyn Any>) -> Self {
        Self {
            correlation_id,
            payload,
        }
    }
}

impl Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Response))
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}
